//! Engine facade wiring every manager to one store, clock and set of
//! collaborators.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    DecklistService, IdentityProvider, LedgerPrizes, NoopDecklists, PrizeService, StaticIdentity,
};
use crate::config::EngineConfig;
use crate::db::repository::Repository;
use crate::matches::MatchManager;
use crate::pairing::PairingManager;
use crate::registration::RegistrationManager;
use crate::standings::StandingsManager;
use crate::tournament::TournamentManager;

/// External services the engine calls
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub decklists: Arc<dyn DecklistService>,
    pub prizes: Arc<dyn PrizeService>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            identity: Arc::new(StaticIdentity::new()),
            decklists: Arc::new(NoopDecklists),
            prizes: Arc::new(LedgerPrizes::new()),
        }
    }
}

/// All managers over one repository
#[derive(Clone)]
pub struct Engine {
    pub tournaments: TournamentManager,
    pub registrations: RegistrationManager,
    pub pairing: PairingManager,
    pub matches: MatchManager,
    pub standings: StandingsManager,
}

impl Engine {
    pub fn new(
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Self {
        let standings = StandingsManager::new(Arc::clone(&repo));
        let registrations = RegistrationManager::new(
            Arc::clone(&repo),
            Arc::clone(&clock),
            collaborators.identity,
        );
        let pairing = PairingManager::new(Arc::clone(&repo), Arc::clone(&clock), standings.clone());
        let matches = MatchManager::new(Arc::clone(&repo), Arc::clone(&clock), standings.clone());
        let tournaments = TournamentManager::new(
            repo,
            clock,
            config,
            registrations.clone(),
            pairing.clone(),
            standings.clone(),
            collaborators.decklists,
            collaborators.prizes,
        );

        Self {
            tournaments,
            registrations,
            pairing,
            matches,
            standings,
        }
    }

    /// Wall clock, default configuration and in-crate collaborators
    pub fn with_defaults(repo: Arc<dyn Repository>) -> Self {
        Self::new(
            repo,
            Arc::new(SystemClock),
            EngineConfig::default(),
            Collaborators::default(),
        )
    }
}
