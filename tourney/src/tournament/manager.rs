//! Tournament manager: lifecycle transitions and their side effects.

use log::{info, warn};
use std::sync::Arc;

use super::lifecycle::{LifecycleEvent, LifecycleSync, ensure_transition, sync_lifecycle};
use super::models::{
    Actor, Tournament, TournamentConfig, TournamentFormat, TournamentId, TournamentStatus,
};
use crate::clock::Clock;
use crate::collaborators::{DecklistService, PrizeService};
use crate::config::EngineConfig;
use crate::db::repository::{
    MatchRepository, RegistrationRepository, Repository, StageRepository, TournamentRepository,
    require_tournament,
};
use crate::errors::{EngineError, EngineResult};
use crate::locks::KeyedLocks;
use crate::matches::models::{Match, ResultStatus};
use crate::pairing::PairingManager;
use crate::pairing::swiss::swiss_rounds_for;
use crate::registration::RegistrationManager;
use crate::registration::models::RegistrationId;
use crate::stage::models::StageType;
use crate::standings::StandingsManager;
use crate::standings::models::Standing;

/// Final table of a finished tournament
#[derive(Debug, Clone)]
pub struct FinalResult {
    pub tournament: Tournament,
    /// Standings of the deciding stage
    pub standings: Vec<Standing>,
    /// Whether a prize was issued by this call
    pub prize_issued: bool,
}

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    registrations: RegistrationManager,
    pairing: PairingManager,
    standings: StandingsManager,
    decklists: Arc<dyn DecklistService>,
    prizes: Arc<dyn PrizeService>,
    locks: Arc<KeyedLocks<TournamentId>>,
}

impl TournamentManager {
    /// Create a new tournament manager
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        registrations: RegistrationManager,
        pairing: PairingManager,
        standings: StandingsManager,
        decklists: Arc<dyn DecklistService>,
        prizes: Arc<dyn PrizeService>,
    ) -> Self {
        Self {
            repo,
            clock,
            config,
            registrations,
            pairing,
            standings,
            decklists,
            prizes,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Configuration carrying the engine's default policy
    pub fn default_config(
        &self,
        name: impl Into<String>,
        format: TournamentFormat,
        capacity: u32,
    ) -> TournamentConfig {
        TournamentConfig::new(name, format, capacity).with_policy(self.config.default_policy())
    }

    /// Create a tournament in DRAFT owned by `organizer`
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidInput` - Configuration rejected by validation
    pub async fn create_tournament(
        &self,
        organizer: &Actor,
        config: TournamentConfig,
    ) -> EngineResult<Tournament> {
        config.validate(self.config.max_capacity)?;
        let tournament = self
            .repo
            .create_tournament(organizer.user_id, &config, self.clock.now())
            .await?;
        info!(
            "Created {} tournament {} '{}' (capacity {})",
            tournament.config.format, tournament.id, tournament.config.name, tournament.config.capacity
        );
        Ok(tournament)
    }

    /// Fetch a tournament after applying any due time-driven transitions
    pub async fn get(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        self.sync(tournament_id).await
    }

    pub async fn list(&self) -> EngineResult<Vec<Tournament>> {
        self.repo.list_tournaments().await
    }

    /// Apply the registration and check-in transitions that are due
    pub async fn sync(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        let mut tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        let LifecycleSync { events, .. } = sync_lifecycle(&tournament, self.clock.now());

        for event in events {
            match self.apply_event(&tournament, event).await {
                Ok(next) => tournament = next,
                Err(err) if err.is_conflict() => {
                    // Someone else applied it; continue from what they left
                    warn!(
                        "Lifecycle {} on tournament {} lost a race",
                        event, tournament_id
                    );
                    return require_tournament(self.repo.as_ref(), tournament_id).await;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(tournament)
    }

    /// DRAFT → PUBLISHED; a Swiss round count is derived from capacity when unset
    pub async fn publish(&self, tournament_id: TournamentId, actor: &Actor) -> EngineResult<Tournament> {
        let tournament = self.managed(tournament_id, actor).await?;
        tournament.ensure_status(TournamentStatus::Draft)?;

        if tournament.config.format.is_swiss_based() && tournament.config.swiss_rounds.is_none() {
            let mut config = tournament.config.clone();
            config.swiss_rounds = Some(swiss_rounds_for(config.capacity as usize));
            self.repo
                .update_tournament_config(tournament_id, &config, self.clock.now())
                .await?;
        }

        self.transition(&tournament, TournamentStatus::Published).await
    }

    pub async fn open_registration(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
    ) -> EngineResult<Tournament> {
        let tournament = self.managed(tournament_id, actor).await?;
        tournament.ensure_status(TournamentStatus::Published)?;
        self.transition(&tournament, TournamentStatus::RegOpen).await
    }

    pub async fn close_registration(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
    ) -> EngineResult<Tournament> {
        let tournament = self.managed(tournament_id, actor).await?;
        tournament.ensure_status(TournamentStatus::RegOpen)?;
        self.transition(&tournament, TournamentStatus::RegClosed).await
    }

    /// Open check-in; registration closes with it
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidState` - Registration neither open nor closed
    /// * `EngineError::PreconditionFailed` - The check-in window has not opened yet
    pub async fn open_check_in(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
    ) -> EngineResult<Tournament> {
        let tournament = self.managed(tournament_id, actor).await?;
        if !matches!(
            tournament.status,
            TournamentStatus::RegOpen | TournamentStatus::RegClosed
        ) {
            return Err(EngineError::InvalidState(format!(
                "tournament {} is {}, check-in opens after registration",
                tournament_id, tournament.status
            )));
        }

        if let Some(start_at) = tournament.config.start_at {
            let opens_at = tournament.config.policy.checkin_opens_at(start_at);
            if self.clock.now() < opens_at {
                return Err(EngineError::PreconditionFailed(format!(
                    "check-in for tournament {tournament_id} opens at {opens_at}"
                )));
            }
        }

        self.apply_event(&tournament, LifecycleEvent::OpenCheckIn)
            .await
    }

    /// Close check-in: no-shows, waitlist promotion, decklist lock
    pub async fn close_check_in(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
    ) -> EngineResult<Tournament> {
        let tournament = self.managed(tournament_id, actor).await?;
        tournament.ensure_status(TournamentStatus::CheckinOpen)?;
        self.apply_event(&tournament, LifecycleEvent::CloseCheckIn)
            .await
    }

    /// Start the tournament; Swiss-based formats get round 1 immediately
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidState` - Check-in not open or closed
    /// * `EngineError::PreconditionFailed` - Fewer than 2 checked-in players
    pub async fn start(&self, tournament_id: TournamentId, actor: &Actor) -> EngineResult<Tournament> {
        let mut tournament = self.managed(tournament_id, actor).await?;
        match tournament.status {
            TournamentStatus::CheckinClosed => {}
            TournamentStatus::CheckinOpen => {
                tournament = self
                    .apply_event(&tournament, LifecycleEvent::CloseCheckIn)
                    .await?;
            }
            status => {
                return Err(EngineError::InvalidState(format!(
                    "tournament {tournament_id} is {status}, start needs a closed check-in"
                )));
            }
        }

        let players = self
            .repo
            .list_registrations(tournament_id)
            .await?
            .iter()
            .filter(|r| r.status.counts_for_start())
            .count();
        if players < 2 {
            return Err(EngineError::PreconditionFailed(format!(
                "tournament {tournament_id} needs at least 2 checked-in players, has {players}"
            )));
        }

        let tournament = self.transition(&tournament, TournamentStatus::Running).await?;
        self.decklists.lock_decklists(tournament_id).await?;

        if tournament.config.format.is_swiss_based() {
            self.pairing
                .generate_next_round(tournament_id, actor, Some(StageType::Swiss))
                .await?;
        }

        Ok(tournament)
    }

    /// Finish the tournament, recompute every table and issue the prize once
    pub async fn finish(&self, tournament_id: TournamentId, actor: &Actor) -> EngineResult<FinalResult> {
        let tournament = self.managed(tournament_id, actor).await?;
        tournament.ensure_status(TournamentStatus::Running)?;

        let stages = self.repo.list_stages(tournament_id).await?;
        let mut standings = Vec::new();
        let mut champion = None;
        for stage in &stages {
            let table = self.standings.recompute(tournament_id, stage.id).await?;
            if stage.stage_type != StageType::Losers {
                let matches = self.repo.list_stage_matches(stage.id).await?;
                champion = bracket_champion(stage.stage_type, &matches);
                standings = table;
            }
        }
        if let Some(champion) = champion {
            lead_with(&mut standings, champion);
        }

        let tournament = self.transition(&tournament, TournamentStatus::Finished).await?;

        let mut prize_issued = false;
        let amount = tournament.config.prize_credit_cents;
        if amount > 0
            && let Some(champion) = standings.first()
        {
            if self.prizes.has_credit(tournament_id).await? {
                info!("Prize for tournament {} was already issued", tournament_id);
            } else {
                self.prizes
                    .issue_credit(tournament_id, champion.player_id, amount)
                    .await?;
                prize_issued = true;
                info!(
                    "Issued {} cents of store credit to player {} for tournament {}",
                    amount, champion.player_id, tournament_id
                );
            }
        }

        Ok(FinalResult {
            tournament,
            standings,
            prize_issued,
        })
    }

    /// Cancel from any non-terminal status
    pub async fn cancel(&self, tournament_id: TournamentId, actor: &Actor) -> EngineResult<Tournament> {
        let tournament = self.managed(tournament_id, actor).await?;
        self.transition(&tournament, TournamentStatus::Cancelled).await
    }

    /// Load after syncing, then check the actor may manage it
    async fn managed(&self, tournament_id: TournamentId, actor: &Actor) -> EngineResult<Tournament> {
        let tournament = self.sync(tournament_id).await?;
        tournament.ensure_manager(actor)?;
        Ok(tournament)
    }

    async fn transition(
        &self,
        tournament: &Tournament,
        next: TournamentStatus,
    ) -> EngineResult<Tournament> {
        ensure_transition(tournament, next)?;
        let updated = self
            .repo
            .transition_tournament(tournament.id, tournament.status, next, self.clock.now())
            .await?;
        info!(
            "Tournament {} moved from {} to {}",
            tournament.id, tournament.status, next
        );
        Ok(updated)
    }

    /// Perform a lifecycle event with its side effects. The status moves
    /// last, so a close that fails part way stays CHECKIN_OPEN and can be
    /// repeated.
    ///
    /// # Errors
    ///
    /// * `EngineError::Conflict` - The tournament moved on since `tournament` was read
    async fn apply_event(
        &self,
        tournament: &Tournament,
        event: LifecycleEvent,
    ) -> EngineResult<Tournament> {
        let _guard = self.locks.lock(&tournament.id).await;
        let current = require_tournament(self.repo.as_ref(), tournament.id).await?;
        if current.status != tournament.status {
            return Err(EngineError::Conflict(format!(
                "tournament {} is already {}",
                current.id, current.status
            )));
        }
        ensure_transition(&current, event.target())?;

        if event == LifecycleEvent::CloseCheckIn {
            self.decklists.lock_decklists(current.id).await?;
            self.registrations.close_check_in(&current).await?;
        }
        self.transition(&current, event.target()).await
    }}

/// Winner of a bracket stage's deciding match once it is confirmed; the
/// points table does not order a bracket's finalists
fn bracket_champion(stage_type: StageType, matches: &[Match]) -> Option<RegistrationId> {
    let deciding = match stage_type {
        StageType::Winners => matches.iter().find(|m| m.is_grand_final())?,
        StageType::SingleElimination | StageType::TopCut => {
            let last_round = matches.iter().map(|m| m.round_number).max()?;
            let mut finals = matches.iter().filter(|m| m.round_number == last_round);
            match (finals.next(), finals.next()) {
                (Some(only), None) => only,
                _ => return None,
            }
        }
        _ => return None,
    };

    if deciding.is_bye() || deciding.result_status != ResultStatus::Confirmed {
        return None;
    }
    deciding.winner
}

/// Move the champion's row to the top and renumber the ranks
fn lead_with(standings: &mut Vec<Standing>, champion: RegistrationId) {
    let Some(index) = standings.iter().position(|s| s.registration_id == champion) else {
        return;
    };
    let row = standings.remove(index);
    standings.insert(0, row);
    for (position, row) in standings.iter_mut().enumerate() {
        row.rank = position as u32 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(registration_id: RegistrationId, rank: u32) -> Standing {
        Standing {
            tournament_id: 1,
            stage_id: 1,
            registration_id,
            player_id: 100 + registration_id,
            points: 9 - 3 * rank,
            wins: 3 - rank,
            losses: rank - 1,
            draws: 0,
            games_won: 0,
            games_played: 0,
            omw: 0.0,
            gw: 0.0,
            ogw: 0.0,
            rank,
        }
    }

    #[test]
    fn test_lead_with_moves_champion_and_renumbers() {
        let mut table = vec![row(10, 1), row(20, 2), row(30, 3)];
        lead_with(&mut table, 20);
        let order: Vec<_> = table.iter().map(|s| (s.registration_id, s.rank)).collect();
        assert_eq!(order, vec![(20, 1), (10, 2), (30, 3)]);
    }

    #[test]
    fn test_lead_with_unknown_champion_keeps_table() {
        let mut table = vec![row(10, 1), row(20, 2)];
        lead_with(&mut table, 99);
        assert_eq!(table, vec![row(10, 1), row(20, 2)]);
    }
}
