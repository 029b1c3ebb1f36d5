//! Services the engine calls but does not own.
//!
//! Identity resolves display names at registration, decklists are locked at
//! check-in close and start, and prizes are issued once at finish.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::errors::{EngineError, EngineResult};
use crate::tournament::models::{TournamentId, UserId};

/// Resolves user ids to display names
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn display_name(&self, user_id: UserId) -> EngineResult<String>;
}

/// Freezes submitted decklists
#[async_trait]
pub trait DecklistService: Send + Sync {
    async fn lock_decklists(&self, tournament_id: TournamentId) -> EngineResult<()>;
}

/// Store-credit prizes
#[async_trait]
pub trait PrizeService: Send + Sync {
    /// Whether a prize was already issued for the tournament
    async fn has_credit(&self, tournament_id: TournamentId) -> EngineResult<bool>;

    async fn issue_credit(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
        amount_cents: i64,
    ) -> EngineResult<()>;
}

/// Map-backed identity; unknown users fall back to `player-<id>`
#[derive(Debug, Default)]
pub struct StaticIdentity {
    names: HashMap<UserId, String>,
}

impl StaticIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, user_id: UserId, name: impl Into<String>) -> Self {
        self.names.insert(user_id, name.into());
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn display_name(&self, user_id: UserId) -> EngineResult<String> {
        Ok(self
            .names
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| format!("player-{user_id}")))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDecklists;

#[async_trait]
impl DecklistService for NoopDecklists {
    async fn lock_decklists(&self, _tournament_id: TournamentId) -> EngineResult<()> {
        Ok(())
    }
}

/// Remembers every successful lock request
#[derive(Debug, Default)]
pub struct RecordingDecklists {
    locked: Mutex<Vec<TournamentId>>,
    failures: Mutex<usize>,
}

impl RecordingDecklists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` lock requests
    pub async fn fail_next(&self, count: usize) {
        *self.failures.lock().await = count;
    }

    pub async fn locked(&self) -> Vec<TournamentId> {
        self.locked.lock().await.clone()
    }
}

#[async_trait]
impl DecklistService for RecordingDecklists {
    async fn lock_decklists(&self, tournament_id: TournamentId) -> EngineResult<()> {
        let mut failures = self.failures.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err(EngineError::Collaborator(format!(
                "decklist service unavailable for tournament {tournament_id}"
            )));
        }
        self.locked.lock().await.push(tournament_id);
        Ok(())
    }
}

/// An issued prize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditRecord {
    pub tournament_id: TournamentId,
    pub player_id: UserId,
    pub amount_cents: i64,
}

/// In-memory prize ledger; refuses a second credit for the same tournament
#[derive(Debug, Default)]
pub struct LedgerPrizes {
    credits: Mutex<Vec<CreditRecord>>,
}

impl LedgerPrizes {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn credits(&self) -> Vec<CreditRecord> {
        self.credits.lock().await.clone()
    }
}

#[async_trait]
impl PrizeService for LedgerPrizes {
    async fn has_credit(&self, tournament_id: TournamentId) -> EngineResult<bool> {
        Ok(self
            .credits
            .lock()
            .await
            .iter()
            .any(|c| c.tournament_id == tournament_id))
    }

    async fn issue_credit(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
        amount_cents: i64,
    ) -> EngineResult<()> {
        let mut credits = self.credits.lock().await;
        if credits.iter().any(|c| c.tournament_id == tournament_id) {
            return Err(EngineError::Collaborator(format!(
                "credit for tournament {tournament_id} already issued"
            )));
        }
        credits.push(CreditRecord {
            tournament_id,
            player_id,
            amount_cents,
        });
        Ok(())
    }
}
