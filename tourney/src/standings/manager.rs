//! Standings manager: recompute and read a stage's table.

use log::info;
use std::sync::Arc;

use super::calculator::compute_standings;
use super::models::Standing;
use crate::db::repository::{Repository, StandingRepository, require_stage};
use crate::errors::{EngineError, EngineResult};
use crate::locks::KeyedLocks;
use crate::stage::models::StageId;
use crate::tournament::models::TournamentId;

/// Standings manager
#[derive(Clone)]
pub struct StandingsManager {
    repo: Arc<dyn Repository>,
    locks: Arc<KeyedLocks<StageId>>,
}

impl StandingsManager {
    /// Create a new standings manager
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Rebuild the stage's table from its confirmed matches and replace the
    /// stored rows. Safe to call any number of times; recomputes of one stage
    /// run one at a time.
    ///
    /// # Errors
    ///
    /// * `EngineError::NotFound` - Stage missing
    /// * `EngineError::InvalidInput` - Stage belongs to another tournament
    pub async fn recompute(
        &self,
        tournament_id: TournamentId,
        stage_id: StageId,
    ) -> EngineResult<Vec<Standing>> {
        let stage = require_stage(self.repo.as_ref(), stage_id).await?;
        if stage.tournament_id != tournament_id {
            return Err(EngineError::InvalidInput(format!(
                "stage {stage_id} does not belong to tournament {tournament_id}"
            )));
        }

        let _guard = self.locks.lock(&stage_id).await;
        let standings = self
            .repo
            .refresh_standings(tournament_id, stage_id, compute_standings)
            .await?;

        info!(
            "Recomputed standings for tournament {} stage {} ({} players)",
            tournament_id,
            stage_id,
            standings.len()
        );

        Ok(standings)
    }

    /// Stored table of a stage in rank order
    pub async fn get_standings(&self, stage_id: StageId) -> EngineResult<Vec<Standing>> {
        self.repo.list_standings(stage_id).await
    }
}
