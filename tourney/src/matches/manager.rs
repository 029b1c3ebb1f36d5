//! Match manager: drives results through the state machine and persists them
//! with a compare-and-swap on the match version.

use log::{info, warn};
use std::sync::Arc;

use super::models::{Match, MatchId};
use super::state_machine::{self, MatchActor, Transition};
use crate::clock::Clock;
use crate::db::repository::{
    MatchRepository, RegistrationRepository, Repository, require_match, require_tournament,
};
use crate::errors::{EngineError, EngineResult};
use crate::stage::models::StageId;
use crate::standings::StandingsManager;
use crate::tournament::models::{Actor, TournamentStatus};

/// Match manager
#[derive(Clone)]
pub struct MatchManager {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    standings: StandingsManager,
}

impl MatchManager {
    /// Create a new match manager
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, standings: StandingsManager) -> Self {
        Self {
            repo,
            clock,
            standings,
        }
    }

    pub async fn get_match(&self, match_id: MatchId) -> EngineResult<Match> {
        require_match(self.repo.as_ref(), match_id).await
    }

    /// Matches of a stage ordered by round and table
    pub async fn list_stage_matches(&self, stage_id: StageId) -> EngineResult<Vec<Match>> {
        self.repo.list_stage_matches(stage_id).await
    }

    /// Report a score for a match
    ///
    /// # Errors
    ///
    /// * `EngineError::Conflict` - The opponent already reported, or a concurrent write won
    /// * `EngineError::PermissionDenied` - Actor neither staff nor participant
    /// * `EngineError::InvalidState` - Tournament not running, or match not reportable
    pub async fn report(
        &self,
        match_id: MatchId,
        actor: &Actor,
        score_a: u32,
        score_b: u32,
    ) -> EngineResult<Match> {
        self.apply(match_id, actor, "report", |m, who, now| {
            state_machine::report(m, who, score_a, score_b, now)
        })
        .await
    }

    /// Confirm a reported result; the reporter may not confirm their own report
    pub async fn confirm(&self, match_id: MatchId, actor: &Actor) -> EngineResult<Match> {
        self.apply(match_id, actor, "confirm", state_machine::confirm)
            .await
    }

    /// Dispute a reported result
    pub async fn dispute(&self, match_id: MatchId, actor: &Actor) -> EngineResult<Match> {
        self.apply(match_id, actor, "dispute", state_machine::dispute)
            .await
    }

    /// Void a match (staff only)
    pub async fn void(&self, match_id: MatchId, actor: &Actor) -> EngineResult<Match> {
        self.apply(match_id, actor, "void", state_machine::void)
            .await
    }

    async fn apply<F>(
        &self,
        match_id: MatchId,
        actor: &Actor,
        operation: &str,
        transition: F,
    ) -> EngineResult<Match>
    where
        F: FnOnce(&Match, &MatchActor, chrono::DateTime<chrono::Utc>) -> EngineResult<Transition>,
    {
        let current = require_match(self.repo.as_ref(), match_id).await?;
        let match_actor = self.resolve_actor(&current, actor).await?;

        let Transition {
            next,
            affects_standings,
        } = transition(&current, &match_actor, self.clock.now())?;

        let stored = match self.repo.update_match_result(&next, current.version).await {
            Ok(stored) => stored,
            Err(err) => {
                if err.is_conflict() {
                    warn!(
                        "Rejected concurrent {} on match {} by user {}",
                        operation, match_id, actor.user_id
                    );
                }
                return Err(err);
            }
        };

        info!(
            "Match {} {}: {} by user {}",
            stored.id, operation, stored.result_status, actor.user_id
        );

        if affects_standings {
            self.standings
                .recompute(stored.tournament_id, stored.stage_id)
                .await?;
        }

        Ok(stored)
    }

    /// Resolve the caller against the match: staff rights and participation
    async fn resolve_actor(&self, m: &Match, actor: &Actor) -> EngineResult<MatchActor> {
        let tournament = require_tournament(self.repo.as_ref(), m.tournament_id).await?;
        if tournament.status != TournamentStatus::Running {
            return Err(EngineError::InvalidState(format!(
                "tournament {} is {}, results are only accepted while running",
                tournament.id, tournament.status
            )));
        }

        let registration_id = self
            .repo
            .find_registration(m.tournament_id, actor.user_id)
            .await?
            .map(|r| r.id)
            .filter(|id| m.involves(*id));

        Ok(MatchActor {
            user_id: actor.user_id,
            registration_id,
            is_staff: tournament.is_staff(actor),
        })
    }
}
