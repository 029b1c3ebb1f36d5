//! Repository trait definitions for testability and dependency injection.
//!
//! Managers only talk to storage through these traits. Every method that
//! guards an invariant under concurrency (capacity, result compare-and-swap,
//! one round at a time) is a single atomic primitive here, so the in-memory
//! and PostgreSQL stores enforce the same rules.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::{EngineError, EngineResult};
use crate::matches::models::{Match, MatchId, NewMatch};
use crate::registration::models::{
    EntryType, NewRegistration, Registration, RegistrationId, RegistrationStatus,
};
use crate::stage::models::{NewStage, Stage, StageId, StageSettings, StageStatus};
use crate::standings::models::Standing;
use crate::tournament::models::{Tournament, TournamentConfig, TournamentId, TournamentStatus, UserId};

/// Precondition checked by [`MatchRepository::insert_round`] for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundGuard {
    pub stage_id: StageId,
    /// Highest round number the generator observed
    pub expected_last_round: u32,
}

/// A generated round, persisted all together or not at all
#[derive(Debug, Clone)]
pub struct RoundBatch {
    pub tournament_id: TournamentId,
    /// Every guarded stage must still have no open match and the expected last round
    pub guards: Vec<RoundGuard>,
    pub matches: Vec<(StageId, NewMatch)>,
    /// Stage settings replaced in the same transaction
    pub settings: Option<(StageId, StageSettings)>,
    pub created_at: DateTime<Utc>,
}

/// Trait for tournament repository operations
#[async_trait]
pub trait TournamentRepository: Send + Sync {
    /// Create a tournament in DRAFT
    async fn create_tournament(
        &self,
        organizer_id: UserId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament>;

    async fn get_tournament(&self, id: TournamentId) -> EngineResult<Option<Tournament>>;

    async fn list_tournaments(&self) -> EngineResult<Vec<Tournament>>;

    /// Replace the configuration of a tournament
    async fn update_tournament_config(
        &self,
        id: TournamentId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<()>;

    /// Compare-and-swap the status
    ///
    /// # Errors
    ///
    /// * `EngineError::Conflict` - Status is no longer `expected`
    async fn transition_tournament(
        &self,
        id: TournamentId,
        expected: TournamentStatus,
        next: TournamentStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament>;
}

/// Trait for registration repository operations
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    /// Read occupancy and the player's active registration, then insert, in
    /// one step. A registration that lands CONFIRMED receives the next seed.
    ///
    /// # Errors
    ///
    /// * `EngineError::PreconditionFailed` - Already registered, or full without waitlist
    async fn create_registration(
        &self,
        new: &NewRegistration,
        capacity: u32,
        allow_waitlist: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration>;

    async fn get_registration(&self, id: RegistrationId) -> EngineResult<Option<Registration>>;

    /// The player's active registration, or their latest one
    async fn find_registration(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Option<Registration>>;

    /// All registrations of a tournament in creation order
    async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> EngineResult<Vec<Registration>>;

    /// Compare-and-swap the status; moving into CONFIRMED assigns a seed
    ///
    /// # Errors
    ///
    /// * `EngineError::Conflict` - Status is no longer `expected`
    async fn transition_registration(
        &self,
        id: RegistrationId,
        expected: RegistrationStatus,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration>;

    /// Promote the oldest waitlisted registration if a seat is free
    async fn promote_waitlist(
        &self,
        tournament_id: TournamentId,
        capacity: u32,
        entry_type: EntryType,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Registration>>;
}

/// Trait for stage repository operations
#[async_trait]
pub trait StageRepository: Send + Sync {
    /// Create the stage, or return the existing stage of the same type
    async fn get_or_create_stage(&self, new: &NewStage, now: DateTime<Utc>) -> EngineResult<Stage>;

    async fn get_stage(&self, id: StageId) -> EngineResult<Option<Stage>>;

    /// Stages of a tournament in sequence order
    async fn list_stages(&self, tournament_id: TournamentId) -> EngineResult<Vec<Stage>>;

    async fn set_stage_status(&self, id: StageId, status: StageStatus) -> EngineResult<()>;
}

/// Trait for match repository operations
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn get_match(&self, id: MatchId) -> EngineResult<Option<Match>>;

    /// Matches of a stage ordered by round, table and id
    async fn list_stage_matches(&self, stage_id: StageId) -> EngineResult<Vec<Match>>;

    async fn list_tournament_matches(&self, tournament_id: TournamentId) -> EngineResult<Vec<Match>>;

    /// Store `next` if the row still has `expected_version`
    ///
    /// # Errors
    ///
    /// * `EngineError::Conflict` - Another writer changed the match first
    async fn update_match_result(&self, next: &Match, expected_version: i64) -> EngineResult<Match>;

    /// Check the guards, then insert every match of the batch
    ///
    /// # Errors
    ///
    /// * `EngineError::Conflict` - A guarded stage moved on since it was read
    async fn insert_round(&self, batch: &RoundBatch) -> EngineResult<Vec<Match>>;
}

/// Builds a stage's table from the tournament's registrations and the
/// stage's matches
pub type StandingsFn = fn(TournamentId, StageId, &[Registration], &[Match]) -> Vec<Standing>;

/// Trait for standings repository operations
#[async_trait]
pub trait StandingRepository: Send + Sync {
    /// Read the stage's registrations and matches, compute its table and
    /// replace the stored rows as one step. Two refreshes of the same stage
    /// never interleave, so the stored table reflects every result committed
    /// before the refresh began.
    async fn refresh_standings(
        &self,
        tournament_id: TournamentId,
        stage_id: StageId,
        compute: StandingsFn,
    ) -> EngineResult<Vec<Standing>>;

    /// Standings of a stage in rank order
    async fn list_standings(&self, stage_id: StageId) -> EngineResult<Vec<Standing>>;
}

/// Everything the engine persists
pub trait Repository:
    TournamentRepository + RegistrationRepository + StageRepository + MatchRepository + StandingRepository
{
}

impl<T> Repository for T where
    T: TournamentRepository
        + RegistrationRepository
        + StageRepository
        + MatchRepository
        + StandingRepository
{
}

/// Load a tournament or fail with `NotFound`
pub(crate) async fn require_tournament(
    repo: &dyn Repository,
    id: TournamentId,
) -> EngineResult<Tournament> {
    repo.get_tournament(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("tournament {id}")))
}

/// Load a stage or fail with `NotFound`
pub(crate) async fn require_stage(repo: &dyn Repository, id: StageId) -> EngineResult<Stage> {
    repo.get_stage(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("stage {id}")))
}

/// Load a match or fail with `NotFound`
pub(crate) async fn require_match(repo: &dyn Repository, id: MatchId) -> EngineResult<Match> {
    repo.get_match(id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("match {id}")))
}
