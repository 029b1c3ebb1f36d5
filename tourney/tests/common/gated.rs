//! In-memory store whose match writes can be held back until several
//! callers have read the same version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Barrier, Mutex};
use tourney::EngineResult;
use tourney::db::{
    MatchRepository, MemoryRepository, RegistrationRepository, RoundBatch, StageRepository,
    StandingRepository, StandingsFn, TournamentRepository,
};
use tourney::matches::{Match, MatchId};
use tourney::registration::{
    EntryType, NewRegistration, Registration, RegistrationId, RegistrationStatus,
};
use tourney::stage::{NewStage, Stage, StageId, StageStatus};
use tourney::standings::Standing;
use tourney::tournament::{Tournament, TournamentConfig, TournamentId, TournamentStatus, UserId};

pub struct GatedRepository {
    inner: Arc<MemoryRepository>,
    gate: Mutex<Option<Arc<Barrier>>>,
}

impl GatedRepository {
    pub fn new(inner: Arc<MemoryRepository>) -> Self {
        Self {
            inner,
            gate: Mutex::new(None),
        }
    }

    /// Hold the next `writers` match writes until all of them have arrived
    pub async fn gate_match_writes(&self, writers: usize) {
        *self.gate.lock().await = Some(Arc::new(Barrier::new(writers)));
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().await.clone();
        if let Some(barrier) = gate
            && barrier.wait().await.is_leader()
        {
            self.gate.lock().await.take();
        }
    }
}

#[async_trait]
impl TournamentRepository for GatedRepository {
    async fn create_tournament(
        &self,
        organizer_id: UserId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament> {
        self.inner.create_tournament(organizer_id, config, now).await
    }

    async fn get_tournament(&self, id: TournamentId) -> EngineResult<Option<Tournament>> {
        self.inner.get_tournament(id).await
    }

    async fn list_tournaments(&self) -> EngineResult<Vec<Tournament>> {
        self.inner.list_tournaments().await
    }

    async fn update_tournament_config(
        &self,
        id: TournamentId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.inner.update_tournament_config(id, config, now).await
    }

    async fn transition_tournament(
        &self,
        id: TournamentId,
        expected: TournamentStatus,
        next: TournamentStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament> {
        self.inner.transition_tournament(id, expected, next, now).await
    }
}

#[async_trait]
impl RegistrationRepository for GatedRepository {
    async fn create_registration(
        &self,
        new: &NewRegistration,
        capacity: u32,
        allow_waitlist: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration> {
        self.inner
            .create_registration(new, capacity, allow_waitlist, now)
            .await
    }

    async fn get_registration(&self, id: RegistrationId) -> EngineResult<Option<Registration>> {
        self.inner.get_registration(id).await
    }

    async fn find_registration(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Option<Registration>> {
        self.inner.find_registration(tournament_id, player_id).await
    }

    async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> EngineResult<Vec<Registration>> {
        self.inner.list_registrations(tournament_id).await
    }

    async fn transition_registration(
        &self,
        id: RegistrationId,
        expected: RegistrationStatus,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration> {
        self.inner
            .transition_registration(id, expected, next, now)
            .await
    }

    async fn promote_waitlist(
        &self,
        tournament_id: TournamentId,
        capacity: u32,
        entry_type: EntryType,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Registration>> {
        self.inner
            .promote_waitlist(tournament_id, capacity, entry_type, now)
            .await
    }
}

#[async_trait]
impl StageRepository for GatedRepository {
    async fn get_or_create_stage(&self, new: &NewStage, now: DateTime<Utc>) -> EngineResult<Stage> {
        self.inner.get_or_create_stage(new, now).await
    }

    async fn get_stage(&self, id: StageId) -> EngineResult<Option<Stage>> {
        self.inner.get_stage(id).await
    }

    async fn list_stages(&self, tournament_id: TournamentId) -> EngineResult<Vec<Stage>> {
        self.inner.list_stages(tournament_id).await
    }

    async fn set_stage_status(&self, id: StageId, status: StageStatus) -> EngineResult<()> {
        self.inner.set_stage_status(id, status).await
    }
}

#[async_trait]
impl MatchRepository for GatedRepository {
    async fn get_match(&self, id: MatchId) -> EngineResult<Option<Match>> {
        self.inner.get_match(id).await
    }

    async fn list_stage_matches(&self, stage_id: StageId) -> EngineResult<Vec<Match>> {
        self.inner.list_stage_matches(stage_id).await
    }

    async fn list_tournament_matches(&self, tournament_id: TournamentId) -> EngineResult<Vec<Match>> {
        self.inner.list_tournament_matches(tournament_id).await
    }

    async fn update_match_result(&self, next: &Match, expected_version: i64) -> EngineResult<Match> {
        self.pass_gate().await;
        self.inner.update_match_result(next, expected_version).await
    }

    async fn insert_round(&self, batch: &RoundBatch) -> EngineResult<Vec<Match>> {
        self.inner.insert_round(batch).await
    }
}

#[async_trait]
impl StandingRepository for GatedRepository {
    async fn refresh_standings(
        &self,
        tournament_id: TournamentId,
        stage_id: StageId,
        compute: StandingsFn,
    ) -> EngineResult<Vec<Standing>> {
        self.inner
            .refresh_standings(tournament_id, stage_id, compute)
            .await
    }

    async fn list_standings(&self, stage_id: StageId) -> EngineResult<Vec<Standing>> {
        self.inner.list_standings(stage_id).await
    }
}
