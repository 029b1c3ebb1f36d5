//! In-memory repository.
//!
//! Backs the test suites and the simulator. A single async mutex guards the
//! whole state, which makes every repository method trivially atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::repository::{
    MatchRepository, RegistrationRepository, RoundBatch, StageRepository, StandingRepository,
    StandingsFn, TournamentRepository,
};
use crate::errors::{EngineError, EngineResult};
use crate::matches::models::{Match, MatchId};
use crate::registration::models::{
    EntryType, NewRegistration, Registration, RegistrationId, RegistrationStatus, seat_assignment,
};
use crate::stage::models::{NewStage, Stage, StageId, StageStatus};
use crate::standings::models::Standing;
use crate::tournament::models::{Tournament, TournamentConfig, TournamentId, TournamentStatus, UserId};

#[derive(Debug, Default)]
struct MemoryState {
    last_tournament_id: TournamentId,
    last_registration_id: RegistrationId,
    last_stage_id: StageId,
    last_match_id: MatchId,
    tournaments: BTreeMap<TournamentId, Tournament>,
    registrations: BTreeMap<RegistrationId, Registration>,
    stages: BTreeMap<StageId, Stage>,
    matches: BTreeMap<MatchId, Match>,
    standings: BTreeMap<StageId, Vec<Standing>>,
}

impl MemoryState {
    fn tournament_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> impl Iterator<Item = &Registration> {
        self.registrations
            .values()
            .filter(move |r| r.tournament_id == tournament_id)
    }

    fn occupied(&self, tournament_id: TournamentId) -> usize {
        self.tournament_registrations(tournament_id)
            .filter(|r| r.status.holds_seat())
            .count()
    }

    fn next_seed(&self, tournament_id: TournamentId) -> u32 {
        self.tournament_registrations(tournament_id)
            .filter_map(|r| r.seed)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn stage_matches(&self, stage_id: StageId) -> impl Iterator<Item = &Match> {
        self.matches.values().filter(move |m| m.stage_id == stage_id)
    }
}

/// Repository keeping every row in process memory
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TournamentRepository for MemoryRepository {
    async fn create_tournament(
        &self,
        organizer_id: UserId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament> {
        let mut state = self.state.lock().await;
        state.last_tournament_id += 1;
        let tournament = Tournament {
            id: state.last_tournament_id,
            organizer_id,
            config: config.clone(),
            status: TournamentStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        state.tournaments.insert(tournament.id, tournament.clone());
        Ok(tournament)
    }

    async fn get_tournament(&self, id: TournamentId) -> EngineResult<Option<Tournament>> {
        Ok(self.state.lock().await.tournaments.get(&id).cloned())
    }

    async fn list_tournaments(&self) -> EngineResult<Vec<Tournament>> {
        Ok(self.state.lock().await.tournaments.values().cloned().collect())
    }

    async fn update_tournament_config(
        &self,
        id: TournamentId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        let tournament = state
            .tournaments
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("tournament {id}")))?;
        tournament.config = config.clone();
        tournament.updated_at = now;
        Ok(())
    }

    async fn transition_tournament(
        &self,
        id: TournamentId,
        expected: TournamentStatus,
        next: TournamentStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament> {
        let mut state = self.state.lock().await;
        let tournament = state
            .tournaments
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("tournament {id}")))?;
        if tournament.status != expected {
            return Err(EngineError::Conflict(format!(
                "tournament {id} is {}, expected {expected}",
                tournament.status
            )));
        }
        tournament.status = next;
        tournament.updated_at = now;
        Ok(tournament.clone())
    }
}

#[async_trait]
impl RegistrationRepository for MemoryRepository {
    async fn create_registration(
        &self,
        new: &NewRegistration,
        capacity: u32,
        allow_waitlist: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration> {
        let mut state = self.state.lock().await;
        if state
            .tournament_registrations(new.tournament_id)
            .any(|r| r.player_id == new.player_id && r.status.is_active())
        {
            return Err(EngineError::PreconditionFailed(format!(
                "player {} is already registered for tournament {}",
                new.player_id, new.tournament_id
            )));
        }

        let status = seat_assignment(
            state.occupied(new.tournament_id),
            capacity,
            allow_waitlist,
            new.entry_type,
        )?;
        let seed = (status == RegistrationStatus::Confirmed).then(|| state.next_seed(new.tournament_id));

        state.last_registration_id += 1;
        let registration = Registration {
            id: state.last_registration_id,
            tournament_id: new.tournament_id,
            player_id: new.player_id,
            display_name: new.display_name.clone(),
            status,
            entry_type: new.entry_type,
            seed,
            created_at: now,
            updated_at: now,
        };
        state
            .registrations
            .insert(registration.id, registration.clone());
        Ok(registration)
    }

    async fn get_registration(&self, id: RegistrationId) -> EngineResult<Option<Registration>> {
        Ok(self.state.lock().await.registrations.get(&id).cloned())
    }

    async fn find_registration(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Option<Registration>> {
        let state = self.state.lock().await;
        let mine: Vec<&Registration> = state
            .tournament_registrations(tournament_id)
            .filter(|r| r.player_id == player_id)
            .collect();
        Ok(mine
            .iter()
            .find(|r| r.status.is_active())
            .or_else(|| mine.last())
            .map(|r| (*r).clone()))
    }

    async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> EngineResult<Vec<Registration>> {
        let state = self.state.lock().await;
        Ok(state
            .tournament_registrations(tournament_id)
            .cloned()
            .collect())
    }

    async fn transition_registration(
        &self,
        id: RegistrationId,
        expected: RegistrationStatus,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration> {
        let mut state = self.state.lock().await;
        let (tournament_id, current) = state
            .registrations
            .get(&id)
            .map(|r| (r.tournament_id, r.status))
            .ok_or_else(|| EngineError::NotFound(format!("registration {id}")))?;
        if current != expected {
            return Err(EngineError::Conflict(format!(
                "registration {id} is {current}, expected {expected}"
            )));
        }

        let seed = state.next_seed(tournament_id);
        let registration = state
            .registrations
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("registration {id}")))?;
        registration.status = next;
        registration.updated_at = now;
        if next == RegistrationStatus::Confirmed && registration.seed.is_none() {
            registration.seed = Some(seed);
        }
        Ok(registration.clone())
    }

    async fn promote_waitlist(
        &self,
        tournament_id: TournamentId,
        capacity: u32,
        entry_type: EntryType,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Registration>> {
        let mut state = self.state.lock().await;
        if state.occupied(tournament_id) >= capacity as usize {
            return Ok(None);
        }
        let oldest = state
            .tournament_registrations(tournament_id)
            .filter(|r| r.status == RegistrationStatus::WaitingList)
            .min_by_key(|r| (r.created_at, r.id))
            .map(|r| r.id);
        let Some(id) = oldest else {
            return Ok(None);
        };

        let status = entry_type.seated_status();
        let seed = state.next_seed(tournament_id);
        let Some(registration) = state.registrations.get_mut(&id) else {
            return Ok(None);
        };
        registration.status = status;
        registration.updated_at = now;
        if status == RegistrationStatus::Confirmed {
            registration.seed = Some(seed);
        }
        Ok(Some(registration.clone()))
    }
}

#[async_trait]
impl StageRepository for MemoryRepository {
    async fn get_or_create_stage(&self, new: &NewStage, now: DateTime<Utc>) -> EngineResult<Stage> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .stages
            .values()
            .find(|s| s.tournament_id == new.tournament_id && s.stage_type == new.stage_type)
        {
            return Ok(existing.clone());
        }

        state.last_stage_id += 1;
        let stage = Stage {
            id: state.last_stage_id,
            tournament_id: new.tournament_id,
            stage_type: new.stage_type,
            sequence: new.sequence,
            settings: new.settings.clone(),
            status: StageStatus::Active,
            created_at: now,
        };
        state.stages.insert(stage.id, stage.clone());
        Ok(stage)
    }

    async fn get_stage(&self, id: StageId) -> EngineResult<Option<Stage>> {
        Ok(self.state.lock().await.stages.get(&id).cloned())
    }

    async fn list_stages(&self, tournament_id: TournamentId) -> EngineResult<Vec<Stage>> {
        let state = self.state.lock().await;
        let mut stages: Vec<Stage> = state
            .stages
            .values()
            .filter(|s| s.tournament_id == tournament_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| (s.sequence, s.id));
        Ok(stages)
    }

    async fn set_stage_status(&self, id: StageId, status: StageStatus) -> EngineResult<()> {
        let mut state = self.state.lock().await;
        let stage = state
            .stages
            .get_mut(&id)
            .ok_or_else(|| EngineError::NotFound(format!("stage {id}")))?;
        stage.status = status;
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for MemoryRepository {
    async fn get_match(&self, id: MatchId) -> EngineResult<Option<Match>> {
        Ok(self.state.lock().await.matches.get(&id).cloned())
    }

    async fn list_stage_matches(&self, stage_id: StageId) -> EngineResult<Vec<Match>> {
        let state = self.state.lock().await;
        let mut matches: Vec<Match> = state.stage_matches(stage_id).cloned().collect();
        matches.sort_by_key(|m| (m.round_number, m.table_number, m.id));
        Ok(matches)
    }

    async fn list_tournament_matches(&self, tournament_id: TournamentId) -> EngineResult<Vec<Match>> {
        let state = self.state.lock().await;
        let mut matches: Vec<Match> = state
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect();
        matches.sort_by_key(|m| (m.stage_id, m.round_number, m.table_number, m.id));
        Ok(matches)
    }

    async fn update_match_result(&self, next: &Match, expected_version: i64) -> EngineResult<Match> {
        let mut state = self.state.lock().await;
        let current = state
            .matches
            .get_mut(&next.id)
            .ok_or_else(|| EngineError::NotFound(format!("match {}", next.id)))?;
        if current.version != expected_version {
            return Err(EngineError::Conflict(format!(
                "match {} was changed concurrently",
                next.id
            )));
        }
        *current = next.clone();
        Ok(next.clone())
    }

    async fn insert_round(&self, batch: &RoundBatch) -> EngineResult<Vec<Match>> {
        let mut state = self.state.lock().await;

        for guard in &batch.guards {
            let matches: Vec<&Match> = state.stage_matches(guard.stage_id).collect();
            let last_round = matches.iter().map(|m| m.round_number).max().unwrap_or(0);
            if matches.iter().any(|m| m.result_status.is_open())
                || last_round != guard.expected_last_round
            {
                return Err(EngineError::Conflict(format!(
                    "stage {} already moved past round {}",
                    guard.stage_id, guard.expected_last_round
                )));
            }
        }

        if let Some((stage_id, settings)) = &batch.settings {
            let stage = state
                .stages
                .get_mut(stage_id)
                .ok_or_else(|| EngineError::NotFound(format!("stage {stage_id}")))?;
            stage.settings = settings.clone();
        }

        let mut created = Vec::with_capacity(batch.matches.len());
        for (stage_id, new) in &batch.matches {
            state.last_match_id += 1;
            let m = new.clone().into_match(
                state.last_match_id,
                batch.tournament_id,
                *stage_id,
                batch.created_at,
            );
            state.matches.insert(m.id, m.clone());
            created.push(m);
        }
        Ok(created)
    }
}

#[async_trait]
impl StandingRepository for MemoryRepository {
    async fn refresh_standings(
        &self,
        tournament_id: TournamentId,
        stage_id: StageId,
        compute: StandingsFn,
    ) -> EngineResult<Vec<Standing>> {
        let mut state = self.state.lock().await;
        let registrations: Vec<Registration> =
            state.tournament_registrations(tournament_id).cloned().collect();
        let mut matches: Vec<Match> = state.stage_matches(stage_id).cloned().collect();
        matches.sort_by_key(|m| (m.round_number, m.table_number, m.id));

        let rows = compute(tournament_id, stage_id, &registrations, &matches);
        state.standings.insert(stage_id, rows.clone());
        Ok(rows)
    }

    async fn list_standings(&self, stage_id: StageId) -> EngineResult<Vec<Standing>> {
        let state = self.state.lock().await;
        let mut rows = state.standings.get(&stage_id).cloned().unwrap_or_default();
        rows.sort_by_key(|s| s.rank);
        Ok(rows)
    }
}
