//! PostgreSQL repository.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

use super::repository::{
    MatchRepository, RegistrationRepository, RoundBatch, StageRepository, StandingRepository,
    StandingsFn, TournamentRepository,
};
use crate::errors::{EngineError, EngineResult};
use crate::matches::models::{Match, MatchId, ResultSignature};
use crate::registration::models::{
    EntryType, NewRegistration, Registration, RegistrationId, RegistrationStatus, seat_assignment,
};
use crate::stage::models::{NewStage, Stage, StageId, StageStatus};
use crate::standings::models::Standing;
use crate::tournament::models::{Tournament, TournamentConfig, TournamentId, TournamentStatus, UserId};

const TOURNAMENT_COLUMNS: &str =
    "id, organizer_id, status, config, created_at, updated_at";

const REGISTRATION_COLUMNS: &str =
    "id, tournament_id, player_id, display_name, status, entry_type, seed, created_at, updated_at";

const STAGE_COLUMNS: &str = "id, tournament_id, stage_type, sequence, settings, status, created_at";

const MATCH_COLUMNS: &str = "id, tournament_id, stage_id, round_number, table_number, player_a, \
     player_b, score_a, score_b, is_draw, winner, result_status, reported_by, confirmed_by, \
     group_label, version, created_at, updated_at";

const ACTIVE_STATUSES: &str = "('pending', 'confirmed', 'checked_in', 'waiting_list')";
const SEATED_STATUSES: &str = "('pending', 'confirmed', 'checked_in')";
const OPEN_RESULT_STATUSES: &str = "('pending', 'reported', 'disputed')";

fn unsigned(value: i32) -> u32 {
    value.max(0) as u32
}

fn tournament_from_row(r: &PgRow) -> EngineResult<Tournament> {
    let config: TournamentConfig = serde_json::from_str(&r.try_get::<String, _>("config")?)?;
    Ok(Tournament {
        id: r.try_get("id")?,
        organizer_id: r.try_get("organizer_id")?,
        config,
        status: r.try_get::<String, _>("status")?.parse()?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn registration_from_row(r: &PgRow) -> EngineResult<Registration> {
    Ok(Registration {
        id: r.try_get("id")?,
        tournament_id: r.try_get("tournament_id")?,
        player_id: r.try_get("player_id")?,
        display_name: r.try_get("display_name")?,
        status: r.try_get::<String, _>("status")?.parse()?,
        entry_type: r.try_get::<String, _>("entry_type")?.parse()?,
        seed: r.try_get::<Option<i32>, _>("seed")?.map(unsigned),
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn stage_from_row(r: &PgRow) -> EngineResult<Stage> {
    Ok(Stage {
        id: r.try_get("id")?,
        tournament_id: r.try_get("tournament_id")?,
        stage_type: r.try_get::<String, _>("stage_type")?.parse()?,
        sequence: unsigned(r.try_get("sequence")?),
        settings: serde_json::from_str(&r.try_get::<String, _>("settings")?)?,
        status: r.try_get::<String, _>("status")?.parse()?,
        created_at: r.try_get("created_at")?,
    })
}

fn signature_from_column(r: &PgRow, column: &str) -> EngineResult<Option<ResultSignature>> {
    match r.try_get::<Option<String>, _>(column)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn signature_to_column(signature: &Option<ResultSignature>) -> EngineResult<Option<String>> {
    signature
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(EngineError::from)
}

fn match_from_row(r: &PgRow) -> EngineResult<Match> {
    Ok(Match {
        id: r.try_get("id")?,
        tournament_id: r.try_get("tournament_id")?,
        stage_id: r.try_get("stage_id")?,
        round_number: unsigned(r.try_get("round_number")?),
        table_number: unsigned(r.try_get("table_number")?),
        player_a: r.try_get("player_a")?,
        player_b: r.try_get("player_b")?,
        score_a: r.try_get::<Option<i32>, _>("score_a")?.map(unsigned),
        score_b: r.try_get::<Option<i32>, _>("score_b")?.map(unsigned),
        is_draw: r.try_get("is_draw")?,
        winner: r.try_get("winner")?,
        result_status: r.try_get::<String, _>("result_status")?.parse()?,
        reported_by: signature_from_column(r, "reported_by")?,
        confirmed_by: signature_from_column(r, "confirmed_by")?,
        group_label: r.try_get("group_label")?,
        version: r.try_get("version")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn standing_from_row(r: &PgRow) -> EngineResult<Standing> {
    Ok(Standing {
        tournament_id: r.try_get("tournament_id")?,
        stage_id: r.try_get("stage_id")?,
        registration_id: r.try_get("registration_id")?,
        player_id: r.try_get("player_id")?,
        points: unsigned(r.try_get("points")?),
        wins: unsigned(r.try_get("wins")?),
        losses: unsigned(r.try_get("losses")?),
        draws: unsigned(r.try_get("draws")?),
        games_won: unsigned(r.try_get("games_won")?),
        games_played: unsigned(r.try_get("games_played")?),
        omw: r.try_get("omw")?,
        gw: r.try_get("gw")?,
        ogw: r.try_get("ogw")?,
        rank: unsigned(r.try_get("rank")?),
    })
}

/// Lock a tournament row for the rest of the transaction
async fn lock_tournament(
    tx: &mut Transaction<'_, Postgres>,
    tournament_id: TournamentId,
) -> EngineResult<()> {
    sqlx::query("SELECT id FROM tournaments WHERE id = $1 FOR UPDATE")
        .bind(tournament_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
    Ok(())
}

/// Delete and reinsert a stage's standings inside the caller's transaction
async fn write_standings(
    tx: &mut Transaction<'_, Postgres>,
    stage_id: StageId,
    rows: &[Standing],
) -> EngineResult<()> {
    sqlx::query("DELETE FROM tournament_standings WHERE stage_id = $1")
        .bind(stage_id)
        .execute(&mut **tx)
        .await?;

    for s in rows {
        sqlx::query(
            r#"
            INSERT INTO tournament_standings
                (tournament_id, stage_id, registration_id, player_id, points, wins, losses,
                 draws, games_won, games_played, omw, gw, ogw, rank)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(s.tournament_id)
        .bind(stage_id)
        .bind(s.registration_id)
        .bind(s.player_id)
        .bind(s.points as i32)
        .bind(s.wins as i32)
        .bind(s.losses as i32)
        .bind(s.draws as i32)
        .bind(s.games_won as i32)
        .bind(s.games_played as i32)
        .bind(s.omw)
        .bind(s.gw)
        .bind(s.ogw)
        .bind(s.rank as i32)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn next_seed(
    tx: &mut Transaction<'_, Postgres>,
    tournament_id: TournamentId,
) -> EngineResult<i32> {
    let row = sqlx::query(
        "SELECT COALESCE(MAX(seed), 0) + 1 AS next_seed FROM tournament_registrations WHERE tournament_id = $1",
    )
    .bind(tournament_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.try_get("next_seed")?)
}

async fn occupied_seats(
    tx: &mut Transaction<'_, Postgres>,
    tournament_id: TournamentId,
) -> EngineResult<usize> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(*) AS seats FROM tournament_registrations \
         WHERE tournament_id = $1 AND status IN {SEATED_STATUSES}"
    ))
    .bind(tournament_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.try_get::<i64, _>("seats")?.max(0) as usize)
}

/// Repository backed by the PostgreSQL schema in `migrations/`
#[derive(Clone)]
pub struct PgRepository {
    pool: Arc<PgPool>,
}

impl PgRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TournamentRepository for PgRepository {
    async fn create_tournament(
        &self,
        organizer_id: UserId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament> {
        let row = sqlx::query(&format!(
            "INSERT INTO tournaments (organizer_id, name, format, status, config, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {TOURNAMENT_COLUMNS}"
        ))
        .bind(organizer_id)
        .bind(&config.name)
        .bind(config.format.as_str())
        .bind(TournamentStatus::Draft.as_str())
        .bind(serde_json::to_string(config)?)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?;

        tournament_from_row(&row)
    }

    async fn get_tournament(&self, id: TournamentId) -> EngineResult<Option<Tournament>> {
        let row = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(tournament_from_row).transpose()
    }

    async fn list_tournaments(&self) -> EngineResult<Vec<Tournament>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments ORDER BY id"
        ))
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(tournament_from_row).collect()
    }

    async fn update_tournament_config(
        &self,
        id: TournamentId,
        config: &TournamentConfig,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        let result = sqlx::query(
            "UPDATE tournaments SET config = $2, name = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(serde_json::to_string(config)?)
        .bind(&config.name)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("tournament {id}")));
        }
        Ok(())
    }

    async fn transition_tournament(
        &self,
        id: TournamentId,
        expected: TournamentStatus,
        next: TournamentStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Tournament> {
        let row = sqlx::query(&format!(
            "UPDATE tournaments SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2 RETURNING {TOURNAMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        match row {
            Some(row) => tournament_from_row(&row),
            None => match self.get_tournament(id).await? {
                Some(current) => {
                    warn!(
                        "Tournament {} transition {} -> {} lost to {}",
                        id, expected, next, current.status
                    );
                    Err(EngineError::Conflict(format!(
                        "tournament {id} is {}, expected {expected}",
                        current.status
                    )))
                }
                None => Err(EngineError::NotFound(format!("tournament {id}"))),
            },
        }
    }
}

#[async_trait]
impl RegistrationRepository for PgRepository {
    async fn create_registration(
        &self,
        new: &NewRegistration,
        capacity: u32,
        allow_waitlist: bool,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration> {
        let mut tx = self.pool.begin().await?;
        lock_tournament(&mut tx, new.tournament_id).await?;

        let existing = sqlx::query(&format!(
            "SELECT COUNT(*) AS active FROM tournament_registrations \
             WHERE tournament_id = $1 AND player_id = $2 AND status IN {ACTIVE_STATUSES}"
        ))
        .bind(new.tournament_id)
        .bind(new.player_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get::<i64, _>("active")?;
        if existing > 0 {
            return Err(EngineError::PreconditionFailed(format!(
                "player {} is already registered for tournament {}",
                new.player_id, new.tournament_id
            )));
        }

        let occupied = occupied_seats(&mut tx, new.tournament_id).await?;
        let status = seat_assignment(occupied, capacity, allow_waitlist, new.entry_type)?;
        let seed = if status == RegistrationStatus::Confirmed {
            Some(next_seed(&mut tx, new.tournament_id).await?)
        } else {
            None
        };

        let row = sqlx::query(&format!(
            "INSERT INTO tournament_registrations \
             (tournament_id, player_id, display_name, status, entry_type, seed, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING {REGISTRATION_COLUMNS}"
        ))
        .bind(new.tournament_id)
        .bind(new.player_id)
        .bind(&new.display_name)
        .bind(status.as_str())
        .bind(new.entry_type.as_str())
        .bind(seed)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let registration = registration_from_row(&row)?;
        tx.commit().await?;
        Ok(registration)
    }

    async fn get_registration(&self, id: RegistrationId) -> EngineResult<Option<Registration>> {
        let row = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM tournament_registrations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(registration_from_row).transpose()
    }

    async fn find_registration(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Option<Registration>> {
        let row = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM tournament_registrations \
             WHERE tournament_id = $1 AND player_id = $2 \
             ORDER BY (status IN {ACTIVE_STATUSES}) DESC, id DESC LIMIT 1"
        ))
        .bind(tournament_id)
        .bind(player_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(registration_from_row).transpose()
    }

    async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> EngineResult<Vec<Registration>> {
        let rows = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM tournament_registrations \
             WHERE tournament_id = $1 ORDER BY id"
        ))
        .bind(tournament_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(registration_from_row).collect()
    }

    async fn transition_registration(
        &self,
        id: RegistrationId,
        expected: RegistrationStatus,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> EngineResult<Registration> {
        let tournament_id: TournamentId =
            sqlx::query("SELECT tournament_id FROM tournament_registrations WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool.as_ref())
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("registration {id}")))?
                .try_get("tournament_id")?;

        // Tournament first, then the registration: same order as promotion
        let mut tx = self.pool.begin().await?;
        lock_tournament(&mut tx, tournament_id).await?;

        let current: String =
            sqlx::query("SELECT status FROM tournament_registrations WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?
                .try_get("status")?;
        if current != expected.as_str() {
            return Err(EngineError::Conflict(format!(
                "registration {id} is {current}, expected {expected}"
            )));
        }

        let seed = if next == RegistrationStatus::Confirmed {
            Some(next_seed(&mut tx, tournament_id).await?)
        } else {
            None
        };

        let row = sqlx::query(&format!(
            "UPDATE tournament_registrations \
             SET status = $2, seed = COALESCE(seed, $3), updated_at = $4 \
             WHERE id = $1 RETURNING {REGISTRATION_COLUMNS}"
        ))
        .bind(id)
        .bind(next.as_str())
        .bind(seed)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let registration = registration_from_row(&row)?;
        tx.commit().await?;
        Ok(registration)
    }

    async fn promote_waitlist(
        &self,
        tournament_id: TournamentId,
        capacity: u32,
        entry_type: EntryType,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Registration>> {
        let mut tx = self.pool.begin().await?;
        lock_tournament(&mut tx, tournament_id).await?;

        if occupied_seats(&mut tx, tournament_id).await? >= capacity as usize {
            return Ok(None);
        }

        let oldest = sqlx::query(
            "SELECT id FROM tournament_registrations \
             WHERE tournament_id = $1 AND status = 'waiting_list' \
             ORDER BY created_at, id LIMIT 1 FOR UPDATE",
        )
        .bind(tournament_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(oldest) = oldest else {
            return Ok(None);
        };
        let id: RegistrationId = oldest.try_get("id")?;

        let status = entry_type.seated_status();
        let seed = if status == RegistrationStatus::Confirmed {
            Some(next_seed(&mut tx, tournament_id).await?)
        } else {
            None
        };

        let row = sqlx::query(&format!(
            "UPDATE tournament_registrations SET status = $2, seed = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {REGISTRATION_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(seed)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let registration = registration_from_row(&row)?;
        tx.commit().await?;
        Ok(Some(registration))
    }
}

#[async_trait]
impl StageRepository for PgRepository {
    async fn get_or_create_stage(&self, new: &NewStage, now: DateTime<Utc>) -> EngineResult<Stage> {
        let inserted = sqlx::query(&format!(
            "INSERT INTO tournament_stages (tournament_id, stage_type, sequence, settings, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (tournament_id, stage_type) DO NOTHING RETURNING {STAGE_COLUMNS}"
        ))
        .bind(new.tournament_id)
        .bind(new.stage_type.as_str())
        .bind(new.sequence as i32)
        .bind(serde_json::to_string(&new.settings)?)
        .bind(StageStatus::Active.as_str())
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        if let Some(row) = inserted {
            return stage_from_row(&row);
        }

        let row = sqlx::query(&format!(
            "SELECT {STAGE_COLUMNS} FROM tournament_stages WHERE tournament_id = $1 AND stage_type = $2"
        ))
        .bind(new.tournament_id)
        .bind(new.stage_type.as_str())
        .fetch_one(self.pool.as_ref())
        .await?;
        stage_from_row(&row)
    }

    async fn get_stage(&self, id: StageId) -> EngineResult<Option<Stage>> {
        let row = sqlx::query(&format!(
            "SELECT {STAGE_COLUMNS} FROM tournament_stages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(stage_from_row).transpose()
    }

    async fn list_stages(&self, tournament_id: TournamentId) -> EngineResult<Vec<Stage>> {
        let rows = sqlx::query(&format!(
            "SELECT {STAGE_COLUMNS} FROM tournament_stages WHERE tournament_id = $1 ORDER BY sequence, id"
        ))
        .bind(tournament_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(stage_from_row).collect()
    }

    async fn set_stage_status(&self, id: StageId, status: StageStatus) -> EngineResult<()> {
        let result = sqlx::query("UPDATE tournament_stages SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.pool.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("stage {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MatchRepository for PgRepository {
    async fn get_match(&self, id: MatchId) -> EngineResult<Option<Match>> {
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM tournament_matches WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(match_from_row).transpose()
    }

    async fn list_stage_matches(&self, stage_id: StageId) -> EngineResult<Vec<Match>> {
        let rows = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM tournament_matches \
             WHERE stage_id = $1 ORDER BY round_number, table_number, id"
        ))
        .bind(stage_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn list_tournament_matches(&self, tournament_id: TournamentId) -> EngineResult<Vec<Match>> {
        let rows = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM tournament_matches \
             WHERE tournament_id = $1 ORDER BY stage_id, round_number, table_number, id"
        ))
        .bind(tournament_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn update_match_result(&self, next: &Match, expected_version: i64) -> EngineResult<Match> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tournament_matches
            SET score_a = $3, score_b = $4, is_draw = $5, winner = $6, result_status = $7,
                reported_by = $8, confirmed_by = $9, version = $10, updated_at = $11
            WHERE id = $1 AND version = $2
            RETURNING {MATCH_COLUMNS}
            "#
        ))
        .bind(next.id)
        .bind(expected_version)
        .bind(next.score_a.map(|s| s as i32))
        .bind(next.score_b.map(|s| s as i32))
        .bind(next.is_draw)
        .bind(next.winner)
        .bind(next.result_status.as_str())
        .bind(signature_to_column(&next.reported_by)?)
        .bind(signature_to_column(&next.confirmed_by)?)
        .bind(next.version)
        .bind(next.updated_at)
        .fetch_optional(self.pool.as_ref())
        .await?;

        if let Some(row) = row {
            return match_from_row(&row);
        }
        if self.get_match(next.id).await?.is_none() {
            return Err(EngineError::NotFound(format!("match {}", next.id)));
        }
        warn!("Match {} result write lost a version race", next.id);
        Err(EngineError::Conflict(format!(
            "match {} was changed concurrently",
            next.id
        )))
    }

    async fn insert_round(&self, batch: &RoundBatch) -> EngineResult<Vec<Match>> {
        let mut tx = self.pool.begin().await?;

        let mut guards = batch.guards.clone();
        guards.sort_by_key(|g| g.stage_id);
        for guard in &guards {
            sqlx::query("SELECT id FROM tournament_stages WHERE id = $1 FOR UPDATE")
                .bind(guard.stage_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| EngineError::NotFound(format!("stage {}", guard.stage_id)))?;

            let row = sqlx::query(&format!(
                "SELECT COUNT(*) FILTER (WHERE result_status IN {OPEN_RESULT_STATUSES}) AS open_matches, \
                        COALESCE(MAX(round_number), 0) AS last_round \
                 FROM tournament_matches WHERE stage_id = $1"
            ))
            .bind(guard.stage_id)
            .fetch_one(&mut *tx)
            .await?;
            let open: i64 = row.try_get("open_matches")?;
            let last_round: i32 = row.try_get("last_round")?;
            if open > 0 || unsigned(last_round) != guard.expected_last_round {
                return Err(EngineError::Conflict(format!(
                    "stage {} already moved past round {}",
                    guard.stage_id, guard.expected_last_round
                )));
            }
        }

        if let Some((stage_id, settings)) = &batch.settings {
            sqlx::query("UPDATE tournament_stages SET settings = $2 WHERE id = $1")
                .bind(stage_id)
                .bind(serde_json::to_string(settings)?)
                .execute(&mut *tx)
                .await?;
        }

        let mut created = Vec::with_capacity(batch.matches.len());
        for (stage_id, new) in &batch.matches {
            // Materialize with a placeholder id to reuse the bye defaults
            let m = new.clone().into_match(0, batch.tournament_id, *stage_id, batch.created_at);
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO tournament_matches
                    (tournament_id, stage_id, round_number, table_number, player_a, player_b,
                     score_a, score_b, is_draw, winner, result_status, group_label, version,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
                RETURNING {MATCH_COLUMNS}
                "#
            ))
            .bind(m.tournament_id)
            .bind(m.stage_id)
            .bind(m.round_number as i32)
            .bind(m.table_number as i32)
            .bind(m.player_a)
            .bind(m.player_b)
            .bind(m.score_a.map(|s| s as i32))
            .bind(m.score_b.map(|s| s as i32))
            .bind(m.is_draw)
            .bind(m.winner)
            .bind(m.result_status.as_str())
            .bind(&m.group_label)
            .bind(m.version)
            .bind(m.created_at)
            .fetch_one(&mut *tx)
            .await?;
            created.push(match_from_row(&row)?);
        }

        tx.commit().await?;
        Ok(created)
    }
}

#[async_trait]
impl StandingRepository for PgRepository {
    async fn refresh_standings(
        &self,
        tournament_id: TournamentId,
        stage_id: StageId,
        compute: StandingsFn,
    ) -> EngineResult<Vec<Standing>> {
        let mut tx = self.pool.begin().await?;

        // Holding the stage row serializes refreshes across processes
        sqlx::query("SELECT id FROM tournament_stages WHERE id = $1 FOR UPDATE")
            .bind(stage_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("stage {stage_id}")))?;

        let registrations = sqlx::query(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM tournament_registrations \
             WHERE tournament_id = $1 ORDER BY id"
        ))
        .bind(tournament_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(registration_from_row)
        .collect::<EngineResult<Vec<_>>>()?;

        let matches = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM tournament_matches \
             WHERE stage_id = $1 ORDER BY round_number, table_number, id"
        ))
        .bind(stage_id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(match_from_row)
        .collect::<EngineResult<Vec<_>>>()?;

        let rows = compute(tournament_id, stage_id, &registrations, &matches);
        write_standings(&mut tx, stage_id, &rows).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn list_standings(&self, stage_id: StageId) -> EngineResult<Vec<Standing>> {
        let rows = sqlx::query("SELECT * FROM tournament_standings WHERE stage_id = $1 ORDER BY rank")
            .bind(stage_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.iter().map(standing_from_row).collect()
    }
}
