//! Pairing manager: loads a stage, runs its strategy and persists the round.

use log::{debug, info, warn};
use std::sync::Arc;

use super::swiss::swiss_rounds_for;
use super::{PairingContext, PairingStrategy, Strategy};
use crate::clock::Clock;
use crate::db::repository::{
    MatchRepository, RegistrationRepository, Repository, RoundBatch, RoundGuard, StageRepository,
    StandingRepository, require_tournament,
};
use crate::errors::{EngineError, EngineResult};
use crate::locks::KeyedLocks;
use crate::matches::models::{BracketSide, Match, NewMatch};
use crate::registration::models::{Registration, RegistrationId, sort_by_seed};
use crate::stage::models::{NewStage, Stage, StageSettings, StageStatus, StageType};
use crate::standings::StandingsManager;
use crate::standings::models::Standing;
use crate::tournament::models::{Actor, Tournament, TournamentFormat, TournamentId, TournamentStatus};

/// A persisted round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRound {
    pub stage: Stage,
    /// Every match created, byes included; losers-bracket matches carry the
    /// losers stage id
    pub matches: Vec<Match>,
}

/// Owned inputs of a [`PairingContext`]
struct StageSnapshot {
    stage: Stage,
    /// Losers bracket of a double elimination
    losers: Option<Stage>,
    players: Vec<Registration>,
    matches: Vec<Match>,
    standings: Vec<Standing>,
}

impl StageSnapshot {
    fn context(&self) -> PairingContext<'_> {
        PairingContext {
            stage: &self.stage,
            players: &self.players,
            prior_matches: &self.matches,
            standings: &self.standings,
        }
    }

    fn last_round_of(&self, stage: &Stage) -> u32 {
        self.matches
            .iter()
            .filter(|m| m.stage_id == stage.id)
            .map(|m| m.round_number)
            .max()
            .unwrap_or(0)
    }

    fn stages(&self) -> impl Iterator<Item = &Stage> {
        std::iter::once(&self.stage).chain(self.losers.as_ref())
    }
}

/// Pairing manager
#[derive(Clone)]
pub struct PairingManager {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    standings: StandingsManager,
    locks: Arc<KeyedLocks<(TournamentId, StageType)>>,
}

impl PairingManager {
    /// Create a new pairing manager
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, standings: StandingsManager) -> Self {
        Self {
            repo,
            clock,
            standings,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Generate and persist the next round
    ///
    /// Without an explicit `stage_type` the stage reported by
    /// [`PairingManager::current_stage`] is used, which moves a Swiss with top
    /// cut on to the cut once the Swiss rounds are over.
    ///
    /// # Errors
    ///
    /// * `EngineError::PermissionDenied` - Actor is not the organizer or an admin
    /// * `EngineError::InvalidState` - Tournament not running, or stage type foreign to the format
    /// * `EngineError::PreconditionFailed` - Open matches, stage complete, too few players
    /// * `EngineError::Conflict` - Another caller generated the round first
    pub async fn generate_next_round(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
        stage_type: Option<StageType>,
    ) -> EngineResult<GeneratedRound> {
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        tournament.ensure_manager(actor)?;
        tournament.ensure_status(TournamentStatus::Running)?;

        let stage_type = match stage_type {
            Some(requested) => Self::ensure_stage_type(&tournament, requested)?,
            None => self.current_stage(tournament_id).await?.ok_or_else(|| {
                EngineError::PreconditionFailed(format!(
                    "every stage of tournament {tournament_id} is complete"
                ))
            })?,
        };

        let _guard = self.locks.lock(&(tournament_id, stage_type)).await;

        let snapshot = self.snapshot(&tournament, stage_type).await?;
        if snapshot.stage.status == StageStatus::Completed {
            return Err(EngineError::PreconditionFailed(format!(
                "stage {} is complete",
                snapshot.stage.id
            )));
        }

        let ctx = snapshot.context();
        if ctx.has_open_matches() {
            return Err(EngineError::PreconditionFailed(format!(
                "stage {} still has open matches",
                snapshot.stage.id
            )));
        }

        let strategy = Strategy::for_stage(&snapshot.stage);
        if strategy.is_complete(&ctx) {
            self.complete(&snapshot).await?;
            return Err(EngineError::PreconditionFailed(format!(
                "stage {} is complete",
                snapshot.stage.id
            )));
        }

        let plan = strategy.generate_next_round(&ctx)?;
        if plan.matches.is_empty() {
            return Err(EngineError::PreconditionFailed(format!(
                "stage {} has nothing to pair",
                snapshot.stage.id
            )));
        }

        let losers_id = snapshot.losers.as_ref().map(|s| s.id);
        let matches = plan
            .matches
            .into_iter()
            .map(|m| {
                let stage_id = match (m.side, losers_id) {
                    (BracketSide::Losers, Some(losers_id)) => losers_id,
                    _ => snapshot.stage.id,
                };
                (stage_id, m)
            })
            .collect();

        let batch = RoundBatch {
            tournament_id,
            guards: snapshot
                .stages()
                .map(|stage| RoundGuard {
                    stage_id: stage.id,
                    expected_last_round: snapshot.last_round_of(stage),
                })
                .collect(),
            matches,
            settings: plan.settings.map(|settings| (snapshot.stage.id, settings)),
            created_at: self.clock.now(),
        };

        let created = match self.repo.insert_round(&batch).await {
            Ok(created) => created,
            Err(err) => {
                if err.is_conflict() {
                    warn!(
                        "Rejected concurrent round generation for tournament {} stage {}",
                        tournament_id, snapshot.stage.id
                    );
                }
                return Err(err);
            }
        };

        let round = created.first().map(|m| m.round_number).unwrap_or(0);
        info!(
            "Generated round {} of {} stage {} for tournament {} ({} matches)",
            round,
            stage_type,
            snapshot.stage.id,
            tournament_id,
            created.len()
        );

        // Byes are confirmed on creation and score immediately
        for stage in snapshot.stages() {
            if created.iter().any(|m| m.stage_id == stage.id && m.is_bye()) {
                self.standings.recompute(tournament_id, stage.id).await?;
            }
        }

        Ok(GeneratedRound {
            stage: snapshot.stage,
            matches: created,
        })
    }

    /// The stage the format would generate next, `None` once every stage is complete
    ///
    /// A stage whose strategy reports completion is marked completed on the way.
    pub async fn current_stage(&self, tournament_id: TournamentId) -> EngineResult<Option<StageType>> {
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        let existing = self.repo.list_stages(tournament_id).await?;

        for &stage_type in Self::generated_stages(tournament.config.format) {
            let Some(stage) = existing.iter().find(|s| s.stage_type == stage_type) else {
                return Ok(Some(stage_type));
            };
            if stage.status == StageStatus::Completed {
                continue;
            }

            let snapshot = self.snapshot(&tournament, stage_type).await?;
            let ctx = snapshot.context();
            if !ctx.has_open_matches() && Strategy::for_stage(&snapshot.stage).is_complete(&ctx) {
                self.complete(&snapshot).await?;
                continue;
            }
            return Ok(Some(stage_type));
        }

        Ok(None)
    }

    /// Add an organizer-defined match to a custom stage
    ///
    /// The match joins `round_number` at the next free table; without
    /// `player_b` it is a bye.
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidState` - Not a custom tournament, or not running
    /// * `EngineError::InvalidInput` - Unknown, inactive or repeated players
    pub async fn add_manual_match(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
        round_number: u32,
        player_a: RegistrationId,
        player_b: Option<RegistrationId>,
    ) -> EngineResult<Match> {
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        tournament.ensure_manager(actor)?;
        tournament.ensure_status(TournamentStatus::Running)?;
        if tournament.config.format != TournamentFormat::Custom {
            return Err(EngineError::InvalidState(format!(
                "tournament {tournament_id} is {}, manual matches need a custom format",
                tournament.config.format
            )));
        }
        if round_number == 0 {
            return Err(EngineError::InvalidInput("rounds start at 1".into()));
        }
        if player_b == Some(player_a) {
            return Err(EngineError::InvalidInput(
                "a player cannot be paired with themselves".into(),
            ));
        }

        let _guard = self.locks.lock(&(tournament_id, StageType::Custom)).await;
        let snapshot = self.snapshot(&tournament, StageType::Custom).await?;
        let ctx = snapshot.context();
        for id in std::iter::once(player_a).chain(player_b) {
            if !ctx.is_pairable(id) {
                return Err(EngineError::InvalidInput(format!(
                    "registration {id} is not an active player of tournament {tournament_id}"
                )));
            }
        }

        let table = ctx
            .matches_in_round(round_number)
            .iter()
            .map(|m| m.table_number)
            .max()
            .unwrap_or(0)
            + 1;
        let new = match player_b {
            Some(player_b) => NewMatch::pairing(round_number, table, player_a, player_b),
            None => NewMatch::bye(round_number, table, player_a),
        };

        let batch = RoundBatch {
            tournament_id,
            guards: Vec::new(),
            matches: vec![(snapshot.stage.id, new)],
            settings: None,
            created_at: self.clock.now(),
        };
        let created = self
            .repo
            .insert_round(&batch)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::InvalidState("manual match was not stored".into()))?;

        info!(
            "Added manual match {} to round {} of tournament {}",
            created.id, round_number, tournament_id
        );
        if created.is_bye() {
            self.standings
                .recompute(tournament_id, snapshot.stage.id)
                .await?;
        }
        Ok(created)
    }

    /// Stage types generated through this manager; the losers bracket rides
    /// along with the winners bracket
    fn generated_stages(format: TournamentFormat) -> impl Iterator<Item = &'static StageType> {
        StageType::sequence_for(format)
            .iter()
            .filter(|t| **t != StageType::Losers)
    }

    fn ensure_stage_type(tournament: &Tournament, requested: StageType) -> EngineResult<StageType> {
        let requested = if requested == StageType::Losers {
            StageType::Winners
        } else {
            requested
        };
        if StageType::sequence_for(tournament.config.format).contains(&requested) {
            Ok(requested)
        } else {
            Err(EngineError::InvalidState(format!(
                "{} tournaments have no {} stage",
                tournament.config.format, requested
            )))
        }
    }

    async fn complete(&self, snapshot: &StageSnapshot) -> EngineResult<()> {
        for stage in snapshot.stages() {
            if stage.status != StageStatus::Completed {
                self.repo
                    .set_stage_status(stage.id, StageStatus::Completed)
                    .await?;
                info!("Stage {} ({}) completed", stage.id, stage.stage_type);
            }
        }
        Ok(())
    }

    /// Create the stage on first use and gather everything its strategy reads
    async fn snapshot(&self, tournament: &Tournament, stage_type: StageType) -> EngineResult<StageSnapshot> {
        let mut players: Vec<Registration> = self
            .repo
            .list_registrations(tournament.id)
            .await?
            .into_iter()
            .filter(|r| r.status.is_pairable())
            .collect();
        sort_by_seed(&mut players);

        let settings = self
            .initial_settings(tournament, stage_type, players.len())
            .await?;
        let stage = self.stage(tournament, stage_type, settings).await?;

        let losers = if stage_type == StageType::Winners {
            Some(
                self.stage(tournament, StageType::Losers, StageSettings::default())
                    .await?,
            )
        } else {
            None
        };

        let mut matches = self.repo.list_stage_matches(stage.id).await?;
        if let Some(losers) = &losers {
            matches.extend(self.repo.list_stage_matches(losers.id).await?);
        }

        let standings = match stage.settings.source_stage_id {
            Some(source) => self.standings.recompute(tournament.id, source).await?,
            None => self.repo.list_standings(stage.id).await?,
        };

        debug!(
            "Stage {} snapshot: {} players, {} matches, {} standings",
            stage.id,
            players.len(),
            matches.len(),
            standings.len()
        );

        Ok(StageSnapshot {
            stage,
            losers,
            players,
            matches,
            standings,
        })
    }

    async fn stage(
        &self,
        tournament: &Tournament,
        stage_type: StageType,
        settings: StageSettings,
    ) -> EngineResult<Stage> {
        let sequence = StageType::sequence_for(tournament.config.format)
            .iter()
            .position(|t| *t == stage_type)
            .map(|index| index as u32 + 1)
            .unwrap_or(1);
        self.repo
            .get_or_create_stage(
                &NewStage {
                    tournament_id: tournament.id,
                    stage_type,
                    sequence,
                    settings,
                },
                self.clock.now(),
            )
            .await
    }

    /// Settings a stage is created with; ignored when the stage already exists
    async fn initial_settings(
        &self,
        tournament: &Tournament,
        stage_type: StageType,
        active_players: usize,
    ) -> EngineResult<StageSettings> {
        let config = &tournament.config;
        let mut settings = StageSettings::default();
        match stage_type {
            StageType::Swiss => {
                settings.swiss_rounds = Some(
                    config
                        .swiss_rounds
                        .unwrap_or_else(|| swiss_rounds_for(active_players)),
                );
            }
            StageType::TopCut => {
                let swiss = self
                    .repo
                    .list_stages(tournament.id)
                    .await?
                    .into_iter()
                    .find(|s| s.stage_type == StageType::Swiss)
                    .ok_or_else(|| {
                        EngineError::PreconditionFailed(
                            "top cut needs a played swiss stage".into(),
                        )
                    })?;
                settings.source_stage_id = Some(swiss.id);
                settings.top_cut_size = config.top_cut_size;
            }
            StageType::Groups => settings.group_count = config.group_count,
            StageType::League => settings.legs = config.league_legs,
            _ => {}
        }
        Ok(settings)
    }
}
