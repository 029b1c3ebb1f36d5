//! Drives one tournament from draft to finish with random results.
//!
//! Every match goes through the full result protocol: player A reports,
//! player B confirms or disputes, and a judge settles disputes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tourney::db::{MatchRepository, Repository};
use tourney::matches::Match;
use tourney::registration::{Registration, RegistrationId, RegistrationStatus};
use tourney::standings::Standing;
use tourney::tournament::{Actor, FinalResult, TournamentFormat, TournamentId, UserId};
use tourney::{Engine, EngineError, EngineResult};
use tracing::{debug, info};

use crate::config::EventConfig;
use crate::logging;

const ORGANIZER: Actor = Actor {
    user_id: 1,
    role: tourney::tournament::Role::Player,
};

const JUDGE: Actor = Actor {
    user_id: 2,
    role: tourney::tournament::Role::Staff,
};

/// First platform user id handed to simulated players
const FIRST_PLAYER: UserId = 1_000;

/// Outcome of a simulated event
#[derive(Debug, Clone)]
pub struct Summary {
    pub tournament_id: TournamentId,
    pub rounds: u32,
    pub matches: usize,
    pub disputes: usize,
    pub result: FinalResult,
    /// Display names by registration
    pub names: HashMap<RegistrationId, String>,
}

pub struct Simulation {
    repo: Arc<dyn Repository>,
    engine: Engine,
    event: EventConfig,
    rng: StdRng,
    disputes: usize,
}

impl Simulation {
    pub fn new(repo: Arc<dyn Repository>, engine: Engine, event: EventConfig) -> Self {
        let rng = match event.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            repo,
            engine,
            event,
            rng,
            disputes: 0,
        }
    }

    /// Run the event to completion
    ///
    /// # Errors
    ///
    /// Any engine error other than the end of pairings
    pub async fn run(&mut self) -> EngineResult<Summary> {
        let tournament_id = self.open_event().await?;
        let registrations = self.seat_players(tournament_id).await?;
        self.engine.tournaments.start(tournament_id, &ORGANIZER).await?;
        info!("Tournament {} started with {} players", tournament_id, registrations.len());

        loop {
            let settled = self.settle_open_matches(tournament_id).await?;
            debug!("Settled {} matches", settled);

            match self
                .engine
                .pairing
                .generate_next_round(tournament_id, &ORGANIZER, None)
                .await
            {
                Ok(generated) => {
                    let round = generated
                        .matches
                        .iter()
                        .map(|m| m.round_number)
                        .max()
                        .unwrap_or(0);
                    logging::log_round(
                        tournament_id,
                        &generated.stage.stage_type.to_string(),
                        round,
                        generated.matches.len(),
                    );
                }
                Err(EngineError::PreconditionFailed(reason)) => {
                    info!("Pairings finished: {}", reason);
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        let all_matches = self.repo.list_tournament_matches(tournament_id).await?;
        let played_rounds = all_matches
            .iter()
            .map(|m| (m.stage_id, m.round_number))
            .collect::<HashSet<_>>()
            .len() as u32;

        let result = self.engine.tournaments.finish(tournament_id, &ORGANIZER).await?;
        let names = registrations
            .into_iter()
            .map(|r| (r.id, r.display_name))
            .collect();

        Ok(Summary {
            tournament_id,
            rounds: played_rounds,
            matches: all_matches.iter().filter(|m| !m.is_bye()).count(),
            disputes: self.disputes,
            result,
            names,
        })
    }

    async fn open_event(&self) -> EngineResult<TournamentId> {
        let tournaments = &self.engine.tournaments;
        let name = format!("Simulated {}", self.event.format);
        let mut config = tournaments.default_config(name, self.event.format, self.event.capacity);
        config.top_cut_size = self.event.top_cut;
        config.prize_credit_cents = self.event.prize_credit_cents;

        let tournament = tournaments.create_tournament(&ORGANIZER, config).await?;
        tournaments.publish(tournament.id, &ORGANIZER).await?;
        tournaments.open_registration(tournament.id, &ORGANIZER).await?;
        Ok(tournament.id)
    }

    /// Register everyone, then check in whoever got a seat
    async fn seat_players(&self, tournament_id: TournamentId) -> EngineResult<Vec<Registration>> {
        let registrations = &self.engine.registrations;
        for n in 0..i64::from(self.event.players) {
            registrations.register(tournament_id, FIRST_PLAYER + n).await?;
        }

        self.engine
            .tournaments
            .open_check_in(tournament_id, &ORGANIZER)
            .await?;

        let mut seated = Vec::new();
        for registration in registrations.list_registrations(tournament_id).await? {
            if registration.status == RegistrationStatus::Confirmed {
                seated.push(
                    registrations
                        .check_in(tournament_id, registration.player_id)
                        .await?,
                );
            }
        }
        Ok(seated)
    }

    async fn settle_open_matches(&mut self, tournament_id: TournamentId) -> EngineResult<usize> {
        let open: Vec<Match> = self
            .repo
            .list_tournament_matches(tournament_id)
            .await?
            .into_iter()
            .filter(|m| m.result_status.is_open())
            .collect();

        let players: HashMap<RegistrationId, UserId> = self
            .engine
            .registrations
            .list_registrations(tournament_id)
            .await?
            .into_iter()
            .map(|r| (r.id, r.player_id))
            .collect();

        for m in &open {
            self.settle(m, &players).await?;
        }
        Ok(open.len())
    }

    async fn settle(&mut self, m: &Match, players: &HashMap<RegistrationId, UserId>) -> EngineResult<()> {
        let (Some(&user_a), Some(&user_b)) = (
            players.get(&m.player_a),
            m.player_b.and_then(|b| players.get(&b)),
        ) else {
            return Ok(());
        };
        let (score_a, score_b) = self.random_score();
        let matches = &self.engine.matches;

        matches.report(m.id, &Actor::player(user_a), score_a, score_b).await?;
        if self.rng.random_range(0..100u8) < self.event.dispute_percent {
            matches.dispute(m.id, &Actor::player(user_b)).await?;
            matches.report(m.id, &JUDGE, score_a, score_b).await?;
            self.disputes += 1;
            debug!("Judge settled disputed match {}", m.id);
        } else {
            matches.confirm(m.id, &Actor::player(user_b)).await?;
        }
        Ok(())
    }

    /// Best-of-three score line; draws only where the format scores them
    fn random_score(&mut self) -> (u32, u32) {
        if self.allows_draws() && self.rng.random_range(0..100u8) < self.event.draw_percent {
            return (1, 1);
        }
        let loser_games = self.rng.random_range(0..=1);
        if self.rng.random_bool(0.5) {
            (2, loser_games)
        } else {
            (loser_games, 2)
        }
    }

    fn allows_draws(&self) -> bool {
        matches!(
            self.event.format,
            TournamentFormat::Swiss
                | TournamentFormat::RoundRobin
                | TournamentFormat::League
                | TournamentFormat::GroupBrackets
        )
    }
}

/// Render a standings table
pub fn format_standings(standings: &[Standing], names: &HashMap<RegistrationId, String>) -> String {
    let mut out = format!(
        "{:>4}  {:<20} {:>4} {:>7} {:>6} {:>6} {:>6}\n",
        "Rank", "Player", "Pts", "W-L-D", "OMW", "GW", "OGW"
    );
    for row in standings {
        let name = names
            .get(&row.registration_id)
            .map(String::as_str)
            .unwrap_or("?");
        out.push_str(&format!(
            "{:>4}  {:<20} {:>4} {:>7} {:>5.1}% {:>5.1}% {:>5.1}%\n",
            row.rank,
            name,
            row.points,
            format!("{}-{}-{}", row.wins, row.losses, row.draws),
            row.omw * 100.0,
            row.gw * 100.0,
            row.ogw * 100.0,
        ));
    }
    out
}
