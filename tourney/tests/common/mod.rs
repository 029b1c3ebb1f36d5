//! Shared harness for the integration tests: an engine over the in-memory
//! store with a pinned clock and recording collaborators.

#![allow(dead_code)]

pub mod gated;

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tourney::clock::FixedClock;
use tourney::collaborators::{LedgerPrizes, RecordingDecklists, StaticIdentity};
use tourney::db::MemoryRepository;
use tourney::matches::Match;
use tourney::pairing::GeneratedRound;
use tourney::registration::{Registration, RegistrationStatus, sort_by_seed};
use tourney::tournament::{Actor, Role, Tournament, TournamentConfig};
use tourney::{Collaborators, Engine, EngineConfig};

use gated::GatedRepository;

pub const ORGANIZER: Actor = Actor {
    user_id: 1,
    role: Role::Player,
};

pub const JUDGE: Actor = Actor {
    user_id: 900,
    role: Role::Staff,
};

/// User id of the n-th test player (1-based)
pub fn player(n: i64) -> i64 {
    100 + n
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 2, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: Engine,
    pub repo: Arc<MemoryRepository>,
    pub clock: Arc<FixedClock>,
    pub prizes: Arc<LedgerPrizes>,
    pub decklists: Arc<RecordingDecklists>,
}

impl Harness {
    pub fn new() -> Self {
        Self::at(epoch())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(FixedClock::new(now));
        let prizes = Arc::new(LedgerPrizes::new());
        let decklists = Arc::new(RecordingDecklists::new());
        let engine = Engine::new(
            repo.clone(),
            clock.clone(),
            EngineConfig::default(),
            Collaborators {
                identity: Arc::new(StaticIdentity::new()),
                decklists: decklists.clone(),
                prizes: prizes.clone(),
            },
        );
        Self {
            engine,
            repo,
            clock,
            prizes,
            decklists,
        }
    }

    /// Create, publish and open registration
    pub async fn open_tournament(&self, config: TournamentConfig) -> Tournament {
        let tournaments = &self.engine.tournaments;
        let tournament = tournaments
            .create_tournament(&ORGANIZER, config)
            .await
            .unwrap();
        tournaments.publish(tournament.id, &ORGANIZER).await.unwrap();
        tournaments
            .open_registration(tournament.id, &ORGANIZER)
            .await
            .unwrap()
    }

    /// Open a tournament, register and check in `players`, then start it
    pub async fn running_tournament(&self, config: TournamentConfig, players: i64) -> Tournament {
        let tournament = self.open_tournament(config).await;
        for n in 1..=players {
            self.engine
                .registrations
                .register(tournament.id, player(n))
                .await
                .unwrap();
        }
        self.engine
            .tournaments
            .open_check_in(tournament.id, &ORGANIZER)
            .await
            .unwrap();
        for n in 1..=players {
            self.engine
                .registrations
                .check_in(tournament.id, player(n))
                .await
                .unwrap();
        }
        self.engine
            .tournaments
            .start(tournament.id, &ORGANIZER)
            .await
            .unwrap()
    }

    /// Checked-in registrations in seed order
    pub async fn seeded_players(&self, tournament_id: i64) -> Vec<Registration> {
        let mut players: Vec<Registration> = self
            .engine
            .registrations
            .list_registrations(tournament_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.status == RegistrationStatus::CheckedIn)
            .collect();
        sort_by_seed(&mut players);
        players
    }

    /// Unsettled matches across every stage of the tournament
    pub async fn open_matches(&self, tournament_id: i64) -> Vec<Match> {
        use tourney::db::MatchRepository;
        self.repo
            .list_tournament_matches(tournament_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.result_status.is_open())
            .collect()
    }

    /// Settle every open match of the tournament through staff reports;
    /// `a_wins` decides each one
    pub async fn settle_open(&self, tournament_id: i64, a_wins: impl Fn(&Match) -> bool) {
        for m in self.open_matches(tournament_id).await {
            let (score_a, score_b) = if a_wins(&m) { (2, 0) } else { (0, 2) };
            self.engine
                .matches
                .report(m.id, &JUDGE, score_a, score_b)
                .await
                .unwrap();
        }
    }

    /// Second engine over the same state whose match writes can be gated
    pub fn gated_engine(&self) -> (Engine, Arc<GatedRepository>) {
        let gated = Arc::new(GatedRepository::new(self.repo.clone()));
        let engine = Engine::new(
            gated.clone(),
            self.clock.clone(),
            EngineConfig::default(),
            Collaborators {
                identity: Arc::new(StaticIdentity::new()),
                decklists: self.decklists.clone(),
                prizes: self.prizes.clone(),
            },
        );
        (engine, gated)
    }

    pub async fn next_round(&self, tournament_id: i64) -> GeneratedRound {
        self.engine
            .pairing
            .generate_next_round(tournament_id, &ORGANIZER, None)
            .await
            .unwrap()
    }
}

/// Unordered pair of a non-bye match
pub fn pair_of(m: &Match) -> Option<(i64, i64)> {
    let b = m.player_b?;
    Some((m.player_a.min(b), m.player_a.max(b)))
}
