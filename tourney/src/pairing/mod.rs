//! Pairing and bracket generation.
//!
//! One [`PairingStrategy`] implementation per stage type, dispatched through
//! the [`Strategy`] enum with `enum_dispatch`. Strategies are pure: they read
//! the stage, its pairable players, its prior matches and the seeding standings,
//! and return the next round as [`NewMatch`] values. Persisting a round (all of
//! it or none of it) is the job of [`PairingManager`].
//!
//! ## Example
//!
//! ```
//! use tourney::pairing::elimination::bracket_order;
//!
//! assert_eq!(bracket_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
//! ```

pub mod custom;
pub mod elimination;
pub mod gauntlet;
pub mod manager;
pub mod round_robin;
pub mod swiss;

use enum_dispatch::enum_dispatch;
use std::collections::HashSet;

use crate::errors::EngineResult;
use crate::matches::models::{Match, NewMatch, ResultStatus};
use crate::registration::models::{Registration, RegistrationId};
use crate::stage::models::{Stage, StageSettings, StageType};
use crate::standings::models::Standing;

pub use custom::CustomPairing;
pub use elimination::{DoubleEliminationPairing, SingleEliminationPairing, TopCutPairing};
pub use gauntlet::GauntletPairing;
pub use manager::{GeneratedRound, PairingManager};
pub use round_robin::{GroupPairing, RoundRobinPairing};
pub use swiss::SwissPairing;

/// Everything a strategy may look at
#[derive(Debug, Clone, Copy)]
pub struct PairingContext<'a> {
    pub stage: &'a Stage,
    /// Pairable registrations in seed order
    pub players: &'a [Registration],
    /// Matches of the stage; both brackets for double elimination
    pub prior_matches: &'a [Match],
    /// Seeding standings: the stage's own (Swiss) or its source stage's (top cut)
    pub standings: &'a [Standing],
}

impl<'a> PairingContext<'a> {
    /// Highest round generated so far, 0 before the first round
    pub fn last_round(&self) -> u32 {
        self.prior_matches
            .iter()
            .map(|m| m.round_number)
            .max()
            .unwrap_or(0)
    }

    pub fn matches_in_round(&self, round: u32) -> Vec<&'a Match> {
        let mut matches: Vec<&'a Match> = self
            .prior_matches
            .iter()
            .filter(|m| m.round_number == round)
            .collect();
        matches.sort_by_key(|m| (m.table_number, m.id));
        matches
    }

    pub fn seed_order(&self) -> Vec<RegistrationId> {
        self.players.iter().map(|r| r.id).collect()
    }

    /// Pairable players ranked by standings, unranked players after in seed order
    pub fn standings_order(&self) -> Vec<RegistrationId> {
        let pairable: HashSet<RegistrationId> = self.players.iter().map(|r| r.id).collect();
        let mut ranked: Vec<&Standing> = self
            .standings
            .iter()
            .filter(|s| pairable.contains(&s.registration_id))
            .collect();
        ranked.sort_by_key(|s| s.rank);

        let mut order: Vec<RegistrationId> = ranked.iter().map(|s| s.registration_id).collect();
        let listed: HashSet<RegistrationId> = order.iter().copied().collect();
        order.extend(self.players.iter().map(|r| r.id).filter(|id| !listed.contains(id)));
        order
    }

    pub fn is_pairable(&self, registration_id: RegistrationId) -> bool {
        self.players.iter().any(|r| r.id == registration_id)
    }

    pub fn has_open_matches(&self) -> bool {
        self.prior_matches.iter().any(|m| m.result_status.is_open())
    }

    pub fn confirmed_matches(&self) -> impl Iterator<Item = &'a Match> {
        self.prior_matches
            .iter()
            .filter(|m| m.result_status == ResultStatus::Confirmed)
    }
}

/// The next round of a stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundPlan {
    pub matches: Vec<NewMatch>,
    /// Replacement stage settings, persisted together with the matches
    pub settings: Option<StageSettings>,
}

impl RoundPlan {
    pub fn new(matches: Vec<NewMatch>) -> Self {
        Self {
            matches,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: StageSettings) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// Per-format round generation
#[enum_dispatch]
pub trait PairingStrategy {
    /// Produce the next round of the stage
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan>;

    /// Whether the stage has nothing left to generate
    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool;
}

/// Strategy selected by a stage's type
#[enum_dispatch(PairingStrategy)]
#[derive(Debug, Clone)]
pub enum Strategy {
    Swiss(SwissPairing),
    TopCut(TopCutPairing),
    SingleElimination(SingleEliminationPairing),
    DoubleElimination(DoubleEliminationPairing),
    RoundRobin(RoundRobinPairing),
    Gauntlet(GauntletPairing),
    Groups(GroupPairing),
    Custom(CustomPairing),
}

impl Strategy {
    /// Select the strategy for a stage; the losers bracket is generated
    /// together with the winners bracket.
    pub fn for_stage(stage: &Stage) -> Self {
        let settings = &stage.settings;
        match stage.stage_type {
            StageType::Swiss => SwissPairing {
                rounds: settings.swiss_rounds,
            }
            .into(),
            StageType::TopCut => TopCutPairing {
                size: settings.top_cut_size.unwrap_or(8),
            }
            .into(),
            StageType::SingleElimination => SingleEliminationPairing.into(),
            StageType::Winners | StageType::Losers => DoubleEliminationPairing.into(),
            StageType::RoundRobin => RoundRobinPairing { legs: 1 }.into(),
            StageType::League => RoundRobinPairing {
                legs: settings.legs.unwrap_or(1),
            }
            .into(),
            StageType::Gauntlet => GauntletPairing.into(),
            StageType::Groups => GroupPairing {
                group_count: settings.group_count,
            }
            .into(),
            StageType::Custom => CustomPairing.into(),
        }
    }
}

/// Pair neighbours in order; an odd player out receives a bye
pub fn pair_adjacent(round: u32, ids: &[RegistrationId]) -> Vec<NewMatch> {
    let mut matches = Vec::with_capacity(ids.len().div_ceil(2));
    for (index, pair) in ids.chunks(2).enumerate() {
        let table = index as u32 + 1;
        match *pair {
            [a, b] => matches.push(NewMatch::pairing(round, table, a, b)),
            [a] => matches.push(NewMatch::bye(round, table, a)),
            _ => {}
        }
    }
    matches
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::matches::models::MatchId;
    use crate::registration::models::{EntryType, RegistrationStatus};
    use crate::stage::models::{StageId, StageStatus};
    use chrono::Utc;

    pub fn players(count: i64) -> Vec<Registration> {
        (1..=count)
            .map(|id| Registration {
                id,
                tournament_id: 1,
                player_id: 100 + id,
                display_name: format!("player{id}"),
                status: RegistrationStatus::CheckedIn,
                entry_type: EntryType::Free,
                seed: Some(id as u32),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .collect()
    }

    pub fn stage(id: StageId, stage_type: StageType, settings: StageSettings) -> Stage {
        Stage {
            id,
            tournament_id: 1,
            stage_type,
            sequence: 1,
            settings,
            status: StageStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Persist a plan the way the store would, settling every match with
    /// `decide` (true: player A wins)
    pub fn settle(
        plan: &RoundPlan,
        stage_id: StageId,
        next_id: &mut MatchId,
        decide: impl Fn(&NewMatch) -> bool,
    ) -> Vec<Match> {
        plan.matches
            .iter()
            .map(|new| {
                *next_id += 1;
                let mut m = new.clone().into_match(*next_id, 1, stage_id, Utc::now());
                if !m.is_bye() {
                    let a_wins = decide(new);
                    m.score_a = Some(if a_wins { 2 } else { 0 });
                    m.score_b = Some(if a_wins { 0 } else { 2 });
                    m.winner = if a_wins { Some(m.player_a) } else { m.player_b };
                    m.result_status = ResultStatus::Confirmed;
                }
                m
            })
            .collect()
    }
}
