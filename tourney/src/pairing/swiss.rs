//! Swiss pairing.

use log::debug;
use std::collections::{HashMap, HashSet};

use super::{PairingContext, PairingStrategy, RoundPlan};
use crate::errors::{EngineError, EngineResult};
use crate::matches::models::{NewMatch, ResultStatus};
use crate::registration::models::RegistrationId;

/// Swiss round count for a player count
///
/// - up to 8 players: 3 rounds
/// - up to 16: 4, up to 32: 5, up to 64: 6, up to 128: 7
/// - more: 8
pub fn swiss_rounds_for(players: usize) -> u32 {
    match players {
        0..=8 => 3,
        9..=16 => 4,
        17..=32 => 5,
        33..=64 => 6,
        65..=128 => 7,
        _ => 8,
    }
}

/// Swiss pairing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwissPairing {
    /// Fixed when the stage is created; derived from the player count if unset
    pub rounds: Option<u32>,
}

impl SwissPairing {
    fn total_rounds(&self, ctx: &PairingContext<'_>) -> u32 {
        self.rounds
            .unwrap_or_else(|| swiss_rounds_for(ctx.players.len()))
    }
}

impl PairingStrategy for SwissPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        let total = self.total_rounds(ctx);
        let last = ctx.last_round();
        if last >= total {
            return Err(EngineError::PreconditionFailed(format!(
                "all {total} swiss rounds have been generated"
            )));
        }
        if ctx.players.len() < 2 {
            return Err(EngineError::PreconditionFailed(
                "swiss pairing needs at least 2 active players".into(),
            ));
        }

        let round = last + 1;
        let mut pool = ctx.standings_order();

        let mut played: HashMap<RegistrationId, HashSet<RegistrationId>> = HashMap::new();
        let mut byes: HashMap<RegistrationId, u32> = HashMap::new();
        for m in ctx
            .prior_matches
            .iter()
            .filter(|m| m.result_status != ResultStatus::Void)
        {
            match m.player_b {
                Some(player_b) => {
                    played.entry(m.player_a).or_default().insert(player_b);
                    played.entry(player_b).or_default().insert(m.player_a);
                }
                None => *byes.entry(m.player_a).or_default() += 1,
            }
        }

        // Fewest byes first; among equals the lowest-ranked player sits out
        let bye_player = if pool.len() % 2 == 1 {
            let fewest = pool
                .iter()
                .map(|id| byes.get(id).copied().unwrap_or(0))
                .min()
                .unwrap_or(0);
            let index = pool
                .iter()
                .rposition(|id| byes.get(id).copied().unwrap_or(0) == fewest)
                .unwrap_or(pool.len() - 1);
            Some(pool.remove(index))
        } else {
            None
        };

        let mut matches = Vec::with_capacity(pool.len() / 2 + 1);
        let mut table = 0;
        while !pool.is_empty() {
            let top = pool.remove(0);
            if pool.is_empty() {
                break;
            }
            let faced = played.get(&top);
            let index = pool
                .iter()
                .position(|candidate| !faced.is_some_and(|f| f.contains(candidate)))
                .unwrap_or_else(|| {
                    debug!("Swiss round {round}: rematch unavoidable for registration {top}");
                    0
                });
            let opponent = pool.remove(index);
            table += 1;
            matches.push(NewMatch::pairing(round, table, top, opponent));
        }

        if let Some(player) = bye_player {
            matches.push(NewMatch::bye(round, table + 1, player));
        }

        Ok(RoundPlan::new(matches))
    }

    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool {
        ctx.last_round() >= self.total_rounds(ctx)
    }
}
