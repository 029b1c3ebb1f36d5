//! Elimination brackets: single elimination, top cut and double elimination.

use log::debug;
use std::collections::HashMap;

use super::{PairingContext, PairingStrategy, RoundPlan, pair_adjacent};
use crate::errors::{EngineError, EngineResult};
use crate::matches::models::{BracketSide, GRAND_FINAL_LABEL, NewMatch, ResultStatus};
use crate::registration::models::RegistrationId;

/// Standard bracket seed order for a power-of-two bracket
///
/// Adjacent entries meet in round 1 and the top two seeds can only meet in
/// the final.
pub fn bracket_order(size: usize) -> Vec<usize> {
    let mut order = vec![1];
    while order.len() < size {
        let len = order.len();
        order = order
            .iter()
            .flat_map(|&seed| [seed, 2 * len + 1 - seed])
            .collect();
    }
    order
}

/// Smallest power of two holding `players`, at least 2
pub fn bracket_size(players: usize) -> usize {
    players.next_power_of_two().max(2)
}

/// Seeded first round; missing seeds become byes for their opponents
pub fn seeded_first_round(round: u32, seeds: &[RegistrationId]) -> Vec<NewMatch> {
    let order = bracket_order(bracket_size(seeds.len()));
    let at = |seed: usize| seeds.get(seed - 1).copied();

    let mut matches = Vec::with_capacity(order.len() / 2);
    for slot in order.chunks(2) {
        let table = matches.len() as u32 + 1;
        match (at(slot[0]), slot.get(1).and_then(|&s| at(s))) {
            (Some(a), Some(b)) => matches.push(NewMatch::pairing(round, table, a, b)),
            (Some(a), None) | (None, Some(a)) => matches.push(NewMatch::bye(round, table, a)),
            (None, None) => {}
        }
    }
    matches
}

fn ensure_no_draws(ctx: &PairingContext<'_>, round: u32) -> EngineResult<()> {
    let drawn = ctx
        .matches_in_round(round)
        .into_iter()
        .find(|m| m.result_status == ResultStatus::Confirmed && m.is_draw);
    match drawn {
        Some(m) => Err(EngineError::PreconditionFailed(format!(
            "match {} ended in a draw; correct the result before advancing",
            m.id
        ))),
        None => Ok(()),
    }
}

/// Winners of the last round in table order, still eligible to play
fn advancing(ctx: &PairingContext<'_>) -> EngineResult<Vec<RegistrationId>> {
    let last = ctx.last_round();
    ensure_no_draws(ctx, last)?;
    Ok(ctx
        .matches_in_round(last)
        .into_iter()
        .filter(|m| m.result_status == ResultStatus::Confirmed)
        .filter_map(|m| m.winner)
        .filter(|&winner| ctx.is_pairable(winner))
        .collect())
}

fn next_knockout_round(ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
    if ctx.has_open_matches() {
        return Err(EngineError::PreconditionFailed(
            "current round still has open matches".into(),
        ));
    }
    let winners = advancing(ctx)?;
    if winners.len() < 2 {
        return Err(EngineError::PreconditionFailed("bracket is complete".into()));
    }
    Ok(RoundPlan::new(pair_adjacent(ctx.last_round() + 1, &winners)))
}

fn knockout_complete(ctx: &PairingContext<'_>) -> bool {
    ctx.last_round() > 0
        && !ctx.has_open_matches()
        && advancing(ctx).is_ok_and(|winners| winners.len() <= 1)
}

/// Single elimination over all pairable players, padded with byes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleEliminationPairing;

impl PairingStrategy for SingleEliminationPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        if ctx.last_round() == 0 {
            if ctx.players.len() < 2 {
                return Err(EngineError::PreconditionFailed(
                    "single elimination needs at least 2 active players".into(),
                ));
            }
            return Ok(RoundPlan::new(seeded_first_round(1, &ctx.seed_order())));
        }
        next_knockout_round(ctx)
    }

    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool {
        knockout_complete(ctx)
    }
}

/// Single elimination seeded from the top of a Swiss stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopCutPairing {
    pub size: u32,
}

impl TopCutPairing {
    fn seeds(&self, ctx: &PairingContext<'_>) -> EngineResult<Vec<RegistrationId>> {
        let mut ranked: Vec<_> = ctx
            .standings
            .iter()
            .filter(|s| ctx.is_pairable(s.registration_id))
            .collect();
        ranked.sort_by_key(|s| s.rank);

        let size = self.size as usize;
        if ranked.len() < size {
            return Err(EngineError::PreconditionFailed(format!(
                "top cut of {size} needs {size} ranked players, found {}",
                ranked.len()
            )));
        }
        Ok(ranked
            .into_iter()
            .take(size)
            .map(|s| s.registration_id)
            .collect())
    }
}

impl PairingStrategy for TopCutPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        if ctx.last_round() == 0 {
            let seeds = self.seeds(ctx)?;
            debug!("Top cut of {} seeded: {:?}", self.size, seeds);
            return Ok(RoundPlan::new(seeded_first_round(1, &seeds)));
        }
        next_knockout_round(ctx)
    }

    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool {
        knockout_complete(ctx)
    }
}

/// Double elimination; the winners stage drives both brackets
///
/// Players with no loss play on the winners side, players with one loss on
/// the losers side, and a second loss eliminates. When exactly one player
/// remains on each side they meet in the grand final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleEliminationPairing;

impl DoubleEliminationPairing {
    fn losses(ctx: &PairingContext<'_>) -> HashMap<RegistrationId, u32> {
        let mut losses = HashMap::new();
        for loser in ctx.confirmed_matches().filter_map(|m| m.loser()) {
            *losses.entry(loser).or_insert(0) += 1;
        }
        losses
    }

    /// Alive players split into (winners side, losers side), in seed order
    fn sides(ctx: &PairingContext<'_>) -> (Vec<RegistrationId>, Vec<RegistrationId>) {
        let losses = Self::losses(ctx);
        let count = |id: &RegistrationId| losses.get(id).copied().unwrap_or(0);
        let seeds = ctx.seed_order();
        let winners = seeds.iter().copied().filter(|id| count(id) == 0).collect();
        let losers = seeds.iter().copied().filter(|id| count(id) == 1).collect();
        (winners, losers)
    }

    fn grand_final_played(ctx: &PairingContext<'_>) -> bool {
        ctx.confirmed_matches().any(|m| m.is_grand_final())
    }
}

impl PairingStrategy for DoubleEliminationPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        let last = ctx.last_round();
        if last == 0 {
            if ctx.players.len() < 2 {
                return Err(EngineError::PreconditionFailed(
                    "double elimination needs at least 2 active players".into(),
                ));
            }
            return Ok(RoundPlan::new(seeded_first_round(1, &ctx.seed_order())));
        }
        if ctx.has_open_matches() {
            return Err(EngineError::PreconditionFailed(
                "current round still has open matches".into(),
            ));
        }
        ensure_no_draws(ctx, last)?;
        if self.is_complete(ctx) {
            return Err(EngineError::PreconditionFailed("bracket is complete".into()));
        }

        let round = last + 1;
        let (winners, losers) = Self::sides(ctx);

        if let ([champion], [challenger]) = (winners.as_slice(), losers.as_slice()) {
            return Ok(RoundPlan::new(vec![
                NewMatch::pairing(round, 1, *champion, *challenger).with_group(GRAND_FINAL_LABEL),
            ]));
        }

        // A lone player on either side waits for the other side to thin out
        let mut matches = Vec::new();
        if winners.len() >= 2 {
            matches.extend(pair_adjacent(round, &winners));
        }
        if losers.len() >= 2 {
            let offset = matches.len() as u32;
            matches.extend(pair_adjacent(round, &losers).into_iter().map(|mut m| {
                m.table_number += offset;
                m.on(BracketSide::Losers)
            }));
        }
        Ok(RoundPlan::new(matches))
    }

    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool {
        if ctx.last_round() == 0 || ctx.has_open_matches() {
            return false;
        }
        if Self::grand_final_played(ctx) {
            return true;
        }
        let (winners, losers) = Self::sides(ctx);
        winners.len() + losers.len() <= 1
    }
}
