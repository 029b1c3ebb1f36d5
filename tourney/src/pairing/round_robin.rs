//! Round robin, league and group stages.
//!
//! All three schedule every round up front with the circle method, so a
//! stage is generated exactly once.

use super::{PairingContext, PairingStrategy, RoundPlan};
use crate::errors::{EngineError, EngineResult};
use crate::matches::models::NewMatch;
use crate::registration::models::RegistrationId;

/// One round of a schedule: (player A, player B or `None` for a bye)
pub type ScheduledRound = Vec<(RegistrationId, Option<RegistrationId>)>;

/// Circle-method schedule where everyone meets once
///
/// An odd field gets a phantom slot; whoever draws it has a bye that round.
/// Byes are listed after the real pairings of their round.
pub fn circle_schedule(ids: &[RegistrationId]) -> Vec<ScheduledRound> {
    let mut slots: Vec<Option<RegistrationId>> = ids.iter().copied().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }
    let n = slots.len();
    if n < 2 {
        return Vec::new();
    }

    let mut rounds = Vec::with_capacity(n - 1);
    for _ in 0..n - 1 {
        let mut pairings = Vec::with_capacity(n / 2);
        let mut byes = Vec::new();
        for i in 0..n / 2 {
            match (slots[i], slots[n - 1 - i]) {
                (Some(a), Some(b)) => pairings.push((a, Some(b))),
                (Some(a), None) | (None, Some(a)) => byes.push((a, None)),
                (None, None) => {}
            }
        }
        pairings.extend(byes);
        rounds.push(pairings);
        slots[1..].rotate_right(1);
    }
    rounds
}

fn ensure_not_generated(ctx: &PairingContext<'_>) -> EngineResult<()> {
    if ctx.last_round() > 0 {
        return Err(EngineError::PreconditionFailed(
            "schedule has already been generated".into(),
        ));
    }
    Ok(())
}

fn to_matches(round: u32, schedule: &ScheduledRound, swap: bool, first_table: u32) -> Vec<NewMatch> {
    schedule
        .iter()
        .enumerate()
        .map(|(index, &(a, b))| {
            let table = first_table + index as u32;
            match b {
                Some(b) if swap => NewMatch::pairing(round, table, b, a),
                Some(b) => NewMatch::pairing(round, table, a, b),
                None => NewMatch::bye(round, table, a),
            }
        })
        .collect()
}

/// Round robin; a league repeats it `legs` times with sides swapped on
/// every second leg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundRobinPairing {
    pub legs: u32,
}

impl PairingStrategy for RoundRobinPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        ensure_not_generated(ctx)?;
        if ctx.players.len() < 2 {
            return Err(EngineError::PreconditionFailed(
                "round robin needs at least 2 active players".into(),
            ));
        }

        let schedule = circle_schedule(&ctx.seed_order());
        let per_leg = schedule.len() as u32;
        let mut matches = Vec::new();
        for leg in 0..self.legs.max(1) {
            for (index, round) in schedule.iter().enumerate() {
                let number = leg * per_leg + index as u32 + 1;
                matches.extend(to_matches(number, round, leg % 2 == 1, 1));
            }
        }
        Ok(RoundPlan::new(matches))
    }

    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool {
        ctx.last_round() > 0 && !ctx.has_open_matches()
    }
}

/// Round robin inside each of several groups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupPairing {
    /// Defaults to 4 groups for 16 or more players, 2 otherwise
    pub group_count: Option<u32>,
}

/// Label of the group at `index`: A, B, C...
pub fn group_label(index: usize) -> String {
    char::from(b'A' + index as u8).to_string()
}

impl GroupPairing {
    fn groups(&self, ctx: &PairingContext<'_>) -> EngineResult<Vec<Vec<RegistrationId>>> {
        let seeds = ctx.seed_order();
        let count = self
            .group_count
            .unwrap_or(if seeds.len() >= 16 { 4 } else { 2 }) as usize;
        if count == 0 || count > 26 {
            return Err(EngineError::InvalidInput(format!(
                "group count must be between 1 and 26, got {count}"
            )));
        }

        // Seed i goes to group i mod count
        let mut groups = vec![Vec::new(); count];
        for (index, id) in seeds.into_iter().enumerate() {
            groups[index % count].push(id);
        }
        if let Some(short) = groups.iter().position(|g| g.len() < 2) {
            return Err(EngineError::PreconditionFailed(format!(
                "group {} would have fewer than 2 players",
                group_label(short)
            )));
        }
        Ok(groups)
    }
}

impl PairingStrategy for GroupPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        ensure_not_generated(ctx)?;
        let schedules: Vec<Vec<ScheduledRound>> = self
            .groups(ctx)?
            .iter()
            .map(|group| circle_schedule(group))
            .collect();

        let rounds = schedules.iter().map(Vec::len).max().unwrap_or(0);
        let mut matches = Vec::new();
        for round in 0..rounds {
            let mut table = 1;
            for (index, schedule) in schedules.iter().enumerate() {
                let Some(pairings) = schedule.get(round) else {
                    continue;
                };
                let label = group_label(index);
                for m in to_matches(round as u32 + 1, pairings, false, table) {
                    matches.push(m.with_group(label.clone()));
                }
                table += pairings.len() as u32;
            }
        }
        Ok(RoundPlan::new(matches))
    }

    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool {
        ctx.last_round() > 0 && !ctx.has_open_matches()
    }
}
