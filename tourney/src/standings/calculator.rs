//! Standings computation.
//!
//! A full recompute from the confirmed matches of one stage. Nothing is ever
//! patched incrementally, so corrections and disputes can never leave a stale
//! row behind.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::models::{POINTS_FOR_DRAW, POINTS_FOR_WIN, Standing};
use crate::matches::models::{Match, ResultStatus};
use crate::registration::models::{Registration, RegistrationId};
use crate::stage::models::StageId;
use crate::tournament::models::TournamentId;

#[derive(Debug, Default, Clone)]
struct Tally {
    wins: u32,
    losses: u32,
    draws: u32,
    points: u32,
    games_won: u32,
    games_played: u32,
    opponents: BTreeSet<RegistrationId>,
}

impl Tally {
    fn matches_played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Match-win percentage; at least one match in the denominator
    fn mwp(&self) -> f64 {
        let earned = f64::from(self.wins * POINTS_FOR_WIN + self.draws * POINTS_FOR_DRAW);
        let possible = f64::from(self.matches_played().max(1) * POINTS_FOR_WIN);
        earned / possible
    }

    fn gw(&self) -> f64 {
        if self.games_played == 0 {
            0.0
        } else {
            f64::from(self.games_won) / f64::from(self.games_played)
        }
    }

    fn record_win(&mut self) {
        self.wins += 1;
        self.points += POINTS_FOR_WIN;
    }

    fn record_loss(&mut self) {
        self.losses += 1;
    }

    fn record_draw(&mut self) {
        self.draws += 1;
        self.points += POINTS_FOR_DRAW;
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / f64::from(count) }
}

/// Ranking order: points, OMW, GW, OGW (all descending), then registration id
pub fn compare_standings(a: &Standing, b: &Standing) -> Ordering {
    b.points
        .cmp(&a.points)
        .then_with(|| b.omw.total_cmp(&a.omw))
        .then_with(|| b.gw.total_cmp(&a.gw))
        .then_with(|| b.ogw.total_cmp(&a.ogw))
        .then_with(|| a.registration_id.cmp(&b.registration_id))
}

/// Compute the ranked standings of a stage
///
/// Participants are the registrations eligible for standings that appear in
/// at least one non-void match of the stage. Only confirmed matches score.
///
/// # Arguments
///
/// * `registrations` - Registrations of the tournament
/// * `matches` - Matches of the stage; rows of other stages are ignored
pub fn compute_standings(
    tournament_id: TournamentId,
    stage_id: StageId,
    registrations: &[Registration],
    matches: &[Match],
) -> Vec<Standing> {
    let stage_matches: Vec<&Match> = matches
        .iter()
        .filter(|m| m.stage_id == stage_id && m.result_status != ResultStatus::Void)
        .collect();

    let mut tallies: BTreeMap<RegistrationId, Tally> = BTreeMap::new();
    for m in &stage_matches {
        tallies.entry(m.player_a).or_default();
        if let Some(player_b) = m.player_b {
            tallies.entry(player_b).or_default();
        }
    }

    for m in stage_matches
        .iter()
        .filter(|m| m.result_status == ResultStatus::Confirmed)
    {
        let Some(player_b) = m.player_b else {
            if let Some(tally) = tallies.get_mut(&m.player_a) {
                tally.record_win();
            }
            continue;
        };

        let score_a = m.score_a.unwrap_or(0);
        let score_b = m.score_b.unwrap_or(0);

        for (me, opponent, won, played) in [
            (m.player_a, player_b, score_a, score_a + score_b),
            (player_b, m.player_a, score_b, score_a + score_b),
        ] {
            let Some(tally) = tallies.get_mut(&me) else {
                continue;
            };
            tally.games_won += won;
            tally.games_played += played;
            tally.opponents.insert(opponent);

            if m.is_draw {
                tally.record_draw();
            } else if m.winner == Some(me) {
                tally.record_win();
            } else {
                tally.record_loss();
            }
        }
    }

    let mwp: HashMap<RegistrationId, f64> =
        tallies.iter().map(|(id, t)| (*id, t.mwp())).collect();
    let gw: HashMap<RegistrationId, f64> = tallies.iter().map(|(id, t)| (*id, t.gw())).collect();

    let eligible: HashMap<RegistrationId, &Registration> = registrations
        .iter()
        .filter(|r| r.status.counts_for_standings())
        .map(|r| (r.id, r))
        .collect();

    let mut standings: Vec<Standing> = tallies
        .iter()
        .filter_map(|(id, tally)| {
            let registration = eligible.get(id)?;
            let omw = average(tally.opponents.iter().filter_map(|o| mwp.get(o).copied()));
            let ogw = average(tally.opponents.iter().filter_map(|o| gw.get(o).copied()));
            Some(Standing {
                tournament_id,
                stage_id,
                registration_id: *id,
                player_id: registration.player_id,
                points: tally.points,
                wins: tally.wins,
                losses: tally.losses,
                draws: tally.draws,
                games_won: tally.games_won,
                games_played: tally.games_played,
                omw,
                gw: tally.gw(),
                ogw,
                rank: 0,
            })
        })
        .collect();

    standings.sort_by(compare_standings);
    for (index, standing) in standings.iter_mut().enumerate() {
        standing.rank = index as u32 + 1;
    }

    standings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::models::NewMatch;
    use crate::registration::models::{EntryType, RegistrationStatus};
    use chrono::Utc;

    fn registrations(ids: &[RegistrationId]) -> Vec<Registration> {
        ids.iter()
            .map(|&id| Registration {
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

    fn confirmed(id: i64, round: u32, a: RegistrationId, b: RegistrationId, sa: u32, sb: u32) -> Match {
        let mut m = NewMatch::pairing(round, 1, a, b).into_match(id, 1, 1, Utc::now());
        m.score_a = Some(sa);
        m.score_b = Some(sb);
        m.is_draw = sa == sb;
        m.winner = match sa.cmp(&sb) {
            Ordering::Greater => Some(a),
            Ordering::Less => Some(b),
            Ordering::Equal => None,
        };
        m.result_status = ResultStatus::Confirmed;
        m
    }

    fn row(standings: &[Standing], id: RegistrationId) -> &Standing {
        standings.iter().find(|s| s.registration_id == id).unwrap()
    }

    #[test]
    fn test_points_and_percentages() {
        let regs = registrations(&[1, 2, 3, 4]);
        let matches = vec![
            confirmed(1, 1, 1, 2, 2, 0),
            confirmed(2, 1, 3, 4, 2, 1),
            confirmed(3, 2, 1, 3, 2, 1),
            confirmed(4, 2, 2, 4, 1, 1),
        ];

        let standings = compute_standings(1, 1, &regs, &matches);
        assert_eq!(standings.len(), 4);

        let first = row(&standings, 1);
        assert_eq!((first.points, first.wins, first.losses), (6, 2, 0));
        assert_eq!(first.rank, 1);
        assert_eq!((first.games_won, first.games_played), (4, 5));

        let p2 = row(&standings, 2);
        assert_eq!((p2.points, p2.draws, p2.losses), (1, 1, 1));
        // p2 faced p1 (MWP 1.0) and p4 (MWP 1/6)
        assert!((p2.omw - (1.0 + 1.0 / 6.0) / 2.0).abs() < 1e-9);
        // p2 won 1 of 4 games
        assert!((p2.gw - 0.25).abs() < 1e-9);

        assert_eq!(row(&standings, 3).rank, 2);
    }

    #[test]
    fn test_bye_counts_as_win_without_opponent() {
        let regs = registrations(&[1, 2, 3]);
        let bye = NewMatch::bye(1, 2, 3).into_match(9, 1, 1, Utc::now());
        let matches = vec![confirmed(1, 1, 1, 2, 2, 1), bye];

        let standings = compute_standings(1, 1, &regs, &matches);
        let p3 = row(&standings, 3);
        assert_eq!((p3.wins, p3.points), (1, 3));
        assert_eq!(p3.games_played, 0);
        assert_eq!(p3.omw, 0.0);
    }

    #[test]
    fn test_unconfirmed_matches_do_not_score() {
        let regs = registrations(&[1, 2]);
        let mut reported = confirmed(1, 1, 1, 2, 2, 0);
        reported.result_status = ResultStatus::Reported;

        let standings = compute_standings(1, 1, &regs, &[reported]);
        assert_eq!(standings.len(), 2);
        assert!(standings.iter().all(|s| s.points == 0));
        // Full tie broken by registration id
        assert_eq!(standings[0].registration_id, 1);
    }

    #[test]
    fn test_void_and_foreign_stage_matches_are_ignored() {
        let regs = registrations(&[1, 2, 3]);
        let mut voided = confirmed(1, 1, 1, 2, 2, 0);
        voided.result_status = ResultStatus::Void;
        let mut other_stage = confirmed(2, 1, 1, 3, 2, 0);
        other_stage.stage_id = 2;

        let standings = compute_standings(1, 1, &regs, &[voided, other_stage]);
        assert!(standings.is_empty());
    }

    #[test]
    fn test_ineligible_registrations_get_no_row() {
        let mut regs = registrations(&[1, 2]);
        regs[1].status = RegistrationStatus::Cancelled;
        let standings = compute_standings(1, 1, &regs, &[confirmed(1, 1, 1, 2, 2, 0)]);
        assert_eq!(standings.len(), 1);
        // The cancelled opponent still contributes to OMW
        assert_eq!(standings[0].omw, 0.0);
        assert_eq!(standings[0].registration_id, 1);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let regs = registrations(&[1, 2, 3, 4]);
        let matches = vec![confirmed(1, 1, 1, 2, 2, 1), confirmed(2, 1, 3, 4, 1, 1)];
        let first = compute_standings(1, 1, &regs, &matches);
        let second = compute_standings(1, 1, &regs, &matches);
        assert_eq!(first, second);
    }
}
