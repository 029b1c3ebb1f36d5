//! Gauntlet: a defender faces each challenger in turn, winner stays on.

use log::debug;

use super::{PairingContext, PairingStrategy, RoundPlan};
use crate::errors::{EngineError, EngineResult};
use crate::matches::models::{NewMatch, ResultStatus};
use crate::registration::models::RegistrationId;
use crate::stage::models::GauntletState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GauntletPairing;

impl GauntletPairing {
    /// Defender after the last round; a draw or void keeps the holder
    fn settled_defender(ctx: &PairingContext<'_>, state: &GauntletState) -> RegistrationId {
        ctx.matches_in_round(ctx.last_round())
            .into_iter()
            .filter(|m| m.result_status == ResultStatus::Confirmed && !m.is_draw)
            .find_map(|m| m.winner)
            .unwrap_or(state.defender)
    }

    /// Next eligible challenger at or after `from`, with its index
    fn next_challenger(
        ctx: &PairingContext<'_>,
        order: &[RegistrationId],
        from: usize,
        defender: RegistrationId,
    ) -> Option<(usize, RegistrationId)> {
        order
            .iter()
            .enumerate()
            .skip(from)
            .find(|&(_, &id)| id != defender && ctx.is_pairable(id))
            .map(|(index, &id)| (index, id))
    }

    /// Resolve defender and challenger for the round after the last one
    fn advance(&self, ctx: &PairingContext<'_>) -> EngineResult<Option<(GauntletState, RegistrationId)>> {
        let Some(state) = ctx.stage.settings.gauntlet.clone() else {
            return Err(EngineError::InvalidState(
                "gauntlet stage has no running state".into(),
            ));
        };

        let mut defender = Self::settled_defender(ctx, &state);
        let mut from = state.next_index;
        if !ctx.is_pairable(defender) {
            // The defender left; the next challenger inherits the seat
            match Self::next_challenger(ctx, &state.order, from, defender) {
                Some((index, id)) => {
                    debug!("Gauntlet defender {defender} withdrew, {id} takes over");
                    defender = id;
                    from = index + 1;
                }
                None => return Ok(None),
            }
        }

        Ok(
            Self::next_challenger(ctx, &state.order, from, defender).map(|(index, challenger)| {
                (
                    GauntletState {
                        order: state.order.clone(),
                        defender,
                        next_index: index + 1,
                    },
                    challenger,
                )
            }),
        )
    }
}

impl PairingStrategy for GauntletPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        let last = ctx.last_round();
        if last == 0 {
            let order = ctx.seed_order();
            let (defender, challenger) = match order.as_slice() {
                [first, second, ..] => (*first, *second),
                _ => {
                    return Err(EngineError::PreconditionFailed(
                        "gauntlet needs at least 2 active players".into(),
                    ));
                }
            };
            let state = GauntletState {
                order,
                defender,
                next_index: 2,
            };
            let mut settings = ctx.stage.settings.clone();
            settings.gauntlet = Some(state);
            return Ok(
                RoundPlan::new(vec![NewMatch::pairing(1, 1, defender, challenger)])
                    .with_settings(settings),
            );
        }

        if ctx.has_open_matches() {
            return Err(EngineError::PreconditionFailed(
                "current gauntlet match is still open".into(),
            ));
        }
        let Some((state, challenger)) = self.advance(ctx)? else {
            return Err(EngineError::PreconditionFailed("gauntlet complete".into()));
        };

        let matches = vec![NewMatch::pairing(last + 1, 1, state.defender, challenger)];
        let mut settings = ctx.stage.settings.clone();
        settings.gauntlet = Some(state);
        Ok(RoundPlan::new(matches).with_settings(settings))
    }

    fn is_complete(&self, ctx: &PairingContext<'_>) -> bool {
        ctx.last_round() > 0 && !ctx.has_open_matches() && matches!(self.advance(ctx), Ok(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::models::Match;
    use crate::pairing::test_support::{players, settle, stage};
    use crate::stage::models::{StageSettings, StageType};

    #[test]
    fn test_winner_stays_on() {
        let regs = players(4);
        let mut stage = stage(1, StageType::Gauntlet, StageSettings::default());
        let mut history: Vec<Match> = Vec::new();
        let mut next_id = 0;
        let mut played = Vec::new();

        loop {
            let ctx = PairingContext {
                stage: &stage,
                players: &regs,
                prior_matches: &history,
                standings: &[],
            };
            if GauntletPairing.is_complete(&ctx) {
                break;
            }
            let plan = GauntletPairing.generate_next_round(&ctx).unwrap();
            assert_eq!(plan.matches.len(), 1);
            let m = &plan.matches[0];
            played.push((m.player_a, m.player_b.unwrap()));
            // Challenger 3 beats the defender, everyone else loses
            history.extend(settle(&plan, 1, &mut next_id, |m| m.player_b != Some(3)));
            stage.settings = plan.settings.unwrap();
        }

        assert_eq!(played, vec![(1, 2), (1, 3), (3, 4)]);
        assert_eq!(stage.settings.gauntlet.unwrap().defender, 3);
    }

    #[test]
    fn test_draw_keeps_defender_and_dropped_challenger_is_skipped() {
        let mut regs = players(4);
        let mut stage = stage(1, StageType::Gauntlet, StageSettings::default());
        let mut next_id = 0;
        let ctx = PairingContext {
            stage: &stage,
            players: &regs,
            prior_matches: &[],
            standings: &[],
        };
        let plan = GauntletPairing.generate_next_round(&ctx).unwrap();
        stage.settings = plan.settings.clone().unwrap();
        let mut history = settle(&plan, 1, &mut next_id, |_| false);
        history[0].is_draw = true;
        history[0].winner = None;

        regs.retain(|r| r.id != 3);
        let ctx = PairingContext {
            stage: &stage,
            players: &regs,
            prior_matches: &history,
            standings: &[],
        };
        let next = GauntletPairing.generate_next_round(&ctx).unwrap();
        assert_eq!(next.matches[0].player_a, 1);
        assert_eq!(next.matches[0].player_b, Some(4));
        assert_eq!(next.matches[0].round_number, 2);
    }

    #[test]
    fn test_exhausted_gauntlet_refuses_another_round() {
        let regs = players(2);
        let mut stage = stage(1, StageType::Gauntlet, StageSettings::default());
        let mut next_id = 0;
        let ctx = PairingContext {
            stage: &stage,
            players: &regs,
            prior_matches: &[],
            standings: &[],
        };
        let plan = GauntletPairing.generate_next_round(&ctx).unwrap();
        stage.settings = plan.settings.clone().unwrap();
        let history = settle(&plan, 1, &mut next_id, |_| true);

        let ctx = PairingContext {
            stage: &stage,
            players: &regs,
            prior_matches: &history,
            standings: &[],
        };
        assert!(GauntletPairing.is_complete(&ctx));
        let err = GauntletPairing.generate_next_round(&ctx).unwrap_err();
        assert_eq!(err.code(), "precondition_failed");
    }
}
