//! Custom stages: one seeded round, then organizer-entered matches.

use super::{PairingContext, PairingStrategy, RoundPlan, pair_adjacent};
use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomPairing;

impl PairingStrategy for CustomPairing {
    fn generate_next_round(&self, ctx: &PairingContext<'_>) -> EngineResult<RoundPlan> {
        if ctx.last_round() > 0 {
            return Err(EngineError::PreconditionFailed(
                "custom stages only generate their first round; add further matches manually"
                    .into(),
            ));
        }
        if ctx.players.len() < 2 {
            return Err(EngineError::PreconditionFailed(
                "custom stage needs at least 2 active players".into(),
            ));
        }
        Ok(RoundPlan::new(pair_adjacent(1, &ctx.seed_order())))
    }

    fn is_complete(&self, _ctx: &PairingContext<'_>) -> bool {
        // Closed by the organizer finishing the tournament
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pairing::test_support::{players, settle, stage};
    use crate::stage::models::{StageSettings, StageType};

    #[test]
    fn test_first_round_only() {
        let regs = players(3);
        let stage = stage(1, StageType::Custom, StageSettings::default());
        let ctx = PairingContext {
            stage: &stage,
            players: &regs,
            prior_matches: &[],
            standings: &[],
        };
        let plan = CustomPairing.generate_next_round(&ctx).unwrap();
        assert_eq!(plan.matches.len(), 2);
        assert!(plan.matches[1].is_bye());

        let mut next_id = 0;
        let history = settle(&plan, 1, &mut next_id, |_| true);
        let ctx = PairingContext {
            stage: &stage,
            players: &regs,
            prior_matches: &history,
            standings: &[],
        };
        assert!(CustomPairing.generate_next_round(&ctx).is_err());
    }
}
