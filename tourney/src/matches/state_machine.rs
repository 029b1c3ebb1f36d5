//! Match result state machine.
//!
//! ```text
//! PENDING ──report──▶ REPORTED ──confirm──▶ CONFIRMED
//!                        │
//!                        └──dispute──▶ DISPUTED ──staff report──▶ CONFIRMED
//! any state ──void (staff)──▶ VOID
//! ```
//!
//! Every function here is pure: it validates the requested transition against
//! the match as last read and returns the next row. Persisting it is a
//! compare-and-swap on [`Match::version`], done by the caller.

use chrono::{DateTime, Utc};

use super::models::{Match, ResultSignature, ResultStatus};
use crate::errors::{EngineError, EngineResult};
use crate::registration::models::RegistrationId;
use crate::tournament::models::UserId;

/// The actor of a result operation, resolved against the match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchActor {
    pub user_id: UserId,
    /// The actor's registration when they play in this match
    pub registration_id: Option<RegistrationId>,
    pub is_staff: bool,
}

impl MatchActor {
    fn signature(&self, at: DateTime<Utc>) -> ResultSignature {
        ResultSignature {
            registration_id: self.registration_id,
            user_id: self.user_id,
            at,
        }
    }

    fn is_participant_of(&self, m: &Match) -> bool {
        self.registration_id.is_some_and(|id| m.involves(id))
    }

    fn signed(&self, signature: &ResultSignature) -> bool {
        signature.user_id == self.user_id
            || (signature.registration_id.is_some()
                && signature.registration_id == self.registration_id)
    }
}

/// Decided outcome of a score line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub is_draw: bool,
    pub winner: Option<RegistrationId>,
}

/// Result of a validated transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Match,
    /// The match entered or left CONFIRMED; the stage's standings are stale
    pub affects_standings: bool,
}

impl Transition {
    fn new(previous: &Match, next: Match) -> Self {
        let affects_standings = previous.result_status == ResultStatus::Confirmed
            || next.result_status == ResultStatus::Confirmed;
        Self {
            next,
            affects_standings,
        }
    }
}

/// Derive winner and draw flag from a score line
///
/// # Errors
///
/// * `EngineError::InvalidInput` - Player B wins a match without player B
pub fn derive_outcome(m: &Match, score_a: u32, score_b: u32) -> EngineResult<Outcome> {
    if score_a > score_b {
        Ok(Outcome {
            is_draw: false,
            winner: Some(m.player_a),
        })
    } else if score_b > score_a {
        match m.player_b {
            Some(player_b) => Ok(Outcome {
                is_draw: false,
                winner: Some(player_b),
            }),
            None => Err(EngineError::InvalidInput(format!(
                "match {} has no player B to win it",
                m.id
            ))),
        }
    } else {
        Ok(Outcome {
            is_draw: true,
            winner: None,
        })
    }
}

fn ensure_participant_or_staff(m: &Match, actor: &MatchActor) -> EngineResult<()> {
    if actor.is_staff || actor.is_participant_of(m) {
        Ok(())
    } else {
        Err(EngineError::PermissionDenied(format!(
            "user {} does not play in match {}",
            actor.user_id, m.id
        )))
    }
}

fn bump(m: &Match, now: DateTime<Utc>) -> Match {
    let mut next = m.clone();
    next.version += 1;
    next.updated_at = now;
    next
}

/// Report a score
///
/// Staff reports are authoritative and confirm immediately, including
/// corrections of confirmed or disputed results. A participant may report a
/// pending match or overwrite their own earlier report.
///
/// # Errors
///
/// * `EngineError::PermissionDenied` - Actor neither staff nor participant
/// * `EngineError::Conflict` - The opponent already reported; confirm or dispute
/// * `EngineError::InvalidState` - Bye, void, confirmed or disputed match
/// * `EngineError::InvalidInput` - Impossible score line
pub fn report(
    m: &Match,
    actor: &MatchActor,
    score_a: u32,
    score_b: u32,
    now: DateTime<Utc>,
) -> EngineResult<Transition> {
    ensure_participant_or_staff(m, actor)?;

    if m.is_bye() {
        return Err(EngineError::InvalidState(format!(
            "match {} is a bye and settles automatically",
            m.id
        )));
    }

    match (m.result_status, actor.is_staff) {
        (ResultStatus::Void, _) => {
            return Err(EngineError::InvalidState(format!("match {} is void", m.id)));
        }
        (ResultStatus::Pending, _) | (_, true) => {}
        (ResultStatus::Reported, false) => {
            let same_reporter = m.reported_by.as_ref().is_some_and(|sig| actor.signed(sig));
            if !same_reporter {
                return Err(EngineError::Conflict(format!(
                    "match {} already has a reported result; confirm or dispute it instead",
                    m.id
                )));
            }
        }
        (ResultStatus::Confirmed, false) => {
            return Err(EngineError::InvalidState(format!(
                "match {} is already confirmed",
                m.id
            )));
        }
        (ResultStatus::Disputed, false) => {
            return Err(EngineError::InvalidState(format!(
                "match {} is disputed and awaits staff",
                m.id
            )));
        }
    }

    let outcome = derive_outcome(m, score_a, score_b)?;
    let signature = actor.signature(now);

    let mut next = bump(m, now);
    next.score_a = Some(score_a);
    next.score_b = Some(score_b);
    next.is_draw = outcome.is_draw;
    next.winner = outcome.winner;
    next.reported_by = Some(signature);
    if actor.is_staff {
        next.result_status = ResultStatus::Confirmed;
        next.confirmed_by = Some(signature);
    } else {
        next.result_status = ResultStatus::Reported;
        next.confirmed_by = None;
    }

    Ok(Transition::new(m, next))
}

/// Confirm a reported result
///
/// # Errors
///
/// * `EngineError::InvalidState` - Match not in REPORTED
/// * `EngineError::PermissionDenied` - Actor is the reporter, or not involved
pub fn confirm(m: &Match, actor: &MatchActor, now: DateTime<Utc>) -> EngineResult<Transition> {
    ensure_participant_or_staff(m, actor)?;

    if m.result_status != ResultStatus::Reported {
        return Err(EngineError::InvalidState(format!(
            "match {} is {}, only reported results can be confirmed",
            m.id, m.result_status
        )));
    }

    if !actor.is_staff && m.reported_by.as_ref().is_some_and(|sig| actor.signed(sig)) {
        return Err(EngineError::PermissionDenied(format!(
            "the reporter cannot confirm their own result for match {}",
            m.id
        )));
    }

    let mut next = bump(m, now);
    next.result_status = ResultStatus::Confirmed;
    next.confirmed_by = Some(actor.signature(now));

    Ok(Transition::new(m, next))
}

/// Dispute a reported result; it leaves the standings until staff settle it
///
/// # Errors
///
/// * `EngineError::InvalidState` - Match not in REPORTED
/// * `EngineError::PermissionDenied` - Actor is the reporter, or not involved
pub fn dispute(m: &Match, actor: &MatchActor, now: DateTime<Utc>) -> EngineResult<Transition> {
    ensure_participant_or_staff(m, actor)?;

    if m.result_status != ResultStatus::Reported {
        return Err(EngineError::InvalidState(format!(
            "match {} is {}, only reported results can be disputed",
            m.id, m.result_status
        )));
    }

    if !actor.is_staff && m.reported_by.as_ref().is_some_and(|sig| actor.signed(sig)) {
        return Err(EngineError::PermissionDenied(format!(
            "the reporter cannot dispute their own result for match {}; report again instead",
            m.id
        )));
    }

    let mut next = bump(m, now);
    next.result_status = ResultStatus::Disputed;

    Ok(Transition::new(m, next))
}

/// Administratively void a match; terminal
///
/// # Errors
///
/// * `EngineError::PermissionDenied` - Actor is not staff
/// * `EngineError::InvalidState` - Match already void
pub fn void(m: &Match, actor: &MatchActor, now: DateTime<Utc>) -> EngineResult<Transition> {
    if !actor.is_staff {
        return Err(EngineError::PermissionDenied(
            "only staff can void a match".into(),
        ));
    }
    if m.result_status == ResultStatus::Void {
        return Err(EngineError::InvalidState(format!(
            "match {} is already void",
            m.id
        )));
    }

    let mut next = bump(m, now);
    next.result_status = ResultStatus::Void;
    next.winner = None;
    next.is_draw = false;

    Ok(Transition::new(m, next))
}
