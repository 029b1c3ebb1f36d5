//! Time-driven lifecycle transitions.
//!
//! Registration and check-in windows open and close with the clock, not only
//! on organizer action. [`sync_lifecycle`] is pure: it reports which
//! transitions are due at `now`, and the manager performs them with their side
//! effects.

use chrono::{DateTime, Utc};
use std::fmt;

use super::models::{Tournament, TournamentStatus};
use crate::errors::{EngineError, EngineResult};

/// A transition that became due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    OpenRegistration,
    CloseRegistration,
    OpenCheckIn,
    /// Marks no-shows, promotes the waitlist and locks decklists
    CloseCheckIn,
}

impl LifecycleEvent {
    /// Status the tournament enters
    pub fn target(&self) -> TournamentStatus {
        match self {
            LifecycleEvent::OpenRegistration => TournamentStatus::RegOpen,
            LifecycleEvent::CloseRegistration => TournamentStatus::RegClosed,
            LifecycleEvent::OpenCheckIn => TournamentStatus::CheckinOpen,
            LifecycleEvent::CloseCheckIn => TournamentStatus::CheckinClosed,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::OpenRegistration => "open_registration",
            LifecycleEvent::CloseRegistration => "close_registration",
            LifecycleEvent::OpenCheckIn => "open_check_in",
            LifecycleEvent::CloseCheckIn => "close_check_in",
        };
        f.write_str(name)
    }
}

/// Transitions due at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSync {
    /// In the order they must be applied
    pub events: Vec<LifecycleEvent>,
    /// Status after applying every event
    pub status: TournamentStatus,
}

impl LifecycleSync {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Work out which time-driven transitions are due for `tournament` at `now`
pub fn sync_lifecycle(tournament: &Tournament, now: DateTime<Utc>) -> LifecycleSync {
    let config = &tournament.config;
    let checkin_opens = config
        .start_at
        .map(|start| config.policy.checkin_opens_at(start));
    let checkin_closes = config
        .start_at
        .map(|start| config.policy.checkin_closes_at(start));
    let due = |at: Option<DateTime<Utc>>| at.is_some_and(|at| now >= at);

    let mut status = tournament.status;
    let mut events = Vec::new();

    loop {
        let event = match status {
            TournamentStatus::Published
                if due(config.registration_opens_at) && !due(config.registration_closes_at) =>
            {
                LifecycleEvent::OpenRegistration
            }
            TournamentStatus::RegOpen | TournamentStatus::RegClosed if due(checkin_opens) => {
                LifecycleEvent::OpenCheckIn
            }
            TournamentStatus::RegOpen if due(config.registration_closes_at) => {
                LifecycleEvent::CloseRegistration
            }
            TournamentStatus::CheckinOpen if due(checkin_closes) => LifecycleEvent::CloseCheckIn,
            _ => break,
        };
        events.push(event);
        status = event.target();
    }

    LifecycleSync { events, status }
}

/// Fail with `InvalidState` unless `current` may move to `next`
pub fn ensure_transition(tournament: &Tournament, next: TournamentStatus) -> EngineResult<()> {
    if tournament.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(EngineError::InvalidState(format!(
            "tournament {} cannot move from {} to {}",
            tournament.id, tournament.status, next
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tournament::models::{TournamentConfig, TournamentFormat};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 18, 0, 0).unwrap()
    }

    fn tournament(status: TournamentStatus) -> Tournament {
        let mut config = TournamentConfig::new("Friday", TournamentFormat::Swiss, 16).with_start(start());
        config.registration_opens_at = Some(start() - Duration::days(7));
        config.registration_closes_at = Some(start() - Duration::hours(2));
        Tournament {
            id: 1,
            organizer_id: 1,
            config,
            status,
            created_at: start() - Duration::days(10),
            updated_at: start() - Duration::days(10),
        }
    }

    #[test]
    fn test_nothing_due_before_windows() {
        let sync = sync_lifecycle(
            &tournament(TournamentStatus::Published),
            start() - Duration::days(8),
        );
        assert!(sync.is_empty());
        assert_eq!(sync.status, TournamentStatus::Published);
    }

    #[test]
    fn test_registration_opens_then_closes() {
        let t = tournament(TournamentStatus::Published);
        let sync = sync_lifecycle(&t, start() - Duration::days(1));
        assert_eq!(sync.events, vec![LifecycleEvent::OpenRegistration]);

        let t = tournament(TournamentStatus::RegOpen);
        let sync = sync_lifecycle(&t, start() - Duration::minutes(90));
        assert_eq!(sync.events, vec![LifecycleEvent::CloseRegistration]);
        assert_eq!(sync.status, TournamentStatus::RegClosed);
    }

    #[test]
    fn test_check_in_opens_and_closes_on_schedule() {
        let t = tournament(TournamentStatus::RegClosed);
        let sync = sync_lifecycle(&t, start() - Duration::minutes(30));
        assert_eq!(sync.events, vec![LifecycleEvent::OpenCheckIn]);

        let sync = sync_lifecycle(&t, start() + Duration::minutes(1));
        assert_eq!(
            sync.events,
            vec![LifecycleEvent::OpenCheckIn, LifecycleEvent::CloseCheckIn]
        );
        assert_eq!(sync.status, TournamentStatus::CheckinClosed);
    }

    #[test]
    fn test_running_tournament_is_left_alone() {
        let sync = sync_lifecycle(
            &tournament(TournamentStatus::Running),
            start() + Duration::hours(3),
        );
        assert!(sync.is_empty());
    }

    #[test]
    fn test_ensure_transition() {
        let t = tournament(TournamentStatus::Running);
        assert!(ensure_transition(&t, TournamentStatus::Finished).is_ok());
        assert_eq!(
            ensure_transition(&t, TournamentStatus::RegOpen)
                .unwrap_err()
                .code(),
            "invalid_state"
        );
    }
}
