//! Registration manager: enrollment, check-in, drops and the waitlist.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;

use super::models::{EntryType, NewRegistration, Registration, RegistrationId, RegistrationStatus};
use crate::clock::Clock;
use crate::collaborators::IdentityProvider;
use crate::db::repository::{RegistrationRepository, Repository, require_tournament};
use crate::errors::{EngineError, EngineResult};
use crate::locks::KeyedLocks;
use crate::tournament::models::{Actor, Tournament, TournamentId, TournamentStatus, UserId};

/// Result of a cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub registration: Registration,
    /// Share of the entry fee the payment collaborator should refund
    pub refund_percent: u8,
    /// Waitlisted registration that took the freed seat
    pub promoted: Option<Registration>,
}

/// Side effects of closing check-in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckInClosure {
    pub no_shows: Vec<Registration>,
    pub promoted: Vec<Registration>,
}

/// Registration manager
#[derive(Clone)]
pub struct RegistrationManager {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn IdentityProvider>,
    locks: Arc<KeyedLocks<TournamentId>>,
}

impl RegistrationManager {
    /// Create a new registration manager
    pub fn new(
        repo: Arc<dyn Repository>,
        clock: Arc<dyn Clock>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            repo,
            clock,
            identity,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Register a player
    ///
    /// The registration is CONFIRMED for free entry, PENDING for paid entry,
    /// or WAITING_LIST when every seat is taken.
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidState` - Registration is closed
    /// * `EngineError::PreconditionFailed` - Already registered, or full without waitlist
    pub async fn register(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Registration> {
        let _guard = self.locks.lock(&tournament_id).await;
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        let now = self.clock.now();

        if !tournament.accepts_registrations(now) {
            return Err(EngineError::InvalidState(format!(
                "tournament {} is not accepting registrations",
                tournament_id
            )));
        }

        let display_name = self.identity.display_name(player_id).await?;
        let new = NewRegistration {
            tournament_id,
            player_id,
            display_name,
            entry_type: tournament.config.entry_type(),
        };

        let registration = self
            .repo
            .create_registration(
                &new,
                tournament.config.capacity,
                tournament.config.policy.allow_waitlist,
                now,
            )
            .await?;

        info!(
            "Player {} registered for tournament {} as {}",
            player_id, tournament_id, registration.status
        );

        Ok(registration)
    }

    /// Cancel a player's active registration and hand the seat to the waitlist
    ///
    /// # Errors
    ///
    /// * `EngineError::NotFound` - Player has no active registration
    /// * `EngineError::InvalidState` - Tournament already running or over; drop instead
    pub async fn cancel(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Cancellation> {
        let _guard = self.locks.lock(&tournament_id).await;
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        if tournament.status == TournamentStatus::Running || tournament.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "tournament {} is {}, registrations can no longer be cancelled",
                tournament_id, tournament.status
            )));
        }

        let current = self.active_registration(tournament_id, player_id).await?;
        let now = self.clock.now();

        let paid = current.entry_type == EntryType::Paid
            && matches!(
                current.status,
                RegistrationStatus::Confirmed | RegistrationStatus::CheckedIn
            );
        let refund_percent = if paid {
            tournament
                .config
                .policy
                .refund_percent(tournament.config.start_at, now)
        } else {
            0
        };

        let registration = self
            .repo
            .transition_registration(current.id, current.status, RegistrationStatus::Cancelled, now)
            .await?;

        let promoted = if current.status.holds_seat() {
            self.promote_locked(&tournament, now).await?
        } else {
            None
        };

        info!(
            "Player {} cancelled registration {} ({}% refund)",
            player_id, registration.id, refund_percent
        );

        Ok(Cancellation {
            registration,
            refund_percent,
            promoted,
        })
    }

    /// Check a player in during the check-in window
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidState` - Check-in is not open
    /// * `EngineError::PreconditionFailed` - Payment still pending, or not confirmed
    pub async fn check_in(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Registration> {
        let _guard = self.locks.lock(&tournament_id).await;
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        tournament.ensure_status(TournamentStatus::CheckinOpen)?;
        self.check_in_locked(tournament_id, player_id).await
    }

    /// Staff check-in; also allowed after check-in closed, until the start
    ///
    /// # Errors
    ///
    /// * `EngineError::PermissionDenied` - Actor is not staff
    /// * `EngineError::InvalidState` - Check-in neither open nor closed
    pub async fn staff_check_in(
        &self,
        tournament_id: TournamentId,
        actor: &Actor,
        player_id: UserId,
    ) -> EngineResult<Registration> {
        let _guard = self.locks.lock(&tournament_id).await;
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        if !tournament.is_staff(actor) {
            return Err(EngineError::PermissionDenied(format!(
                "user {} is not staff of tournament {}",
                actor.user_id, tournament_id
            )));
        }
        if !matches!(
            tournament.status,
            TournamentStatus::CheckinOpen | TournamentStatus::CheckinClosed
        ) {
            return Err(EngineError::InvalidState(format!(
                "tournament {} is {}, check-in is over",
                tournament_id, tournament.status
            )));
        }
        self.check_in_locked(tournament_id, player_id).await
    }

    async fn check_in_locked(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Registration> {
        let current = self.active_registration(tournament_id, player_id).await?;
        match current.status {
            RegistrationStatus::Confirmed => {}
            RegistrationStatus::Pending => {
                return Err(EngineError::PreconditionFailed(format!(
                    "registration {} is awaiting payment",
                    current.id
                )));
            }
            status => {
                return Err(EngineError::PreconditionFailed(format!(
                    "registration {} is {}, only confirmed players can check in",
                    current.id, status
                )));
            }
        }

        let registration = self
            .repo
            .transition_registration(
                current.id,
                RegistrationStatus::Confirmed,
                RegistrationStatus::CheckedIn,
                self.clock.now(),
            )
            .await?;
        debug!("Player {} checked in to tournament {}", player_id, tournament_id);
        Ok(registration)
    }

    /// Drop a player from a running tournament; past matches stay
    ///
    /// # Errors
    ///
    /// * `EngineError::InvalidState` - Tournament not running
    /// * `EngineError::PreconditionFailed` - Registration neither checked in nor confirmed
    pub async fn drop(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Registration> {
        let _guard = self.locks.lock(&tournament_id).await;
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        tournament.ensure_status(TournamentStatus::Running)?;

        let current = self.active_registration(tournament_id, player_id).await?;
        if !matches!(
            current.status,
            RegistrationStatus::CheckedIn | RegistrationStatus::Confirmed
        ) {
            return Err(EngineError::PreconditionFailed(format!(
                "registration {} is {} and cannot be dropped",
                current.id, current.status
            )));
        }

        let registration = self
            .repo
            .transition_registration(
                current.id,
                current.status,
                RegistrationStatus::Dropped,
                self.clock.now(),
            )
            .await?;
        info!("Player {} dropped from tournament {}", player_id, tournament_id);
        Ok(registration)
    }

    /// Payment collaborator callback: PENDING becomes CONFIRMED and is seeded
    ///
    /// # Errors
    ///
    /// * `EngineError::NotFound` - Registration missing
    /// * `EngineError::InvalidState` - Registration not pending, or tournament over
    pub async fn confirm_payment(&self, registration_id: RegistrationId) -> EngineResult<Registration> {
        let current = self
            .repo
            .get_registration(registration_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("registration {registration_id}")))?;

        let _guard = self.locks.lock(&current.tournament_id).await;
        let tournament = require_tournament(self.repo.as_ref(), current.tournament_id).await?;
        if tournament.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "tournament {} is {}",
                tournament.id, tournament.status
            )));
        }

        let registration = self
            .repo
            .transition_registration(
                registration_id,
                RegistrationStatus::Pending,
                RegistrationStatus::Confirmed,
                self.clock.now(),
            )
            .await
            .map_err(|err| match err {
                EngineError::Conflict(_) => EngineError::InvalidState(format!(
                    "registration {registration_id} is not awaiting payment"
                )),
                other => other,
            })?;
        info!("Payment confirmed for registration {}", registration_id);
        Ok(registration)
    }

    /// Promote the oldest waitlisted registration if a seat is free
    pub async fn promote_from_waitlist(
        &self,
        tournament_id: TournamentId,
    ) -> EngineResult<Option<Registration>> {
        let _guard = self.locks.lock(&tournament_id).await;
        let tournament = require_tournament(self.repo.as_ref(), tournament_id).await?;
        self.promote_locked(&tournament, self.clock.now()).await
    }

    /// Mark every still-confirmed registration NO_SHOW, then attempt one
    /// promotion per freed seat
    pub async fn close_check_in(&self, tournament: &Tournament) -> EngineResult<CheckInClosure> {
        let _guard = self.locks.lock(&tournament.id).await;
        let now = self.clock.now();
        let mut closure = CheckInClosure::default();

        for registration in self.repo.list_registrations(tournament.id).await? {
            if registration.status != RegistrationStatus::Confirmed {
                continue;
            }
            let no_show = self
                .repo
                .transition_registration(
                    registration.id,
                    RegistrationStatus::Confirmed,
                    RegistrationStatus::NoShow,
                    now,
                )
                .await?;
            closure.no_shows.push(no_show);
        }

        for _ in 0..closure.no_shows.len() {
            match self.promote_locked(tournament, now).await? {
                Some(promoted) => closure.promoted.push(promoted),
                None => break,
            }
        }

        info!(
            "Check-in closed for tournament {}: {} no-shows, {} promoted",
            tournament.id,
            closure.no_shows.len(),
            closure.promoted.len()
        );
        Ok(closure)
    }

    pub async fn list_registrations(
        &self,
        tournament_id: TournamentId,
    ) -> EngineResult<Vec<Registration>> {
        self.repo.list_registrations(tournament_id).await
    }

    async fn promote_locked(
        &self,
        tournament: &Tournament,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Registration>> {
        let promoted = self
            .repo
            .promote_waitlist(
                tournament.id,
                tournament.config.capacity,
                tournament.config.entry_type(),
                now,
            )
            .await?;
        if let Some(registration) = &promoted {
            info!(
                "Promoted registration {} from the waitlist of tournament {} as {}",
                registration.id, tournament.id, registration.status
            );
        }
        Ok(promoted)
    }

    async fn active_registration(
        &self,
        tournament_id: TournamentId,
        player_id: UserId,
    ) -> EngineResult<Registration> {
        self.repo
            .find_registration(tournament_id, player_id)
            .await?
            .filter(|r| r.status.is_active())
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "player {player_id} has no active registration in tournament {tournament_id}"
                ))
            })
    }
}
