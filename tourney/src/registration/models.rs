//! Registration data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::{EngineError, EngineResult};
use crate::tournament::models::{TournamentId, UserId};

/// Registration ID type
pub type RegistrationId = i64;

/// Per-player enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Seat held, awaiting payment confirmation
    Pending,
    Confirmed,
    CheckedIn,
    WaitingList,
    Cancelled,
    Dropped,
    NoShow,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::CheckedIn => "checked_in",
            RegistrationStatus::WaitingList => "waiting_list",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Dropped => "dropped",
            RegistrationStatus::NoShow => "no_show",
        }
    }

    /// Blocks the player from registering again
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Pending
                | RegistrationStatus::Confirmed
                | RegistrationStatus::CheckedIn
                | RegistrationStatus::WaitingList
        )
    }

    /// Occupies one unit of tournament capacity
    pub fn holds_seat(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Pending
                | RegistrationStatus::Confirmed
                | RegistrationStatus::CheckedIn
        )
    }

    /// Eligible for the next round's pairings
    pub fn is_pairable(&self) -> bool {
        *self == RegistrationStatus::CheckedIn
    }

    /// Counted towards the minimum player count at start
    pub fn counts_for_start(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::CheckedIn | RegistrationStatus::Dropped
        )
    }

    /// Receives a standings row when present in a stage's matches
    pub fn counts_for_standings(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Confirmed
                | RegistrationStatus::CheckedIn
                | RegistrationStatus::Dropped
        )
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "checked_in" => Ok(RegistrationStatus::CheckedIn),
            "waiting_list" => Ok(RegistrationStatus::WaitingList),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            "dropped" => Ok(RegistrationStatus::Dropped),
            "no_show" => Ok(RegistrationStatus::NoShow),
            other => Err(EngineError::InvalidInput(format!(
                "unknown registration status '{other}'"
            ))),
        }
    }
}

/// Entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Free,
    Paid,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Free => "free",
            EntryType::Paid => "paid",
        }
    }

    /// Status given to a registration that obtains a seat
    pub fn seated_status(&self) -> RegistrationStatus {
        match self {
            EntryType::Free => RegistrationStatus::Confirmed,
            EntryType::Paid => RegistrationStatus::Pending,
        }
    }
}

impl FromStr for EntryType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(EntryType::Free),
            "paid" => Ok(EntryType::Paid),
            other => Err(EngineError::InvalidInput(format!(
                "unknown entry type '{other}'"
            ))),
        }
    }
}

/// A registration row; never deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub tournament_id: TournamentId,
    pub player_id: UserId,
    pub display_name: String,
    pub status: RegistrationStatus,
    pub entry_type: EntryType,
    /// Assigned when the registration becomes confirmed
    pub seed: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration request, before the store assigns status and id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRegistration {
    pub tournament_id: TournamentId,
    pub player_id: UserId,
    pub display_name: String,
    pub entry_type: EntryType,
}

/// Decide the status of a new or promoted registration from current occupancy
///
/// # Errors
///
/// * `EngineError::PreconditionFailed` - Tournament full and waitlisting disabled
pub fn seat_assignment(
    occupied: usize,
    capacity: u32,
    allow_waitlist: bool,
    entry_type: EntryType,
) -> EngineResult<RegistrationStatus> {
    if occupied < capacity as usize {
        Ok(entry_type.seated_status())
    } else if allow_waitlist {
        Ok(RegistrationStatus::WaitingList)
    } else {
        Err(EngineError::PreconditionFailed(format!(
            "tournament is full ({occupied}/{capacity})"
        )))
    }
}

/// Sort registrations into seed order; unseeded entries go last by id
pub fn sort_by_seed(registrations: &mut [Registration]) {
    registrations.sort_by_key(|r| (r.seed.is_none(), r.seed, r.id));
}
