//! Tournament data models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::{EngineError, EngineResult};
use crate::registration::models::EntryType;

/// Tournament ID type
pub type TournamentId = i64;

/// User ID type (identity provider key)
pub type UserId = i64;

/// Tournament format, selects the pairing strategy of every stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    Swiss,
    /// Swiss rounds followed by a seeded single-elimination cut
    SwissTopCut,
    SingleElimination,
    DoubleElimination,
    RoundRobin,
    League,
    Gauntlet,
    GroupBrackets,
    Custom,
}

impl TournamentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentFormat::Swiss => "swiss",
            TournamentFormat::SwissTopCut => "swiss_top_cut",
            TournamentFormat::SingleElimination => "single_elimination",
            TournamentFormat::DoubleElimination => "double_elimination",
            TournamentFormat::RoundRobin => "round_robin",
            TournamentFormat::League => "league",
            TournamentFormat::Gauntlet => "gauntlet",
            TournamentFormat::GroupBrackets => "group_brackets",
            TournamentFormat::Custom => "custom",
        }
    }

    /// Swiss-based formats generate round 1 as soon as the tournament starts
    pub fn is_swiss_based(&self) -> bool {
        matches!(self, TournamentFormat::Swiss | TournamentFormat::SwissTopCut)
    }
}

impl fmt::Display for TournamentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "swiss" => Ok(TournamentFormat::Swiss),
            "swiss_top_cut" => Ok(TournamentFormat::SwissTopCut),
            "single_elimination" => Ok(TournamentFormat::SingleElimination),
            "double_elimination" => Ok(TournamentFormat::DoubleElimination),
            "round_robin" => Ok(TournamentFormat::RoundRobin),
            "league" => Ok(TournamentFormat::League),
            "gauntlet" => Ok(TournamentFormat::Gauntlet),
            "group_brackets" => Ok(TournamentFormat::GroupBrackets),
            "custom" => Ok(TournamentFormat::Custom),
            other => Err(EngineError::InvalidInput(format!(
                "unknown tournament format '{other}'"
            ))),
        }
    }
}

/// Tournament lifecycle status
///
/// Declaration order is the lifecycle order; `Cancelled` sits outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Draft,
    Published,
    RegOpen,
    RegClosed,
    CheckinOpen,
    CheckinClosed,
    Running,
    Finished,
    Cancelled,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Draft => "draft",
            TournamentStatus::Published => "published",
            TournamentStatus::RegOpen => "reg_open",
            TournamentStatus::RegClosed => "reg_closed",
            TournamentStatus::CheckinOpen => "checkin_open",
            TournamentStatus::CheckinClosed => "checkin_closed",
            TournamentStatus::Running => "running",
            TournamentStatus::Finished => "finished",
            TournamentStatus::Cancelled => "cancelled",
        }
    }

    fn position(&self) -> u8 {
        match self {
            TournamentStatus::Draft => 0,
            TournamentStatus::Published => 1,
            TournamentStatus::RegOpen => 2,
            TournamentStatus::RegClosed => 3,
            TournamentStatus::CheckinOpen => 4,
            TournamentStatus::CheckinClosed => 5,
            TournamentStatus::Running => 6,
            TournamentStatus::Finished => 7,
            TournamentStatus::Cancelled => u8::MAX,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TournamentStatus::Finished | TournamentStatus::Cancelled)
    }

    /// Transitions only move forward; `Cancelled` is reachable from any
    /// non-terminal status.
    pub fn can_transition_to(&self, next: TournamentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == TournamentStatus::Cancelled || next.position() > self.position()
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TournamentStatus::Draft),
            "published" => Ok(TournamentStatus::Published),
            "reg_open" => Ok(TournamentStatus::RegOpen),
            "reg_closed" => Ok(TournamentStatus::RegClosed),
            "checkin_open" => Ok(TournamentStatus::CheckinOpen),
            "checkin_closed" => Ok(TournamentStatus::CheckinClosed),
            "running" => Ok(TournamentStatus::Running),
            "finished" => Ok(TournamentStatus::Finished),
            "cancelled" => Ok(TournamentStatus::Cancelled),
            other => Err(EngineError::InvalidInput(format!(
                "unknown tournament status '{other}'"
            ))),
        }
    }
}

/// Refund tier: cancelling at least `hours_before_start` before the start
/// refunds `percent` of the entry fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTier {
    pub hours_before_start: i64,
    pub percent: u8,
}

/// Time and refund policy of a tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentPolicy {
    /// Check-in opens this many minutes before the start
    pub checkin_open_offset_minutes: i64,
    /// Check-in closes this many minutes before the start
    pub checkin_close_offset_minutes: i64,
    /// Whether a full tournament accepts waitlisted registrations
    pub allow_waitlist: bool,
    pub refund_tiers: Vec<RefundTier>,
}

impl Default for TournamentPolicy {
    fn default() -> Self {
        Self {
            checkin_open_offset_minutes: 60,
            checkin_close_offset_minutes: 0,
            allow_waitlist: true,
            refund_tiers: vec![
                RefundTier {
                    hours_before_start: 48,
                    percent: 100,
                },
                RefundTier {
                    hours_before_start: 24,
                    percent: 50,
                },
            ],
        }
    }
}

impl TournamentPolicy {
    /// Instant at which check-in opens for a tournament starting at `start_at`
    pub fn checkin_opens_at(&self, start_at: DateTime<Utc>) -> DateTime<Utc> {
        start_at - Duration::minutes(self.checkin_open_offset_minutes)
    }

    /// Instant at which check-in closes for a tournament starting at `start_at`
    pub fn checkin_closes_at(&self, start_at: DateTime<Utc>) -> DateTime<Utc> {
        start_at - Duration::minutes(self.checkin_close_offset_minutes)
    }

    /// Refund percentage for a paid entry cancelled at `now`
    ///
    /// Without a scheduled start every cancellation is fully refunded.
    pub fn refund_percent(&self, start_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u8 {
        let Some(start_at) = start_at else {
            return 100;
        };

        let mut tiers = self.refund_tiers.clone();
        tiers.sort_by(|a, b| b.hours_before_start.cmp(&a.hours_before_start));

        tiers
            .iter()
            .find(|tier| now <= start_at - Duration::hours(tier.hours_before_start))
            .map(|tier| tier.percent.min(100))
            .unwrap_or(0)
    }
}

/// Tournament configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentConfig {
    pub name: String,
    pub format: TournamentFormat,
    /// Maximum number of seated registrations
    pub capacity: u32,
    /// Swiss round count; derived from capacity at publish when unset
    pub swiss_rounds: Option<u32>,
    /// Top-cut bracket size (4, 8 or 16)
    pub top_cut_size: Option<u32>,
    /// Number of groups for group brackets; derived from player count when unset
    pub group_count: Option<u32>,
    /// Circle-schedule repetitions for leagues
    pub league_legs: Option<u32>,
    /// Entry fee in cents, zero for free entry
    pub entry_fee_cents: i64,
    /// Store credit issued to the winner, zero for none
    pub prize_credit_cents: i64,
    pub policy: TournamentPolicy,
    pub start_at: Option<DateTime<Utc>>,
    pub registration_opens_at: Option<DateTime<Utc>>,
    pub registration_closes_at: Option<DateTime<Utc>>,
}

impl TournamentConfig {
    /// Create a free tournament of the given format with default policy
    pub fn new(name: impl Into<String>, format: TournamentFormat, capacity: u32) -> Self {
        Self {
            name: name.into(),
            format,
            capacity,
            swiss_rounds: None,
            top_cut_size: None,
            group_count: None,
            league_legs: None,
            entry_fee_cents: 0,
            prize_credit_cents: 0,
            policy: TournamentPolicy::default(),
            start_at: None,
            registration_opens_at: None,
            registration_closes_at: None,
        }
    }

    /// Create a Swiss tournament with a top cut of `top_cut_size`
    pub fn swiss_with_top_cut(name: impl Into<String>, capacity: u32, top_cut_size: u32) -> Self {
        let mut config = Self::new(name, TournamentFormat::SwissTopCut, capacity);
        config.top_cut_size = Some(top_cut_size);
        config
    }

    pub fn with_entry_fee(mut self, cents: i64) -> Self {
        self.entry_fee_cents = cents;
        self
    }

    pub fn with_prize_credit(mut self, cents: i64) -> Self {
        self.prize_credit_cents = cents;
        self
    }

    pub fn with_start(mut self, start_at: DateTime<Utc>) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn with_policy(mut self, policy: TournamentPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Entry type assigned to new registrations
    pub fn entry_type(&self) -> EntryType {
        if self.entry_fee_cents > 0 {
            EntryType::Paid
        } else {
            EntryType::Free
        }
    }

    /// Validate the configuration against the engine-wide capacity limit
    pub fn validate(&self, max_capacity: u32) -> EngineResult<()> {
        if self.name.trim().is_empty() {
            return Err(EngineError::InvalidInput("name must not be empty".into()));
        }
        if self.capacity < 2 {
            return Err(EngineError::InvalidInput(
                "capacity must be at least 2".into(),
            ));
        }
        if self.capacity > max_capacity {
            return Err(EngineError::InvalidInput(format!(
                "capacity must be at most {max_capacity}"
            )));
        }
        if self.entry_fee_cents < 0 || self.prize_credit_cents < 0 {
            return Err(EngineError::InvalidInput(
                "fees and prizes must not be negative".into(),
            ));
        }
        if let Some(size) = self.top_cut_size {
            if ![4, 8, 16].contains(&size) {
                return Err(EngineError::InvalidInput(format!(
                    "top cut size must be 4, 8 or 16, got {size}"
                )));
            }
            if size > self.capacity {
                return Err(EngineError::InvalidInput(
                    "top cut larger than capacity".into(),
                ));
            }
        }
        if self.format == TournamentFormat::SwissTopCut && self.top_cut_size.is_none() {
            return Err(EngineError::InvalidInput(
                "swiss with top cut requires a top cut size".into(),
            ));
        }
        if self.swiss_rounds == Some(0) || self.group_count == Some(0) || self.league_legs == Some(0)
        {
            return Err(EngineError::InvalidInput(
                "round, group and leg counts must be positive".into(),
            ));
        }
        if let (Some(opens), Some(closes)) = (self.registration_opens_at, self.registration_closes_at)
            && closes <= opens
        {
            return Err(EngineError::InvalidInput(
                "registration must close after it opens".into(),
            ));
        }
        if self.policy.checkin_close_offset_minutes > self.policy.checkin_open_offset_minutes {
            return Err(EngineError::InvalidInput(
                "check-in must close after it opens".into(),
            ));
        }
        Ok(())
    }
}

/// Platform role of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    /// Judge or tournament staff
    Staff,
    /// Platform administrator
    Admin,
}

/// Authenticated user performing an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn player(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Player,
        }
    }

    pub fn staff(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Staff,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }
}

/// A tournament row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub organizer_id: UserId,
    pub config: TournamentConfig,
    pub status: TournamentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tournament {
    /// Organizer or platform admin
    pub fn can_manage(&self, actor: &Actor) -> bool {
        actor.role == Role::Admin || actor.user_id == self.organizer_id
    }

    /// Anyone allowed to settle results: organizer, admin or staff
    pub fn is_staff(&self, actor: &Actor) -> bool {
        self.can_manage(actor) || actor.role == Role::Staff
    }

    pub fn ensure_manager(&self, actor: &Actor) -> EngineResult<()> {
        if self.can_manage(actor) {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied(format!(
                "user {} does not organize tournament {}",
                actor.user_id, self.id
            )))
        }
    }

    pub fn ensure_status(&self, expected: TournamentStatus) -> EngineResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!(
                "tournament {} is {}, expected {}",
                self.id, self.status, expected
            )))
        }
    }

    /// Whether registration is accepted at `now` (status and time window)
    pub fn accepts_registrations(&self, now: DateTime<Utc>) -> bool {
        if self.status != TournamentStatus::RegOpen {
            return false;
        }
        let after_open = self
            .config
            .registration_opens_at
            .is_none_or(|opens| now >= opens);
        let before_close = self
            .config
            .registration_closes_at
            .is_none_or(|closes| now < closes);
        after_open && before_close
    }
}
