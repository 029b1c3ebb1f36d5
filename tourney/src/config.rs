//! Engine configuration.
//!
//! Consolidates the environment variable reads of the engine and provides a
//! validated configuration.

use crate::tournament::models::{RefundTier, TournamentPolicy};

/// Engine-wide defaults and limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Minutes before the start at which check-in opens
    pub checkin_open_offset_minutes: i64,
    /// Minutes before the start at which check-in closes
    pub checkin_close_offset_minutes: i64,
    /// Whether full tournaments accept waitlisted registrations by default
    pub allow_waitlist: bool,
    /// Largest capacity a tournament may be created with
    pub max_capacity: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkin_open_offset_minutes: 60,
            checkin_close_offset_minutes: 0,
            allow_waitlist: true,
            max_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// - `CHECKIN_OPEN_OFFSET_MINUTES` (default: 60)
    /// - `CHECKIN_CLOSE_OFFSET_MINUTES` (default: 0)
    /// - `ALLOW_WAITLIST` (default: true)
    /// - `MAX_TOURNAMENT_CAPACITY` (default: 1024)
    ///
    /// # Errors
    ///
    /// Returns error if the loaded values are inconsistent
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            checkin_open_offset_minutes: parse_env_or(
                "CHECKIN_OPEN_OFFSET_MINUTES",
                defaults.checkin_open_offset_minutes,
            ),
            checkin_close_offset_minutes: parse_env_or(
                "CHECKIN_CLOSE_OFFSET_MINUTES",
                defaults.checkin_close_offset_minutes,
            ),
            allow_waitlist: parse_env_or("ALLOW_WAITLIST", defaults.allow_waitlist),
            max_capacity: parse_env_or("MAX_TOURNAMENT_CAPACITY", defaults.max_capacity),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.checkin_open_offset_minutes < 0 || self.checkin_close_offset_minutes < 0 {
            return Err(ConfigError::Invalid {
                var: "CHECKIN_OPEN_OFFSET_MINUTES".to_string(),
                reason: "Offsets must not be negative".to_string(),
            });
        }

        if self.checkin_close_offset_minutes > self.checkin_open_offset_minutes {
            return Err(ConfigError::Invalid {
                var: "CHECKIN_CLOSE_OFFSET_MINUTES".to_string(),
                reason: format!(
                    "Must not exceed the open offset ({})",
                    self.checkin_open_offset_minutes
                ),
            });
        }

        if self.max_capacity < 2 {
            return Err(ConfigError::Invalid {
                var: "MAX_TOURNAMENT_CAPACITY".to_string(),
                reason: "Must be at least 2".to_string(),
            });
        }

        Ok(())
    }

    /// Policy given to tournaments created without an explicit one
    pub fn default_policy(&self) -> TournamentPolicy {
        TournamentPolicy {
            checkin_open_offset_minutes: self.checkin_open_offset_minutes,
            checkin_close_offset_minutes: self.checkin_close_offset_minutes,
            allow_waitlist: self.allow_waitlist,
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

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
