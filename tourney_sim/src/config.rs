//! Simulator configuration management.
//!
//! Consolidates environment variable reads and command-line overrides into a
//! validated configuration.

use tourney::config::parse_env_or;
use tourney::db::DatabaseConfig;
use tourney::tournament::TournamentFormat;
use tourney::{ConfigError, EngineConfig};

/// Complete simulator configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// PostgreSQL store; the in-memory store when unset
    pub database: Option<DatabaseConfig>,
    pub engine: EngineConfig,
    pub event: EventConfig,
}

/// Shape of the simulated event
#[derive(Debug, Clone, PartialEq)]
pub struct EventConfig {
    pub format: TournamentFormat,
    /// Number of players registering
    pub players: u32,
    /// Seats; defaults to the player count
    pub capacity: u32,
    /// Top-cut size for Swiss with top cut
    pub top_cut: Option<u32>,
    /// Chance of a drawn match, in percent
    pub draw_percent: u8,
    /// Chance that the opponent disputes a report, in percent
    pub dispute_percent: u8,
    /// RNG seed for reproducible runs
    pub seed: Option<u64>,
    pub prize_credit_cents: i64,
}

/// Values given on the command line; they win over the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub format: Option<TournamentFormat>,
    pub players: Option<u32>,
    pub capacity: Option<u32>,
    pub top_cut: Option<u32>,
    pub seed: Option<u64>,
}

impl SimConfig {
    /// Load configuration from environment variables
    ///
    /// Environment:
    /// - `DATABASE_URL`: PostgreSQL store (in-memory store when unset)
    /// - `SIM_FORMAT`: Tournament format (default: swiss)
    /// - `SIM_PLAYERS`: Player count (default: 16)
    /// - `SIM_CAPACITY`: Seats (default: player count)
    /// - `SIM_TOP_CUT`: Top-cut size (default: 8 for swiss_top_cut)
    /// - `SIM_DRAW_PERCENT`: Draw chance (default: 5)
    /// - `SIM_DISPUTE_PERCENT`: Dispute chance (default: 5)
    /// - `SIM_SEED`: RNG seed (default: random)
    /// - `SIM_PRIZE_CENTS`: Store credit for the winner (default: 0)
    ///
    /// # Errors
    ///
    /// * `ConfigError::Invalid` - A value is out of range or unparsable
    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        let database = overrides
            .database_url
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .map(|url| {
                let mut config = DatabaseConfig::with_url(url);
                config.max_connections = parse_env_or("DB_MAX_CONNECTIONS", 5);
                config.min_connections = parse_env_or("DB_MIN_CONNECTIONS", 1);
                config
            });

        let format = match overrides.format {
            Some(format) => format,
            None => match std::env::var("SIM_FORMAT") {
                Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                    var: "SIM_FORMAT".to_string(),
                    reason: format!("unknown format '{value}'"),
                })?,
                Err(_) => TournamentFormat::Swiss,
            },
        };

        let players = overrides
            .players
            .unwrap_or_else(|| parse_env_or("SIM_PLAYERS", 16));
        let capacity = overrides
            .capacity
            .unwrap_or_else(|| parse_env_or("SIM_CAPACITY", players));
        let top_cut = overrides
            .top_cut
            .or_else(|| std::env::var("SIM_TOP_CUT").ok().and_then(|v| v.parse().ok()))
            .or((format == TournamentFormat::SwissTopCut).then_some(8));

        let config = Self {
            database,
            engine: EngineConfig::from_env()?,
            event: EventConfig {
                format,
                players,
                capacity,
                top_cut,
                draw_percent: parse_env_or("SIM_DRAW_PERCENT", 5),
                dispute_percent: parse_env_or("SIM_DISPUTE_PERCENT", 5),
                seed: overrides
                    .seed
                    .or_else(|| std::env::var("SIM_SEED").ok().and_then(|v| v.parse().ok())),
                prize_credit_cents: parse_env_or("SIM_PRIZE_CENTS", 0),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let event = &self.event;
        if event.players < 2 {
            return Err(ConfigError::Invalid {
                var: "SIM_PLAYERS".to_string(),
                reason: "Must be at least 2".to_string(),
            });
        }

        if event.capacity < 2 || event.capacity > self.engine.max_capacity {
            return Err(ConfigError::Invalid {
                var: "SIM_CAPACITY".to_string(),
                reason: format!("Must be between 2 and {}", self.engine.max_capacity),
            });
        }

        if let Some(size) = event.top_cut
            && size > event.players.min(event.capacity)
        {
            return Err(ConfigError::Invalid {
                var: "SIM_TOP_CUT".to_string(),
                reason: "Cannot exceed the number of seated players".to_string(),
            });
        }

        if event.draw_percent > 100 || event.dispute_percent > 100 {
            return Err(ConfigError::Invalid {
                var: "SIM_DRAW_PERCENT".to_string(),
                reason: "Percentages must be at most 100".to_string(),
            });
        }

        if event.prize_credit_cents < 0 {
            return Err(ConfigError::Invalid {
                var: "SIM_PRIZE_CENTS".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            format: TournamentFormat::Swiss,
            players: 16,
            capacity: 16,
            top_cut: None,
            draw_percent: 5,
            dispute_percent: 5,
            seed: None,
            prize_credit_cents: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(event: EventConfig) -> SimConfig {
        SimConfig {
            database: None,
            engine: EngineConfig::default(),
            event,
        }
    }

    #[test]
    fn test_default_event_is_valid() {
        assert!(config(EventConfig::default()).validate().is_ok());
    }

    #[test]
    fn test_single_player_rejected() {
        let err = config(EventConfig {
            players: 1,
            ..EventConfig::default()
        })
        .validate()
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "SIM_PLAYERS"));
    }

    #[test]
    fn test_top_cut_larger_than_field_rejected() {
        let err = config(EventConfig {
            format: TournamentFormat::SwissTopCut,
            players: 6,
            capacity: 6,
            top_cut: Some(8),
            ..EventConfig::default()
        })
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("SIM_TOP_CUT"));
    }

    #[test]
    fn test_overrides_win() {
        let loaded = SimConfig::from_env(Overrides {
            format: Some(TournamentFormat::Gauntlet),
            players: Some(5),
            capacity: Some(6),
            seed: Some(42),
            ..Overrides::default()
        })
        .unwrap();
        assert_eq!(loaded.event.format, TournamentFormat::Gauntlet);
        assert_eq!((loaded.event.players, loaded.event.capacity), (5, 6));
        assert_eq!(loaded.event.seed, Some(42));
    }
}
