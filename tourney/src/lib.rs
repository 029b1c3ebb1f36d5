//! # Tourney
//!
//! A tournament pairing, match-result and standings engine.
//!
//! The engine schedules matches across several formats, runs a dual-control
//! result confirmation protocol and recomputes ranked standings with
//! multi-level tie-breaks whenever a result changes.
//!
//! ## Architecture
//!
//! Pure cores sit under async managers that own persistence and concurrency:
//!
//! - **Match result state machine**: PENDING → REPORTED → CONFIRMED, with
//!   DISPUTED and VOID ([`matches::state_machine`])
//! - **Pairing strategies**: Swiss, top cut, single and double elimination,
//!   round robin, league, gauntlet, group brackets and custom, dispatched with
//!   `enum_dispatch` ([`pairing`])
//! - **Standings calculator**: points, then OMW, GW, OGW and registration id
//!   ([`standings::calculator`])
//! - **Lifecycle sync**: time-driven registration and check-in windows
//!   ([`tournament::lifecycle`])
//!
//! Managers reach storage through the [`db::Repository`] traits, implemented
//! for PostgreSQL and in memory. Every invariant that must hold under
//! concurrency (capacity, result compare-and-swap, one round at a time) is a
//! single atomic repository primitive.
//!
//! ## Example
//!
//! ```
//! use tourney::pairing::elimination::bracket_order;
//! use tourney::pairing::swiss::swiss_rounds_for;
//!
//! assert_eq!(swiss_rounds_for(12), 4);
//! assert_eq!(bracket_order(4), vec![1, 4, 2, 3]);
//! ```

/// Time source.
pub mod clock;

/// External collaborators: identity, decklists, prizes.
pub mod collaborators;

/// Engine configuration.
pub mod config;

/// Persistence layer.
pub mod db;

/// Engine facade.
pub mod engine;

/// Engine error types.
pub mod errors;

/// Keyed async locks.
pub mod locks;

/// Matches and result confirmation.
pub mod matches;

/// Pairing and bracket generation.
pub mod pairing;

/// Player registrations.
pub mod registration;

/// Tournament stages.
pub mod stage;

/// Ranked standings.
pub mod standings;

/// Tournaments and their lifecycle.
pub mod tournament;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Collaborators, Engine};
pub use errors::{EngineError, EngineResult};
