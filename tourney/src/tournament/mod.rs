//! Tournaments and their lifecycle.
//!
//! ```text
//! DRAFT → PUBLISHED → REG_OPEN → REG_CLOSED → CHECKIN_OPEN → CHECKIN_CLOSED → RUNNING → FINISHED
//!                                      any non-terminal status → CANCELLED
//! ```
//!
//! Only the organizer or a platform admin drives transitions. Registration and
//! check-in windows also move with the clock, see [`lifecycle::sync_lifecycle`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tourney::db::MemoryRepository;
//! use tourney::tournament::{Actor, TournamentConfig};
//! use tourney::Engine;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tourney::EngineError> {
//!     let engine = Engine::with_defaults(Arc::new(MemoryRepository::new()));
//!     let organizer = Actor::player(1);
//!
//!     let config = TournamentConfig::swiss_with_top_cut("Friday Night", 32, 8);
//!     let tournament = engine.tournaments.create_tournament(&organizer, config).await?;
//!     engine.tournaments.publish(tournament.id, &organizer).await?;
//!     engine.tournaments.open_registration(tournament.id, &organizer).await?;
//!     Ok(())
//! }
//! ```

pub mod lifecycle;
pub mod manager;
pub mod models;

pub use lifecycle::{LifecycleEvent, LifecycleSync, ensure_transition, sync_lifecycle};
pub use manager::{FinalResult, TournamentManager};
pub use models::{
    Actor, RefundTier, Role, Tournament, TournamentConfig, TournamentFormat, TournamentId,
    TournamentPolicy, TournamentStatus, UserId,
};
