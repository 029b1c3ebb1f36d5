//! Standings: ranked tables derived from confirmed matches.
//!
//! A table is always recomputed from scratch and replaces the stored rows of
//! its stage in one step.

pub mod calculator;
pub mod manager;
pub mod models;

pub use calculator::{compare_standings, compute_standings};
pub use manager::StandingsManager;
pub use models::{POINTS_FOR_DRAW, POINTS_FOR_WIN, Standing};
