//! Command-line tournament simulator.
//!
//! Runs a full event through the engine with random results: registration,
//! check-in, every round of every stage and the final standings.

pub mod config;
pub mod logging;
pub mod sim;

pub use config::{EventConfig, Overrides, SimConfig};
pub use sim::{Simulation, Summary, format_standings};
