//! Tournament stages.
//!
//! A tournament owns one or more stages played in sequence (for example Swiss
//! rounds followed by a top cut). Each stage owns its matches and standings and
//! is created lazily when its first round is generated.

pub mod models;

pub use models::{GauntletState, NewStage, Stage, StageId, StageSettings, StageStatus, StageType};
