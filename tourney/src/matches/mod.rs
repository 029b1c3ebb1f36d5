//! Matches and the result confirmation protocol.
//!
//! A participant reports, the opponent confirms or disputes, and staff may
//! settle or void at any point. Confirmed results feed the stage's standings.

pub mod manager;
pub mod models;
pub mod state_machine;

pub use manager::MatchManager;
pub use models::{
    BYE_SCORE, BracketSide, GRAND_FINAL_LABEL, Match, MatchId, NewMatch, ResultSignature,
    ResultStatus,
};
pub use state_machine::{MatchActor, Outcome, Transition};
