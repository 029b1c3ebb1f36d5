//! Standings data models.

use serde::{Deserialize, Serialize};

use crate::registration::models::RegistrationId;
use crate::stage::models::StageId;
use crate::tournament::models::{TournamentId, UserId};

/// Points for a match win
pub const POINTS_FOR_WIN: u32 = 3;

/// Points for a draw
pub const POINTS_FOR_DRAW: u32 = 1;

/// One ranked row of a stage's standings table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub tournament_id: TournamentId,
    pub stage_id: StageId,
    pub registration_id: RegistrationId,
    pub player_id: UserId,
    pub points: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub games_won: u32,
    pub games_played: u32,
    /// Opponents' match-win percentage
    pub omw: f64,
    /// Game-win percentage
    pub gw: f64,
    /// Opponents' game-win percentage
    pub ogw: f64,
    /// 1-based
    pub rank: u32,
}

impl Standing {
    pub fn matches_played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }
}
