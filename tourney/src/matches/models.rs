//! Match data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::EngineError;
use crate::registration::models::RegistrationId;
use crate::stage::models::StageId;
use crate::tournament::models::{TournamentId, UserId};

/// Match ID type
pub type MatchId = i64;

/// Synthetic score of a bye, always credited to player A
pub const BYE_SCORE: (u32, u32) = (2, 0);

/// Group label of a double-elimination grand final
pub const GRAND_FINAL_LABEL: &str = "GF";

/// Lifecycle of a match's reported score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Reported,
    Confirmed,
    Disputed,
    Void,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Reported => "reported",
            ResultStatus::Confirmed => "confirmed",
            ResultStatus::Disputed => "disputed",
            ResultStatus::Void => "void",
        }
    }

    /// Not yet settled; blocks the next round of its stage
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ResultStatus::Pending | ResultStatus::Reported | ResultStatus::Disputed
        )
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ResultStatus::Pending),
            "reported" => Ok(ResultStatus::Reported),
            "confirmed" => Ok(ResultStatus::Confirmed),
            "disputed" => Ok(ResultStatus::Disputed),
            "void" => Ok(ResultStatus::Void),
            other => Err(EngineError::InvalidInput(format!(
                "unknown result status '{other}'"
            ))),
        }
    }
}

/// Who reported or confirmed a result, and when
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSignature {
    /// Set when the signer is a participant of the match
    pub registration_id: Option<RegistrationId>,
    pub user_id: UserId,
    pub at: DateTime<Utc>,
}

/// A match row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub stage_id: StageId,
    pub round_number: u32,
    pub table_number: u32,
    pub player_a: RegistrationId,
    /// `None` for a bye
    pub player_b: Option<RegistrationId>,
    pub score_a: Option<u32>,
    pub score_b: Option<u32>,
    pub is_draw: bool,
    pub winner: Option<RegistrationId>,
    pub result_status: ResultStatus,
    pub reported_by: Option<ResultSignature>,
    pub confirmed_by: Option<ResultSignature>,
    /// Group identifier for group brackets, `GF` for a grand final
    pub group_label: Option<String>,
    /// Bumped by every result mutation; compare-and-swap token
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn is_bye(&self) -> bool {
        self.player_b.is_none()
    }

    pub fn involves(&self, registration_id: RegistrationId) -> bool {
        self.player_a == registration_id || self.player_b == Some(registration_id)
    }

    pub fn opponent_of(&self, registration_id: RegistrationId) -> Option<RegistrationId> {
        if self.player_a == registration_id {
            self.player_b
        } else if self.player_b == Some(registration_id) {
            Some(self.player_a)
        } else {
            None
        }
    }

    /// Loser of a decided, non-bye match
    pub fn loser(&self) -> Option<RegistrationId> {
        let winner = self.winner?;
        self.opponent_of(winner)
    }

    pub fn is_grand_final(&self) -> bool {
        self.group_label.as_deref() == Some(GRAND_FINAL_LABEL)
    }
}

/// Side of a double-elimination bracket a generated match belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BracketSide {
    /// The stage being generated
    #[default]
    Main,
    Losers,
}

/// A match produced by a pairing strategy, before persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatch {
    pub round_number: u32,
    pub table_number: u32,
    pub player_a: RegistrationId,
    pub player_b: Option<RegistrationId>,
    pub group_label: Option<String>,
    pub side: BracketSide,
}

impl NewMatch {
    pub fn pairing(
        round_number: u32,
        table_number: u32,
        player_a: RegistrationId,
        player_b: RegistrationId,
    ) -> Self {
        Self {
            round_number,
            table_number,
            player_a,
            player_b: Some(player_b),
            group_label: None,
            side: BracketSide::Main,
        }
    }

    pub fn bye(round_number: u32, table_number: u32, player: RegistrationId) -> Self {
        Self {
            round_number,
            table_number,
            player_a: player,
            player_b: None,
            group_label: None,
            side: BracketSide::Main,
        }
    }

    pub fn with_group(mut self, label: impl Into<String>) -> Self {
        self.group_label = Some(label.into());
        self
    }

    pub fn on(mut self, side: BracketSide) -> Self {
        self.side = side;
        self
    }

    pub fn is_bye(&self) -> bool {
        self.player_b.is_none()
    }

    /// Materialize into a row; byes are created already confirmed 2-0
    pub fn into_match(
        self,
        id: MatchId,
        tournament_id: TournamentId,
        stage_id: StageId,
        now: DateTime<Utc>,
    ) -> Match {
        let is_bye = self.is_bye();
        Match {
            id,
            tournament_id,
            stage_id,
            round_number: self.round_number,
            table_number: self.table_number,
            player_a: self.player_a,
            player_b: self.player_b,
            score_a: is_bye.then_some(BYE_SCORE.0),
            score_b: is_bye.then_some(BYE_SCORE.1),
            is_draw: false,
            winner: is_bye.then_some(self.player_a),
            result_status: if is_bye {
                ResultStatus::Confirmed
            } else {
                ResultStatus::Pending
            },
            reported_by: None,
            confirmed_by: None,
            group_label: self.group_label,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bye_is_created_confirmed() {
        let m = NewMatch::bye(1, 4, 7).into_match(1, 1, 1, Utc::now());
        assert!(m.is_bye());
        assert_eq!(m.result_status, ResultStatus::Confirmed);
        assert_eq!((m.score_a, m.score_b), (Some(2), Some(0)));
        assert_eq!(m.winner, Some(7));
    }

    #[test]
    fn test_pairing_is_created_pending() {
        let m = NewMatch::pairing(2, 1, 7, 9).into_match(5, 1, 1, Utc::now());
        assert_eq!(m.result_status, ResultStatus::Pending);
        assert_eq!(m.opponent_of(9), Some(7));
        assert_eq!(m.opponent_of(3), None);
        assert!(m.winner.is_none());
    }

    #[test]
    fn test_open_statuses() {
        assert!(ResultStatus::Disputed.is_open());
        assert!(!ResultStatus::Void.is_open());
        assert!(!ResultStatus::Confirmed.is_open());
    }
}
