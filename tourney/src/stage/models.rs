//! Stage data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::errors::EngineError;
use crate::registration::models::RegistrationId;
use crate::tournament::models::{TournamentFormat, TournamentId};

/// Stage ID type
pub type StageId = i64;

/// Stage type, one per pairing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    Swiss,
    TopCut,
    SingleElimination,
    /// Winners bracket of a double elimination (holds the grand final)
    Winners,
    /// Losers bracket of a double elimination
    Losers,
    RoundRobin,
    League,
    Gauntlet,
    Groups,
    Custom,
}

impl StageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageType::Swiss => "swiss",
            StageType::TopCut => "top_cut",
            StageType::SingleElimination => "single_elimination",
            StageType::Winners => "winners",
            StageType::Losers => "losers",
            StageType::RoundRobin => "round_robin",
            StageType::League => "league",
            StageType::Gauntlet => "gauntlet",
            StageType::Groups => "groups",
            StageType::Custom => "custom",
        }
    }

    /// The stage a format generates first
    pub fn initial_for(format: TournamentFormat) -> Self {
        match format {
            TournamentFormat::Swiss | TournamentFormat::SwissTopCut => StageType::Swiss,
            TournamentFormat::SingleElimination => StageType::SingleElimination,
            TournamentFormat::DoubleElimination => StageType::Winners,
            TournamentFormat::RoundRobin => StageType::RoundRobin,
            TournamentFormat::League => StageType::League,
            TournamentFormat::Gauntlet => StageType::Gauntlet,
            TournamentFormat::GroupBrackets => StageType::Groups,
            TournamentFormat::Custom => StageType::Custom,
        }
    }

    /// Stage types a format may own, in play order
    pub fn sequence_for(format: TournamentFormat) -> &'static [StageType] {
        match format {
            TournamentFormat::SwissTopCut => &[StageType::Swiss, StageType::TopCut],
            TournamentFormat::DoubleElimination => &[StageType::Winners, StageType::Losers],
            TournamentFormat::Swiss => &[StageType::Swiss],
            TournamentFormat::SingleElimination => &[StageType::SingleElimination],
            TournamentFormat::RoundRobin => &[StageType::RoundRobin],
            TournamentFormat::League => &[StageType::League],
            TournamentFormat::Gauntlet => &[StageType::Gauntlet],
            TournamentFormat::GroupBrackets => &[StageType::Groups],
            TournamentFormat::Custom => &[StageType::Custom],
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "swiss" => Ok(StageType::Swiss),
            "top_cut" => Ok(StageType::TopCut),
            "single_elimination" => Ok(StageType::SingleElimination),
            "winners" => Ok(StageType::Winners),
            "losers" => Ok(StageType::Losers),
            "round_robin" => Ok(StageType::RoundRobin),
            "league" => Ok(StageType::League),
            "gauntlet" => Ok(StageType::Gauntlet),
            "groups" => Ok(StageType::Groups),
            "custom" => Ok(StageType::Custom),
            other => Err(EngineError::InvalidInput(format!(
                "unknown stage type '{other}'"
            ))),
        }
    }
}

/// Stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Active,
    Completed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Active => "active",
            StageStatus::Completed => "completed",
        }
    }
}

impl FromStr for StageStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StageStatus::Active),
            "completed" => Ok(StageStatus::Completed),
            other => Err(EngineError::InvalidInput(format!(
                "unknown stage status '{other}'"
            ))),
        }
    }
}

/// Running state of a gauntlet, persisted with the stage between rounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GauntletState {
    /// Challenger order, fixed when the gauntlet starts
    pub order: Vec<RegistrationId>,
    pub defender: RegistrationId,
    /// Index into `order` of the next challenger
    pub next_index: usize,
}

/// Format-specific stage settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSettings {
    pub swiss_rounds: Option<u32>,
    pub top_cut_size: Option<u32>,
    pub group_count: Option<u32>,
    pub legs: Option<u32>,
    /// Stage whose standings seed this one (top cut)
    pub source_stage_id: Option<StageId>,
    pub gauntlet: Option<GauntletState>,
}

/// A stage row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub tournament_id: TournamentId,
    pub stage_type: StageType,
    /// 1-based position among the tournament's stages
    pub sequence: u32,
    pub settings: StageSettings,
    pub status: StageStatus,
    pub created_at: DateTime<Utc>,
}

/// Stage creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStage {
    pub tournament_id: TournamentId,
    pub stage_type: StageType,
    pub sequence: u32,
    pub settings: StageSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_stage_mapping() {
        assert_eq!(
            StageType::initial_for(TournamentFormat::SwissTopCut),
            StageType::Swiss
        );
        assert_eq!(
            StageType::sequence_for(TournamentFormat::DoubleElimination),
            &[StageType::Winners, StageType::Losers]
        );
    }

    #[test]
    fn test_settings_serialize_gauntlet_state() {
        let settings = StageSettings {
            gauntlet: Some(GauntletState {
                order: vec![3, 1, 2],
                defender: 3,
                next_index: 1,
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["gauntlet"]["defender"], 3);
        let back: StageSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }
}
