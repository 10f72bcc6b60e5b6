//! Risk level classification for the concentration risk score
//!
//! `risk_score` is higher when supply is more diversified, so the bands run
//! the opposite way to the score: high scores are low risk.

use serde::{Deserialize, Serialize};

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,      // >= 80
    Moderate, // 60-80
    High,     // < 60
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
        }
    }

    /// Capitalized label used in narration ("Low Risk")
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
        }
    }
}

/// Configurable risk level thresholds on the 0-100 risk score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskLevelThresholds {
    /// Scores at or above this are low risk
    pub low: f64,
    /// Scores at or above this (and below `low`) are moderate risk
    pub moderate: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        RiskLevelThresholds {
            low: 80.0,
            moderate: 60.0,
        }
    }
}

/// Assign risk level with default thresholds
pub fn assign_risk_level(risk_score: f64) -> RiskLevel {
    assign_risk_level_with_thresholds(risk_score, &RiskLevelThresholds::default())
}

/// Assign risk level with custom thresholds
pub fn assign_risk_level_with_thresholds(
    risk_score: f64,
    thresholds: &RiskLevelThresholds,
) -> RiskLevel {
    if risk_score >= thresholds.low {
        RiskLevel::Low
    } else if risk_score >= thresholds.moderate {
        RiskLevel::Moderate
    } else {
        RiskLevel::High
    }
}
