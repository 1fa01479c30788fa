use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Model identifiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Xgboost,
    Lightgbm,
}

impl ModelId {
    /// Every model the registry must load at startup.
    pub const ALL: [ModelId; 2] = [ModelId::Xgboost, ModelId::Lightgbm];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Xgboost => "xgboost",
            ModelId::Lightgbm => "lightgbm",
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ModelId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| AppError::UnknownModel(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Risk classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskCategory {
    /// probability >= 0.9
    #[serde(rename = "Very High Risk")]
    VeryHigh,
    /// 0.7 <= probability < 0.9
    #[serde(rename = "High Risk")]
    High,
    /// 0.5 <= probability < 0.7
    #[serde(rename = "Medium Risk")]
    Medium,
    /// 0.3 <= probability < 0.5
    #[serde(rename = "Low Risk")]
    Low,
    /// probability < 0.3
    #[serde(rename = "Very Low Risk")]
    VeryLow,
}

impl RiskCategory {
    /// Most severe first.
    pub const ALL: [RiskCategory; 5] = [
        RiskCategory::VeryHigh,
        RiskCategory::High,
        RiskCategory::Medium,
        RiskCategory::Low,
        RiskCategory::VeryLow,
    ];

    /// Lower bounds are inclusive. Values drifting past either end of [0, 1]
    /// land in the nearest boundary bucket.
    pub fn from_probability(p: f64) -> Self {
        use crate::config::risk_thresholds::*;
        if p >= VERY_HIGH_MIN {
            RiskCategory::VeryHigh
        } else if p >= HIGH_MIN {
            RiskCategory::High
        } else if p >= MEDIUM_MIN {
            RiskCategory::Medium
        } else if p >= LOW_MIN {
            RiskCategory::Low
        } else {
            RiskCategory::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::VeryHigh => "Very High Risk",
            RiskCategory::High => "High Risk",
            RiskCategory::Medium => "Medium Risk",
            RiskCategory::Low => "Low Risk",
            RiskCategory::VeryLow => "Very Low Risk",
        }
    }

    pub fn is_high_risk(&self) -> bool {
        matches!(self, RiskCategory::VeryHigh | RiskCategory::High)
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Scored rows
// ---------------------------------------------------------------------------

/// A transaction after scoring. Source fields are copied, never altered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    #[serde(rename = "id")]
    pub transaction_id: String,
    pub client_id: String,
    pub fraud_probability: f64,
    pub fraud_category: RiskCategory,
    pub model_used: ModelId,
}
