//! Risk assessment data structures
//!
//! A [`RiskAssessment`] carries two independent readings of the same
//! probability. `classification` is the decision relative to the caller's
//! threshold; `risk_tier` is a fixed-band severity label that ignores the
//! threshold. They can disagree: probability 0.45 against threshold 0.42 is
//! `HighRisk` with a `Medium` tier. Consumers should treat them as separate
//! axes (decision vs. severity).

use crate::feature_matcher::ReconciliationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating point chosen offline by the model owner
pub const DEFAULT_THRESHOLD: f64 = 0.42;

/// Threshold-relative decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClassification {
    HighRisk,
    LowRisk,
}

/// Fixed-band severity label, independent of the decision threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub const ALL: [RiskTier; 3] = [RiskTier::Low, RiskTier::Medium, RiskTier::High];

    /// Label as it appears in replies
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }

    /// Determine tier from probability and band upper bounds (inclusive)
    pub fn from_probability(probability: f64, bands: &RiskTierBands) -> Self {
        if probability <= bands.low_max {
            RiskTier::Low
        } else if probability <= bands.medium_max {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }
}

/// Inclusive upper bounds of the `Low` and `Medium` tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskTierBands {
    pub low_max: f64,
    pub medium_max: f64,
}

impl Default for RiskTierBands {
    fn default() -> Self {
        Self {
            low_max: 0.30,
            medium_max: 0.60,
        }
    }
}

/// Scored outcome for one record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// P(default), in [0, 1]
    pub probability: f64,
    pub classification: RiskClassification,
    /// Normalized distance from the threshold, in [0, 1]
    pub confidence: f64,
    pub risk_tier: RiskTier,
    pub threshold_used: f64,
}

impl RiskAssessment {
    /// Raw `|probability - threshold|`
    pub fn distance_to_threshold(&self) -> f64 {
        (self.probability - self.threshold_used).abs()
    }
}

/// Reply for single-record scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleScoreResponse {
    pub request_id: String,
    pub probability_default: f64,
    pub probability_percent: f64,
    pub classification: RiskClassification,
    pub risk_tier: RiskTier,
    pub confidence: f64,
    pub confidence_percent: f64,
    pub distance_to_threshold: f64,
    pub threshold_used: f64,
    pub reconciliation: ReconciliationReport,
    pub scored_at: DateTime<Utc>,
}

impl SingleScoreResponse {
    pub fn new(assessment: &RiskAssessment, reconciliation: ReconciliationReport) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            probability_default: round_to(assessment.probability, 4),
            probability_percent: round_to(assessment.probability * 100.0, 2),
            classification: assessment.classification,
            risk_tier: assessment.risk_tier,
            confidence: round_to(assessment.confidence, 4),
            confidence_percent: round_to(assessment.confidence * 100.0, 2),
            distance_to_threshold: round_to(assessment.distance_to_threshold(), 4),
            threshold_used: assessment.threshold_used,
            reconciliation,
            scored_at: Utc::now(),
        }
    }
}

/// One row of a batch reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchScoreEntry {
    pub probability_default: f64,
    pub classification: RiskClassification,
    pub confidence: f64,
}

/// Reply for batch scoring; `results[i]` belongs to input record `i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchScoreResponse {
    pub request_id: String,
    pub results: Vec<BatchScoreEntry>,
    pub threshold_used: f64,
    pub reconciliation: ReconciliationReport,
    pub scored_at: DateTime<Utc>,
}

impl BatchScoreResponse {
    pub fn new(
        assessments: &[RiskAssessment],
        threshold_used: f64,
        reconciliation: ReconciliationReport,
    ) -> Self {
        let results = assessments
            .iter()
            .map(|a| BatchScoreEntry {
                probability_default: round_to(a.probability, 4),
                classification: a.classification,
                confidence: round_to(a.confidence, 4),
            })
            .collect();

        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            results,
            threshold_used,
            reconciliation,
            scored_at: Utc::now(),
        }
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
