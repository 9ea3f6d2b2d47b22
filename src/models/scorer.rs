//! Conversion of a default probability into a decision, a confidence and a tier

use crate::types::assessment::{RiskAssessment, RiskClassification, RiskTier, RiskTierBands};

/// Turns `(probability, threshold)` into a [`RiskAssessment`].
///
/// Pure and total. Callers are responsible for passing values in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScorer {
    bands: RiskTierBands,
}

impl RiskScorer {
    pub fn new(bands: RiskTierBands) -> Self {
        Self { bands }
    }

    pub fn bands(&self) -> &RiskTierBands {
        &self.bands
    }

    pub fn score(&self, probability: f64, threshold: f64) -> RiskAssessment {
        RiskAssessment {
            probability,
            classification: classify(probability, threshold),
            confidence: confidence(probability, threshold),
            risk_tier: RiskTier::from_probability(probability, &self.bands),
            threshold_used: threshold,
        }
    }
}

/// `HighRisk` when `probability >= threshold`; the boundary is high risk.
pub fn classify(probability: f64, threshold: f64) -> RiskClassification {
    if probability >= threshold {
        RiskClassification::HighRisk
    } else {
        RiskClassification::LowRisk
    }
}

/// Distance from the threshold scaled into `[0, 1]`: zero at the threshold,
/// saturating once the probability is 0.5 away.
pub fn confidence(probability: f64, threshold: f64) -> f64 {
    ((probability - threshold).abs() * 2.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    fn grid() -> impl Iterator<Item = f64> {
        (0..=100).map(|i| i as f64 / 100.0)
    }

    #[test]
    fn test_low_probability_scenario() {
        let assessment = RiskScorer::default().score(0.0, 0.42);

        assert_eq!(assessment.classification, RiskClassification::LowRisk);
        assert!((assessment.confidence - 0.84).abs() < EPSILON);
        assert_eq!(assessment.risk_tier, RiskTier::Low);
        assert_eq!(assessment.threshold_used, 0.42);
    }

    #[test]
    fn test_boundary_probability_is_high_risk() {
        let assessment = RiskScorer::default().score(0.42, 0.42);

        assert_eq!(assessment.classification, RiskClassification::HighRisk);
        assert_eq!(assessment.confidence, 0.0);
        assert_eq!(assessment.risk_tier, RiskTier::Medium);
    }

    #[test]
    fn test_confidence_saturates() {
        let assessment = RiskScorer::default().score(0.95, 0.42);

        assert_eq!(assessment.classification, RiskClassification::HighRisk);
        assert_eq!(assessment.confidence, 1.0);
        assert_eq!(assessment.risk_tier, RiskTier::High);
    }

    #[test]
    fn test_decision_and_tier_can_disagree() {
        let assessment = RiskScorer::default().score(0.45, 0.42);

        assert_eq!(assessment.classification, RiskClassification::HighRisk);
        assert_eq!(assessment.risk_tier, RiskTier::Medium);
    }

    #[test]
    fn test_classification_matches_comparison() {
        for p in grid() {
            for t in grid() {
                let expected = if p >= t {
                    RiskClassification::HighRisk
                } else {
                    RiskClassification::LowRisk
                };
                assert_eq!(classify(p, t), expected, "p={p} t={t}");
            }
        }
    }

    #[test]
    fn test_confidence_properties() {
        for p in grid() {
            assert_eq!(confidence(p, p), 0.0);
            for t in grid() {
                let c = confidence(p, t);
                assert!((0.0..=1.0).contains(&c));
                assert_eq!(c, confidence(t, p), "symmetry p={p} t={t}");
                if (p - t).abs() >= 0.5 {
                    assert_eq!(c, 1.0, "saturation p={p} t={t}");
                }
            }
        }
    }

    #[test]
    fn test_tier_ignores_threshold() {
        let scorer = RiskScorer::default();
        for p in grid() {
            let tier = scorer.score(p, 0.0).risk_tier;
            for t in grid() {
                assert_eq!(scorer.score(p, t).risk_tier, tier);
            }
        }
    }

    #[test]
    fn test_custom_bands() {
        let scorer = RiskScorer::new(RiskTierBands {
            low_max: 0.1,
            medium_max: 0.2,
        });
        assert_eq!(scorer.score(0.15, 0.42).risk_tier, RiskTier::Medium);
        assert_eq!(scorer.score(0.25, 0.42).risk_tier, RiskTier::High);
    }
}
