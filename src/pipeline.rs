//! Prediction orchestrator: normalize, transform, select, infer, score.
//!
//! Every stage maps its failures onto one [`ScoringError`] variant and none of
//! them retries; the transform and the model are deterministic, so a retry
//! with the same input cannot change the outcome.

use crate::config::ScoringConfig;
use crate::error::{ScoringError, Stage};
use crate::feature_matcher::{self, FeatureContract, ReconciliationReport};
use crate::metrics::PipelineMetrics;
use crate::models::loader::ScoringArtifacts;
use crate::models::scorer::RiskScorer;
use crate::models::{Predictor, Transform};
use crate::types::application::{unwrap_nested, RawFrame, RawRecord};
use crate::types::assessment::{
    BatchScoreResponse, RiskAssessment, SingleScoreResponse, DEFAULT_THRESHOLD,
};
use crate::types::frame::SelectedFrame;
use crate::types::request::{ScoreReply, ScoreRequest};
use ndarray::{Array2, Axis};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Assessments for a batch, in input order, plus how the feature contract
/// was satisfied.
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub assessments: Vec<RiskAssessment>,
    pub reconciliation: ReconciliationReport,
    pub threshold_used: f64,
}

/// Runs raw records through the transform, matcher, model and scorer.
///
/// Holds only shared, read-only handles, so one instance can serve
/// concurrent callers.
#[derive(Clone)]
pub struct PredictionOrchestrator {
    contract: Arc<FeatureContract>,
    transform: Arc<dyn Transform>,
    predictor: Arc<dyn Predictor>,
    scorer: RiskScorer,
    default_threshold: f64,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl PredictionOrchestrator {
    pub fn new(
        contract: Arc<FeatureContract>,
        transform: Arc<dyn Transform>,
        predictor: Arc<dyn Predictor>,
        scorer: RiskScorer,
    ) -> Self {
        Self {
            contract,
            transform,
            predictor,
            scorer,
            default_threshold: DEFAULT_THRESHOLD,
            metrics: None,
        }
    }

    /// Build from loaded artifacts and the scoring section of the config
    pub fn from_artifacts(artifacts: &ScoringArtifacts, config: &ScoringConfig) -> Self {
        Self::new(
            artifacts.contract.clone(),
            artifacts.transform.clone(),
            artifacts.predictor.clone(),
            RiskScorer::new(config.risk_tiers),
        )
        .with_default_threshold(config.default_threshold)
    }

    pub fn with_default_threshold(mut self, threshold: f64) -> Self {
        self.default_threshold = threshold;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    /// Score one record. A record nested under `features` is unwrapped once.
    pub fn predict_single(
        &self,
        record: RawRecord,
        threshold: Option<f64>,
    ) -> Result<(RiskAssessment, ReconciliationReport), ScoringError> {
        let outcome = self.predict(vec![unwrap_nested(record)], threshold)?;
        let assessment = outcome.assessments.first().copied().ok_or_else(|| {
            ScoringError::internal(Stage::Score, "single-record batch produced no assessment")
        })?;
        Ok((assessment, outcome.reconciliation))
    }

    /// Score a batch; `assessments[i]` belongs to `records[i]`.
    pub fn predict(
        &self,
        records: Vec<RawRecord>,
        threshold: Option<f64>,
    ) -> Result<ScoringOutcome, ScoringError> {
        let start = Instant::now();
        let result = self.run(records, threshold);

        if let Some(metrics) = &self.metrics {
            match &result {
                Ok(outcome) => metrics.record_outcome(start.elapsed(), outcome),
                Err(e) => metrics.record_failure(e.stage()),
            }
        }
        if let Err(e) = &result {
            error!(stage = %e.stage(), kind = e.kind(), error = %e, "Scoring failed");
        }

        result
    }

    /// Single-record reply in the external result shape
    pub fn score_single(
        &self,
        record: RawRecord,
        threshold: Option<f64>,
    ) -> Result<SingleScoreResponse, ScoringError> {
        let (assessment, reconciliation) = self.predict_single(record, threshold)?;
        Ok(SingleScoreResponse::new(&assessment, reconciliation))
    }

    /// Batch reply in the external result shape
    pub fn score_batch(
        &self,
        records: Vec<RawRecord>,
        threshold: Option<f64>,
    ) -> Result<BatchScoreResponse, ScoringError> {
        let outcome = self.predict(records, threshold)?;
        Ok(BatchScoreResponse::new(
            &outcome.assessments,
            outcome.threshold_used,
            outcome.reconciliation,
        ))
    }

    /// Dispatch a transport request to single or batch scoring
    pub fn handle(&self, request: ScoreRequest) -> Result<ScoreReply, ScoringError> {
        match request {
            ScoreRequest::Single {
                features,
                threshold,
            } => self.score_single(features, threshold).map(ScoreReply::Single),
            ScoreRequest::Batch { records, threshold } => {
                self.score_batch(records, threshold).map(ScoreReply::Batch)
            }
        }
    }

    fn run(
        &self,
        records: Vec<RawRecord>,
        threshold: Option<f64>,
    ) -> Result<ScoringOutcome, ScoringError> {
        let threshold = validate_threshold(threshold.unwrap_or(self.default_threshold))?;

        // Normalize
        let raw = RawFrame::from_records(records)?;
        let (rows, raw_columns) = raw.shape();
        debug!(rows, columns = raw_columns, "Raw frame built");

        // Transform
        let transformed =
            self.transform
                .transform(&raw)
                .map_err(|e| ScoringError::FeatureTransform {
                    rows,
                    columns: raw_columns,
                    source: e.into(),
                })?;
        if transformed.nrows() != rows {
            return Err(ScoringError::internal(
                Stage::Transform,
                format!(
                    "transform returned {} rows for {} input records",
                    transformed.nrows(),
                    rows
                ),
            ));
        }
        debug!(
            rows,
            columns = transformed.ncols(),
            "Transformed frame ready"
        );

        // Select
        let mapping = feature_matcher::reconcile(transformed.columns(), &self.contract.features)?;
        let selected = feature_matcher::select(&transformed, &mapping)?;
        let reconciliation = mapping.report();
        debug!(
            selected = reconciliation.selected,
            expected = reconciliation.expected,
            "Features selected"
        );

        // Infer
        let probabilities = self.infer(&selected)?;

        // Score
        let assessments: Vec<RiskAssessment> = probabilities
            .iter()
            .map(|&p| self.scorer.score(p, threshold))
            .collect();

        info!(
            rows,
            threshold,
            degraded = reconciliation.is_degraded(),
            "Scoring complete"
        );

        Ok(ScoringOutcome {
            assessments,
            reconciliation,
            threshold_used: threshold,
        })
    }

    /// P(default) per row, in row order
    fn infer(&self, selected: &SelectedFrame) -> Result<Vec<f64>, ScoringError> {
        let matrix = self
            .predictor
            .predict_proba(selected)
            .map_err(|e| ScoringError::ModelInference {
                rows: selected.nrows(),
                columns: selected.ncols(),
                source: e.into(),
            })?;

        if matrix.nrows() != selected.nrows() {
            return Err(ScoringError::internal(
                Stage::Infer,
                format!(
                    "model returned {} rows for {} input rows",
                    matrix.nrows(),
                    selected.nrows()
                ),
            ));
        }

        let two_class = to_two_class(matrix)?;
        let positive = two_class.index_axis(Axis(1), 1);

        positive
            .iter()
            .enumerate()
            .map(|(row, &p)| {
                if p.is_finite() && (0.0..=1.0).contains(&p) {
                    Ok(p)
                } else {
                    Err(ScoringError::internal(
                        Stage::Infer,
                        format!("probability {} at row {} is outside [0, 1]", p, row),
                    ))
                }
            })
            .collect()
    }
}

/// Reject thresholds outside `[0, 1]` (including NaN).
pub fn validate_threshold(threshold: f64) -> Result<f64, ScoringError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ScoringError::invalid_input(format!(
            "threshold {} is outside [0, 1]",
            threshold
        )))
    }
}

/// Bring a probability matrix to `[P(no default), P(default)]` columns.
///
/// A single column is taken as P(default) and its complement is derived.
pub fn to_two_class(matrix: Array2<f64>) -> Result<Array2<f64>, ScoringError> {
    match matrix.ncols() {
        2 => Ok(matrix),
        1 => {
            let positive = matrix.column(0);
            let mut two_class = Array2::zeros((matrix.nrows(), 2));
            two_class.column_mut(0).assign(&positive.mapv(|p| 1.0 - p));
            two_class.column_mut(1).assign(&positive);
            Ok(two_class)
        }
        other => Err(ScoringError::internal(
            Stage::Infer,
            format!(
                "model returned {} probability columns, expected 2 (or 1)",
                other
            ),
        )),
    }
}
