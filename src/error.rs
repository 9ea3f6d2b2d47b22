//! Error taxonomy for the scoring pipeline.
//!
//! Variants are ordered by the pipeline stage that raises them. Partial
//! feature misses are not represented here; they travel as
//! [`ReconciliationReport`](crate::feature_matcher::ReconciliationReport)
//! metadata on successful results.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of available columns rendered in a match failure message.
const AVAILABLE_COLUMNS_DISPLAY_LIMIT: usize = 20;

/// Boxed collaborator error kept as the `source` of a wrapped failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Normalize,
    Transform,
    Select,
    Infer,
    Score,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Normalize => "normalize",
            Stage::Transform => "transform",
            Stage::Select => "select",
            Stage::Infer => "infer",
            Stage::Score => "score",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`PredictionOrchestrator`](crate::pipeline::PredictionOrchestrator).
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Malformed or incomplete raw record, or a threshold outside `[0, 1]`.
    #[error("invalid input{}: {reason}", fmt_row(.row))]
    InputValidation {
        reason: String,
        /// Offending record position, when the failure is record-specific
        row: Option<usize>,
        /// Required raw fields absent from the record
        missing_fields: Vec<String>,
    },

    /// The external preprocessing transform failed.
    #[error("feature transform failed for input of shape {rows}x{columns}: {source}")]
    FeatureTransform {
        rows: usize,
        columns: usize,
        #[source]
        source: BoxError,
    },

    /// No canonical feature matched any transformed column.
    #[error(
        "none of the {} canonical features matched the {} transformed columns (canonical: {:?}; available: {})",
        .canonical.len(),
        .available.len(),
        .canonical,
        truncate_columns(.available)
    )]
    FeatureMatch {
        canonical: Vec<String>,
        available: Vec<String>,
    },

    /// The external model call failed.
    #[error("model inference failed for selected frame of shape {rows}x{columns}: {source}")]
    ModelInference {
        rows: usize,
        columns: usize,
        #[source]
        source: BoxError,
    },

    /// A collaborator violated its contract (shape, probability range).
    #[error("internal error during {stage}: {detail}")]
    Internal { stage: Stage, detail: String },
}

impl ScoringError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        ScoringError::InputValidation {
            reason: reason.into(),
            row: None,
            missing_fields: Vec::new(),
        }
    }

    pub fn internal(stage: Stage, detail: impl Into<String>) -> Self {
        ScoringError::Internal {
            stage,
            detail: detail.into(),
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ScoringError::InputValidation { .. } => "input_validation_error",
            ScoringError::FeatureTransform { .. } => "feature_transform_error",
            ScoringError::FeatureMatch { .. } => "feature_match_error",
            ScoringError::ModelInference { .. } => "model_inference_error",
            ScoringError::Internal { .. } => "internal_error",
        }
    }

    /// Pipeline stage the failure belongs to
    pub fn stage(&self) -> Stage {
        match self {
            ScoringError::InputValidation { .. } => Stage::Normalize,
            ScoringError::FeatureTransform { .. } => Stage::Transform,
            ScoringError::FeatureMatch { .. } => Stage::Select,
            ScoringError::ModelInference { .. } => Stage::Infer,
            ScoringError::Internal { stage, .. } => *stage,
        }
    }

    /// Structured diagnostic context for error replies
    pub fn details(&self) -> serde_json::Value {
        match self {
            ScoringError::InputValidation {
                row,
                missing_fields,
                ..
            } => serde_json::json!({
                "row": row,
                "missing_fields": missing_fields,
            }),
            ScoringError::FeatureTransform { rows, columns, .. }
            | ScoringError::ModelInference { rows, columns, .. } => serde_json::json!({
                "rows": rows,
                "columns": columns,
            }),
            ScoringError::FeatureMatch {
                canonical,
                available,
            } => serde_json::json!({
                "canonical": canonical,
                "available": available,
            }),
            ScoringError::Internal { .. } => serde_json::Value::Null,
        }
    }
}

fn fmt_row(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" at record {}", row),
        None => String::new(),
    }
}

fn truncate_columns(columns: &[String]) -> String {
    if columns.len() <= AVAILABLE_COLUMNS_DISPLAY_LIMIT {
        return format!("{:?}", columns);
    }
    format!(
        "{:?} ... and {} more",
        &columns[..AVAILABLE_COLUMNS_DISPLAY_LIMIT],
        columns.len() - AVAILABLE_COLUMNS_DISPLAY_LIMIT
    )
}
