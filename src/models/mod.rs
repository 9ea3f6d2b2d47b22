//! Model-side components: the collaborator traits the pipeline is written
//! against, their artifact-backed implementations, and the risk scorer.

pub mod inference;
pub mod loader;
pub mod preprocessor;
pub mod scorer;

pub use inference::OnnxPredictor;
pub use loader::{ArtifactLoader, ArtifactStore, ScoringArtifacts};
pub use preprocessor::ColumnTransformer;
pub use scorer::RiskScorer;

use crate::types::application::RawFrame;
use crate::types::frame::{SelectedFrame, TransformedFrame};
use anyhow::Result;
use ndarray::Array2;

/// Fitted preprocessing stage: raw records in, named numeric columns out.
///
/// Implementations must keep one output row per input row, in input order.
pub trait Transform: Send + Sync {
    fn transform(&self, raw: &RawFrame) -> Result<TransformedFrame>;
}

/// Trained classifier.
///
/// Returns one row per input row: either `[P(no default), P(default)]` or a
/// single `P(default)` column.
pub trait Predictor: Send + Sync {
    fn predict_proba(&self, frame: &SelectedFrame) -> Result<Array2<f64>>;
}
