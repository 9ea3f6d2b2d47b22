//! Credit Risk Scoring Library
//!
//! Scores loan applications for probability of default: a fitted
//! preprocessor, a feature-contract matcher, an ONNX classifier and a
//! threshold-based scorer, served over NATS request/reply.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_matcher;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod types;

pub use config::AppConfig;
pub use error::{ScoringError, Stage};
pub use feature_matcher::{FeatureContract, ReconciliationReport};
pub use pipeline::{PredictionOrchestrator, ScoringOutcome};
pub use types::{LoanApplication, RawRecord, RiskAssessment, RiskClassification, RiskTier};
