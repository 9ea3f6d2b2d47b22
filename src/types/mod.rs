//! Type definitions for the scoring pipeline

pub mod application;
pub mod assessment;
pub mod frame;
pub mod request;

pub use application::{LoanApplication, RawFrame, RawRecord};
pub use assessment::{
    BatchScoreResponse, RiskAssessment, RiskClassification, RiskTier, RiskTierBands,
    SingleScoreResponse,
};
pub use frame::{SelectedFrame, TransformedFrame};
pub use request::{ErrorReply, ScoreReply, ScoreRequest};
