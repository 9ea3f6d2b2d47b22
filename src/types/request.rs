//! Request and error reply bodies exchanged over NATS

use super::application::RawRecord;
use super::assessment::{BatchScoreResponse, SingleScoreResponse};
use crate::error::{ScoringError, Stage};
use serde::{Deserialize, Serialize};

/// Incoming scoring request.
///
/// ```json
/// {"records": [{...}, {...}], "threshold": 0.5}
/// {"features": {...}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreRequest {
    Batch {
        records: Vec<RawRecord>,
        #[serde(default)]
        threshold: Option<f64>,
    },
    Single {
        features: RawRecord,
        #[serde(default)]
        threshold: Option<f64>,
    },
}

impl ScoreRequest {
    pub fn threshold(&self) -> Option<f64> {
        match self {
            ScoreRequest::Batch { threshold, .. } | ScoreRequest::Single { threshold, .. } => {
                *threshold
            }
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            ScoreRequest::Batch { records, .. } => records.len(),
            ScoreRequest::Single { .. } => 1,
        }
    }
}

/// Successful reply body, shaped after the request kind
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ScoreReply {
    Single(SingleScoreResponse),
    Batch(BatchScoreResponse),
}

/// Error body sent back in place of a result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Machine-readable kind, e.g. `feature_match_error`
    pub error: String,
    pub stage: Option<Stage>,
    pub message: String,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ErrorReply {
    /// Body that could not be parsed as a [`ScoreRequest`]
    pub fn malformed_request(message: impl Into<String>) -> Self {
        Self {
            error: "input_validation_error".to_string(),
            stage: None,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }
}

impl From<&ScoringError> for ErrorReply {
    fn from(err: &ScoringError) -> Self {
        Self {
            error: err.kind().to_string(),
            stage: Some(err.stage()),
            message: err.to_string(),
            details: err.details(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_request_parsed() {
        let request: ScoreRequest = serde_json::from_value(json!({
            "records": [{"person_income": 1.0}, {"person_income": 2.0}],
            "threshold": 0.5
        }))
        .unwrap();

        assert_eq!(request.record_count(), 2);
        assert_eq!(request.threshold(), Some(0.5));
    }

    #[test]
    fn test_single_request_without_threshold() {
        let request: ScoreRequest =
            serde_json::from_value(json!({"features": {"person_income": 1.0}})).unwrap();

        assert!(matches!(request, ScoreRequest::Single { .. }));
        assert_eq!(request.threshold(), None);
    }

    #[test]
    fn test_unrecognized_body_rejected() {
        assert!(serde_json::from_value::<ScoreRequest>(json!({"person_income": 1.0})).is_err());
    }

    #[test]
    fn test_error_reply_from_scoring_error() {
        let err = ScoringError::internal(Stage::Infer, "model returned 3 probability columns");
        let reply = ErrorReply::from(&err);

        assert_eq!(reply.error, "internal_error");
        assert_eq!(reply.stage, Some(Stage::Infer));
        assert!(reply.message.contains("3 probability columns"));

        let body = serde_json::to_value(&reply).unwrap();
        assert_eq!(body["stage"], "infer");
    }
}
