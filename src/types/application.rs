//! Loan application records and the raw frame built from them

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};

/// A raw record as supplied by the caller: field name to JSON value.
pub type RawRecord = Map<String, Value>;

/// Key under which callers sometimes nest the record a second time.
pub const NESTED_FEATURES_KEY: &str = "features";

/// Raw fields every record must carry before it reaches the transform.
pub const REQUIRED_FIELDS: &[&str] = &[
    "person_income",
    "person_home_ownership",
    "person_emp_length",
    "loan_intent",
    "loan_grade",
    "loan_amnt",
    "loan_int_rate",
    "loan_percent_income",
    "cb_person_default_on_file",
    "cb_person_cred_hist_length",
    "faixa_etaria",
];

/// Typed view of a loan application, used to validate raw records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    /// Annual income
    pub person_income: f64,

    /// RENT, OWN, MORTGAGE or OTHER
    pub person_home_ownership: String,

    /// Employment length in years
    pub person_emp_length: f64,

    /// EDUCATION, MEDICAL, PERSONAL, VENTURE, HOMEIMPROVEMENT or DEBTCONSOLIDATION
    pub loan_intent: String,

    /// Loan grade letter, A through G
    pub loan_grade: String,

    /// Requested amount
    pub loan_amnt: f64,

    /// Interest rate in percent
    pub loan_int_rate: f64,

    /// Loan amount over income, as a fraction in [0, 1]
    pub loan_percent_income: f64,

    /// Prior default on file, `Y` or `N`
    pub cb_person_default_on_file: String,

    /// Credit history length in years
    pub cb_person_cred_hist_length: f64,

    /// Age band label, e.g. `20-29`
    pub faixa_etaria: String,
}

impl LoanApplication {
    /// Check the domain constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        let numeric = [
            ("person_income", self.person_income),
            ("person_emp_length", self.person_emp_length),
            ("loan_amnt", self.loan_amnt),
            ("loan_int_rate", self.loan_int_rate),
            ("loan_percent_income", self.loan_percent_income),
            ("cb_person_cred_hist_length", self.cb_person_cred_hist_length),
        ];
        for (name, value) in numeric {
            if !value.is_finite() {
                return Err(format!("{} must be a finite number", name));
            }
        }

        if !(0.0..=1.0).contains(&self.loan_percent_income) {
            return Err(format!(
                "loan_percent_income must be a fraction in [0, 1], got {} (divide percentages by 100)",
                self.loan_percent_income
            ));
        }

        if !matches!(self.cb_person_default_on_file.as_str(), "Y" | "N") {
            return Err(format!(
                "cb_person_default_on_file must be 'Y' or 'N', got '{}'",
                self.cb_person_default_on_file
            ));
        }

        Ok(())
    }

    /// Render as a raw record suitable for the scoring pipeline.
    pub fn to_record(&self) -> RawRecord {
        let numeric = [
            ("person_income", self.person_income),
            ("person_emp_length", self.person_emp_length),
            ("loan_amnt", self.loan_amnt),
            ("loan_int_rate", self.loan_int_rate),
            ("loan_percent_income", self.loan_percent_income),
            ("cb_person_cred_hist_length", self.cb_person_cred_hist_length),
        ];
        let categorical = [
            ("person_home_ownership", &self.person_home_ownership),
            ("loan_intent", &self.loan_intent),
            ("loan_grade", &self.loan_grade),
            ("cb_person_default_on_file", &self.cb_person_default_on_file),
            ("faixa_etaria", &self.faixa_etaria),
        ];

        let mut record = Map::with_capacity(REQUIRED_FIELDS.len());
        for (name, value) in numeric {
            record.insert(name.to_string(), Value::from(value));
        }
        for (name, value) in categorical {
            record.insert(name.to_string(), Value::String(value.clone()));
        }
        record
    }
}

/// Unwrap a record nested once under [`NESTED_FEATURES_KEY`].
///
/// Only one level is unwrapped; a record whose `features` value is not an
/// object is returned untouched.
pub fn unwrap_nested(mut record: RawRecord) -> RawRecord {
    let nested = matches!(record.get(NESTED_FEATURES_KEY), Some(Value::Object(_)));
    if !nested {
        return record;
    }
    match record.remove(NESTED_FEATURES_KEY) {
        Some(Value::Object(inner)) => {
            warn!("Nested payload detected, unwrapping features");
            inner
        }
        _ => record,
    }
}

/// Raw records in input order; row `i` is the caller's record `i`.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
    rows: Vec<RawRecord>,
    columns: Vec<String>,
}

impl RawFrame {
    /// Build a frame and reject records that fail validation.
    pub fn from_records(rows: Vec<RawRecord>) -> Result<Self, ScoringError> {
        if rows.is_empty() {
            return Err(ScoringError::invalid_input("no records supplied"));
        }

        for (index, row) in rows.iter().enumerate() {
            validate_record(index, row)?;
        }

        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        Ok(Self { rows, columns })
    }

    pub fn rows(&self) -> &[RawRecord] {
        &self.rows
    }

    /// Union of field names across all rows, in first-seen order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(rows, columns)` for diagnostics
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }
}

fn validate_record(index: usize, row: &RawRecord) -> Result<(), ScoringError> {
    let missing: Vec<String> = REQUIRED_FIELDS
        .iter()
        .filter(|field| matches!(row.get(**field), None | Some(Value::Null)))
        .map(|field| field.to_string())
        .collect();

    if !missing.is_empty() {
        let received: Vec<&String> = row.keys().collect();
        error!(
            record = index,
            missing = ?missing,
            received = ?received,
            "Record is missing required fields"
        );
        return Err(ScoringError::InputValidation {
            reason: format!("missing required fields {:?}", missing),
            row: Some(index),
            missing_fields: missing,
        });
    }

    let application: LoanApplication = serde_json::from_value(Value::Object(row.clone()))
        .map_err(|e| ScoringError::InputValidation {
            reason: format!("malformed record: {}", e),
            row: Some(index),
            missing_fields: Vec::new(),
        })?;

    application
        .validate()
        .map_err(|reason| ScoringError::InputValidation {
            reason,
            row: Some(index),
            missing_fields: Vec::new(),
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_application() -> LoanApplication {
        LoanApplication {
            person_income: 9900.0,
            person_home_ownership: "OWN".to_string(),
            person_emp_length: 2.0,
            loan_intent: "VENTURE".to_string(),
            loan_grade: "A".to_string(),
            loan_amnt: 2500.0,
            loan_int_rate: 7.14,
            loan_percent_income: 0.25,
            cb_person_default_on_file: "N".to_string(),
            cb_person_cred_hist_length: 2.0,
            faixa_etaria: "20-29".to_string(),
        }
    }

    #[test]
    fn test_valid_record_builds_frame() {
        let frame = RawFrame::from_records(vec![sample_application().to_record()]).unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.shape(), (1, REQUIRED_FIELDS.len()));
    }

    #[test]
    fn test_missing_fields_reported() {
        let mut record = sample_application().to_record();
        record.remove("loan_grade");
        record.insert("faixa_etaria".to_string(), Value::Null);

        let err = RawFrame::from_records(vec![sample_application().to_record(), record])
            .unwrap_err();
        match err {
            ScoringError::InputValidation {
                row,
                missing_fields,
                ..
            } => {
                assert_eq!(row, Some(1));
                assert_eq!(missing_fields, vec!["loan_grade", "faixa_etaria"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_percentage_income_ratio_rejected() {
        let mut application = sample_application();
        application.loan_percent_income = 25.0;

        let err = RawFrame::from_records(vec![application.to_record()]).unwrap_err();
        assert_eq!(err.kind(), "input_validation_error");
        assert!(err.to_string().contains("loan_percent_income"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut record = sample_application().to_record();
        record.insert("person_income".to_string(), json!("a lot"));

        let err = RawFrame::from_records(vec![record]).unwrap_err();
        assert!(err.to_string().contains("malformed record"));
    }

    #[test]
    fn test_default_flag_must_be_y_or_n() {
        let mut application = sample_application();
        application.cb_person_default_on_file = "maybe".to_string();
        assert!(application.validate().is_err());
    }

    #[test]
    fn test_empty_batch_rejected() {
        assert!(RawFrame::from_records(Vec::new()).is_err());
    }

    #[test]
    fn test_unwrap_nested_once() {
        let inner = sample_application().to_record();
        let mut outer = Map::new();
        outer.insert(NESTED_FEATURES_KEY.to_string(), Value::Object(inner.clone()));

        assert_eq!(unwrap_nested(outer), inner);
        // Flat records pass through untouched
        assert_eq!(unwrap_nested(inner.clone()), inner);
    }

    #[test]
    fn test_unwrap_ignores_non_object_features() {
        let mut record = sample_application().to_record();
        record.insert(NESTED_FEATURES_KEY.to_string(), json!(["not", "a", "map"]));
        let unwrapped = unwrap_nested(record.clone());
        assert_eq!(unwrapped, record);
    }

    #[test]
    fn test_to_record_carries_every_required_field() {
        let application = sample_application();
        let record = application.to_record();

        let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
        let mut required = REQUIRED_FIELDS.to_vec();
        keys.sort_unstable();
        required.sort_unstable();
        assert_eq!(keys, required);

        let parsed: LoanApplication = serde_json::from_value(Value::Object(record)).unwrap();
        assert_eq!(parsed, application);
    }

    #[test]
    fn test_non_finite_value_reported_as_missing_field() {
        let mut application = sample_application();
        application.loan_int_rate = f64::NAN;

        let err = RawFrame::from_records(vec![application.to_record()]).unwrap_err();
        match err {
            ScoringError::InputValidation { missing_fields, .. } => {
                assert_eq!(missing_fields, vec!["loan_int_rate"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_application_serialization() {
        let application = sample_application();
        let json = serde_json::to_string(&application).unwrap();
        let deserialized: LoanApplication = serde_json::from_str(&json).unwrap();
        assert_eq!(application, deserialized);
    }
}
