//! Column transformer fitted offline and shipped as a JSON artifact.
//!
//! Numeric fields are standardized and emitted as `num__<field>`; categorical
//! fields are one-hot encoded as `cat__<field>_<category>`. Categories not
//! seen during fitting encode as all zeros.

use super::Transform;
use crate::feature_matcher::NAMESPACE_DELIMITER;
use crate::types::application::RawFrame;
use crate::types::frame::TransformedFrame;
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

fn default_numeric_prefix() -> String {
    "num".to_string()
}

fn default_categorical_prefix() -> String {
    "cat".to_string()
}

/// Standardization parameters for one numeric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub mean: f64,
    pub scale: f64,
}

/// Known categories for one categorical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub categories: Vec<String>,
}

/// Fitted column transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransformer {
    #[serde(default = "default_numeric_prefix")]
    pub numeric_prefix: String,
    #[serde(default = "default_categorical_prefix")]
    pub categorical_prefix: String,
    #[serde(default)]
    pub numeric: Vec<NumericColumn>,
    #[serde(default)]
    pub categorical: Vec<CategoricalColumn>,
}

impl ColumnTransformer {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preprocessor from {:?}", path))?;
        let transformer: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse preprocessor {:?}", path))?;

        info!(
            path = %path.display(),
            numeric = transformer.numeric.len(),
            categorical = transformer.categorical.len(),
            outputs = transformer.feature_names_out().len(),
            "Preprocessor loaded"
        );

        Ok(transformer)
    }

    /// Output column names in emission order
    pub fn feature_names_out(&self) -> Vec<String> {
        let numeric = self.numeric.iter().map(|c| {
            format!("{}{}{}", self.numeric_prefix, NAMESPACE_DELIMITER, c.name)
        });
        let categorical = self.categorical.iter().flat_map(|c| {
            c.categories.iter().map(move |category| {
                format!(
                    "{}{}{}_{}",
                    self.categorical_prefix, NAMESPACE_DELIMITER, c.name, category
                )
            })
        });
        numeric.chain(categorical).collect()
    }

    fn encode_row(&self, index: usize, row: &serde_json::Map<String, Value>) -> Result<Vec<f64>> {
        let mut encoded = Vec::new();

        for column in &self.numeric {
            let value = match row.get(&column.name) {
                Some(Value::Number(n)) => n.as_f64(),
                _ => None,
            };
            let Some(value) = value else {
                bail!("record {}: numeric field '{}' is missing or not a number", index, column.name);
            };
            let scale = if column.scale == 0.0 { 1.0 } else { column.scale };
            encoded.push((value - column.mean) / scale);
        }

        for column in &self.categorical {
            let value = match row.get(&column.name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => bail!(
                    "record {}: categorical field '{}' is missing or not a scalar",
                    index,
                    column.name
                ),
            };
            encoded.extend(
                column
                    .categories
                    .iter()
                    .map(|category| if *category == value { 1.0 } else { 0.0 }),
            );
        }

        Ok(encoded)
    }
}

impl Transform for ColumnTransformer {
    fn transform(&self, raw: &RawFrame) -> Result<TransformedFrame> {
        let columns = self.feature_names_out();
        let mut values = Vec::with_capacity(raw.len() * columns.len());

        for (index, row) in raw.rows().iter().enumerate() {
            values.extend(self.encode_row(index, row)?);
        }

        let matrix = Array2::from_shape_vec((raw.len(), columns.len()), values)
            .context("Encoded values do not fill the output frame")?;

        debug!(rows = raw.len(), columns = columns.len(), "Raw frame transformed");

        TransformedFrame::new(columns, matrix)
    }
}
