//! Numeric frames passed between the transform, the matcher and the model

use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView2, Axis};
use std::collections::HashSet;

/// Output of the preprocessing transform: named numeric columns, one row per
/// input record, rows in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedFrame {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl TransformedFrame {
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            bail!(
                "frame has {} column names but {} value columns",
                columns.len(),
                values.ncols()
            );
        }

        let mut seen = HashSet::with_capacity(columns.len());
        if let Some(duplicate) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            bail!("duplicate column name '{}' in transformed frame", duplicate);
        }

        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Restrict to the given column positions, in the given order.
    pub(crate) fn take_columns(&self, indices: &[usize]) -> Array2<f64> {
        self.values.select(Axis(1), indices)
    }
}

/// Transformed frame restricted and reordered to the model's inputs.
///
/// Only built by [`select`](crate::feature_matcher::select): at least one
/// column, no duplicates.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFrame {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl SelectedFrame {
    pub(crate) fn new(columns: Vec<String>, values: Array2<f64>) -> Self {
        debug_assert_eq!(columns.len(), values.ncols());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Row-major `f32` copy, the layout ONNX models take as input
    pub fn to_f32_row_major(&self) -> Vec<f32> {
        self.values.iter().map(|&v| v as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_shape_mismatch_rejected() {
        let err = TransformedFrame::new(vec!["a".to_string()], array![[1.0, 2.0]]).unwrap_err();
        assert!(err.to_string().contains("1 column names but 2"));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let result = TransformedFrame::new(
            vec!["num__a".to_string(), "num__a".to_string()],
            array![[1.0, 2.0]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_take_columns_reorders() {
        let frame = TransformedFrame::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
        )
        .unwrap();

        assert_eq!(frame.take_columns(&[2, 0]), array![[3.0, 1.0], [6.0, 4.0]]);
        assert_eq!(frame.column_index("b"), Some(1));
    }

    #[test]
    fn test_row_major_layout() {
        let selected = SelectedFrame::new(
            vec!["x".to_string(), "y".to_string()],
            array![[1.0, 2.0], [3.0, 4.0]],
        );
        assert_eq!(selected.to_f32_row_major(), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
