//! ONNX Runtime implementation of [`Predictor`]

use super::Predictor;
use crate::types::frame::SelectedFrame;
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Classifier exported to ONNX.
///
/// Handles the two probability layouts common to converted tree models: a
/// `[rows, classes]` float tensor (XGBoost, random forests) and a
/// `seq(map(int64, float))` (LightGBM, CatBoost).
pub struct OnnxPredictor {
    name: String,
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxPredictor {
    /// Load a model file with the given intra-op thread count
    pub fn from_file<P: AsRef<Path>>(path: P, name: &str, onnx_threads: usize) -> Result<Self> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads = onnx_threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(onnx_threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "probabilities".to_string())
            });

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Find a probability matrix among the outputs, preferring the named one
    fn extract_probabilities(&self, outputs: &SessionOutputs, rows: usize) -> Result<Array2<f64>> {
        if let Some(output) = outputs.get(self.output_name.as_str()) {
            if let Some(matrix) = self.try_extract_matrix(&output, rows)? {
                return Ok(matrix);
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Some(matrix) = self.try_extract_matrix(&output, rows)? {
                debug!(model = %self.name, output = %name, "Probabilities read from fallback output");
                return Ok(matrix);
            }
        }

        bail!("model '{}' produced no probability output", self.name)
    }

    fn try_extract_matrix(&self, output: &DynValue, rows: usize) -> Result<Option<Array2<f64>>> {
        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let columns = match dims.as_slice() {
                [_, classes] => *classes as usize,
                [_] => 1,
                other => bail!("unexpected probability tensor shape {:?}", other),
            };
            let values: Vec<f64> = data.iter().map(|&v| v as f64).collect();
            let matrix = Array2::from_shape_vec((rows, columns), values)
                .context("Probability tensor does not match the input row count")?;
            return Ok(Some(matrix));
        }

        let dtype = output.dtype();
        if DynSequenceValueType::can_downcast(&dtype) {
            return self.extract_from_sequence_map(output, rows).map(Some);
        }

        Ok(None)
    }

    /// Read `seq(map(int64, float))`: one map per row, class id to probability
    fn extract_from_sequence_map(&self, output: &DynValue, rows: usize) -> Result<Array2<f64>> {
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
        if maps.len() != rows {
            bail!("model returned {} probability maps for {} rows", maps.len(), rows);
        }

        let mut values = Vec::new();
        let mut columns = None;
        for map_value in &maps {
            let mut kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
            kv_pairs.sort_by_key(|(class_id, _)| *class_id);

            match columns {
                None => columns = Some(kv_pairs.len()),
                Some(expected) if expected != kv_pairs.len() => {
                    bail!("probability maps disagree on class count")
                }
                Some(_) => {}
            }
            values.extend(kv_pairs.iter().map(|(_, prob)| *prob as f64));
        }

        let columns = columns.unwrap_or(0);
        debug!(model = %self.name, rows, columns, "Extracted from seq(map)");
        Ok(Array2::from_shape_vec((rows, columns), values)?)
    }
}

impl Predictor for OnnxPredictor {
    fn predict_proba(&self, frame: &SelectedFrame) -> Result<Array2<f64>> {
        let rows = frame.nrows();
        let shape = vec![rows as i64, frame.ncols() as i64];
        let input_tensor = Tensor::from_array((shape, frame.to_f32_row_major()))
            .context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![&self.input_name => input_tensor])?;

        self.extract_probabilities(&outputs, rows)
    }
}
