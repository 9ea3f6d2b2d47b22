//! Artifact loading and the process-scoped artifact holder
//!
//! Layout under the configured root:
//!
//! ```text
//! <dir>/aliases/<alias>                    file containing a version name
//! <dir>/<version>/feature_selection.json   canonical feature contract
//! <dir>/<version>/preprocessor.json        fitted column transformer
//! <dir>/<version>/model.onnx               classifier
//! ```

use super::{ColumnTransformer, OnnxPredictor, Predictor, Transform};
use crate::config::ArtifactsConfig;
use crate::feature_matcher::FeatureContract;
use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything the pipeline needs from the trained model, loaded once.
#[derive(Clone)]
pub struct ScoringArtifacts {
    pub version: String,
    pub contract: Arc<FeatureContract>,
    pub transform: Arc<dyn Transform>,
    pub predictor: Arc<dyn Predictor>,
}

impl ScoringArtifacts {
    pub fn new(
        version: impl Into<String>,
        contract: FeatureContract,
        transform: Arc<dyn Transform>,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        Self {
            version: version.into(),
            contract: Arc::new(contract),
            transform,
            predictor,
        }
    }
}

impl std::fmt::Debug for ScoringArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringArtifacts")
            .field("version", &self.version)
            .field("features", &self.contract.len())
            .finish_non_exhaustive()
    }
}

/// Loader for versioned artifacts on disk
pub struct ArtifactLoader {
    config: ArtifactsConfig,
}

impl ArtifactLoader {
    pub fn new(config: ArtifactsConfig) -> Self {
        Self { config }
    }

    /// Version named by the alias file, or the configured default.
    pub fn resolve_version(&self) -> Result<String> {
        let Some(alias) = &self.config.alias else {
            info!(version = %self.config.default_version, "No alias configured, using default version");
            return Ok(self.config.default_version.clone());
        };

        let alias_path = self.config.dir.join("aliases").join(alias);
        if !alias_path.exists() {
            warn!(
                alias = %alias,
                path = %alias_path.display(),
                version = %self.config.default_version,
                "Alias file not found, using configured default version"
            );
            return Ok(self.config.default_version.clone());
        }

        let version = std::fs::read_to_string(&alias_path)
            .with_context(|| format!("Failed to read alias file {:?}", alias_path))?
            .trim()
            .to_string();
        if version.is_empty() {
            bail!("Alias file {} is empty", alias_path.display());
        }

        info!(alias = %alias, version = %version, "Resolved artifact version from alias");
        Ok(version)
    }

    fn version_dir(&self, version: &str) -> PathBuf {
        self.config.dir.join(version)
    }

    pub fn load_contract(&self, version: &str) -> Result<FeatureContract> {
        let path = self.version_dir(version).join(&self.config.contract_file);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read feature contract from {:?}", path))?;
        let mut contract: FeatureContract = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse feature contract {:?}", path))?;

        if contract.is_empty() {
            bail!("Feature contract {} lists no features", path.display());
        }
        if contract.version.is_empty() {
            contract.version = version.to_string();
        }

        info!(version = %version, features = contract.len(), "Feature contract loaded");
        Ok(contract)
    }

    pub fn load_transform(&self, version: &str) -> Result<ColumnTransformer> {
        ColumnTransformer::from_json_file(
            self.version_dir(version).join(&self.config.preprocessor_file),
        )
    }

    pub fn load_predictor(&self, version: &str) -> Result<OnnxPredictor> {
        let path = self.version_dir(version).join(&self.config.model_file);
        ensure_exists(&path)?;
        OnnxPredictor::from_file(&path, &self.config.model_name, self.config.onnx_threads)
    }

    /// Resolve the version and load contract, transform and model.
    pub fn load(&self) -> Result<ScoringArtifacts> {
        let version = self.resolve_version()?;
        let contract = self.load_contract(&version)?;
        let transform = self.load_transform(&version)?;

        ort::init().commit()?;
        let predictor = self.load_predictor(&version)?;

        Ok(ScoringArtifacts::new(
            version,
            contract,
            Arc::new(transform),
            Arc::new(predictor),
        ))
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Artifact file not found: {}", path.display());
    }
    Ok(())
}

/// Holder initialized at most once; readers never mutate it afterwards.
pub struct ArtifactStore {
    cell: OnceCell<ScoringArtifacts>,
}

impl ArtifactStore {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The process-wide store
    pub fn global() -> &'static ArtifactStore {
        static STORE: ArtifactStore = ArtifactStore::new();
        &STORE
    }

    /// Load artifacts from disk on first call; later calls return the
    /// already-loaded set without touching the filesystem.
    pub fn init(&self, config: &ArtifactsConfig) -> Result<&ScoringArtifacts> {
        self.init_with(|| ArtifactLoader::new(config.clone()).load())
    }

    pub fn init_with<F>(&self, load: F) -> Result<&ScoringArtifacts>
    where
        F: FnOnce() -> Result<ScoringArtifacts>,
    {
        if let Some(artifacts) = self.cell.get() {
            debug!(version = %artifacts.version, "Artifacts already initialized");
            return Ok(artifacts);
        }
        self.cell.get_or_try_init(load)
    }

    pub fn get(&self) -> Option<&ScoringArtifacts> {
        self.cell.get()
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::preprocessor::tests::loan_transformer;
    use crate::types::frame::SelectedFrame;
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ConstantPredictor;

    impl Predictor for ConstantPredictor {
        fn predict_proba(&self, frame: &SelectedFrame) -> Result<Array2<f64>> {
            Ok(Array2::from_elem((frame.nrows(), 1), 0.5))
        }
    }

    fn artifacts_config(dir: &Path, alias: Option<&str>) -> ArtifactsConfig {
        ArtifactsConfig {
            dir: dir.to_path_buf(),
            alias: alias.map(str::to_string),
            default_version: "v1".to_string(),
            model_name: "test".to_string(),
            model_file: "model.onnx".to_string(),
            preprocessor_file: "preprocessor.json".to_string(),
            contract_file: "feature_selection.json".to_string(),
            onnx_threads: 1,
        }
    }

    fn write_version(dir: &Path, version: &str) {
        let version_dir = dir.join(version);
        std::fs::create_dir_all(&version_dir).unwrap();
        std::fs::write(
            version_dir.join("feature_selection.json"),
            r#"{"selected_features": ["person_income", "loan_grade"]}"#,
        )
        .unwrap();
        std::fs::write(
            version_dir.join("preprocessor.json"),
            serde_json::to_string(&loan_transformer()).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_alias_resolves_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("aliases")).unwrap();
        std::fs::write(dir.path().join("aliases").join("production"), "4\n").unwrap();

        let loader = ArtifactLoader::new(artifacts_config(dir.path(), Some("production")));
        assert_eq!(loader.resolve_version().unwrap(), "4");
    }

    #[test]
    fn test_missing_alias_uses_configured_default() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ArtifactLoader::new(artifacts_config(dir.path(), Some("production")));
        assert_eq!(loader.resolve_version().unwrap(), "v1");

        let loader = ArtifactLoader::new(artifacts_config(dir.path(), None));
        assert_eq!(loader.resolve_version().unwrap(), "v1");
    }

    #[test]
    fn test_empty_alias_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("aliases")).unwrap();
        std::fs::write(dir.path().join("aliases").join("production"), "  \n").unwrap();

        let loader = ArtifactLoader::new(artifacts_config(dir.path(), Some("production")));
        assert!(loader.resolve_version().is_err());
    }

    #[test]
    fn test_load_contract_and_transform() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), "v1");
        let loader = ArtifactLoader::new(artifacts_config(dir.path(), None));

        let contract = loader.load_contract("v1").unwrap();
        assert_eq!(contract.version, "v1");
        assert_eq!(contract.features, vec!["person_income", "loan_grade"]);

        let transform = loader.load_transform("v1").unwrap();
        assert_eq!(transform, loan_transformer());
    }

    #[test]
    fn test_missing_model_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_version(dir.path(), "v1");
        let loader = ArtifactLoader::new(artifacts_config(dir.path(), None));

        let err = loader.load_predictor("v1").err().unwrap();
        assert!(err.to_string().contains("Artifact file not found"));
    }

    #[test]
    fn test_store_initializes_once() {
        let store = ArtifactStore::new();
        let loads = AtomicUsize::new(0);
        let load = || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(ScoringArtifacts::new(
                "v1",
                FeatureContract::new("v1", vec!["person_income".to_string()]),
                Arc::new(loan_transformer()),
                Arc::new(ConstantPredictor),
            ))
        };

        assert!(store.get().is_none());
        let first = store.init_with(load).unwrap() as *const ScoringArtifacts;
        let second = store.init_with(load).unwrap() as *const ScoringArtifacts;

        assert_eq!(first, second);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_init_can_be_retried() {
        let store = ArtifactStore::new();
        assert!(store
            .init_with(|| anyhow::bail!("artifact directory unreachable"))
            .is_err());
        assert!(store.get().is_none());
    }
}
