//! Configuration management for the scoring service

use crate::types::assessment::{RiskTierBands, DEFAULT_THRESHOLD};
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject scoring requests arrive on
    pub request_subject: String,
    /// Queue group shared by service replicas
    pub queue_group: String,
}

/// Location and layout of the trained artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Root directory holding `aliases/` and one directory per version
    pub dir: PathBuf,
    /// Alias file under `aliases/` naming the version to serve
    #[serde(default)]
    pub alias: Option<String>,
    /// Version served when no alias is configured or the alias file is absent
    pub default_version: String,
    /// Name used in logs for the model
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_preprocessor_file")]
    pub preprocessor_file: String,
    #[serde(default = "default_contract_file")]
    pub contract_file: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_model_name() -> String {
    "lgb_prob_default".to_string()
}

fn default_model_file() -> String {
    "model.onnx".to_string()
}

fn default_preprocessor_file() -> String {
    "preprocessor.json".to_string()
}

fn default_contract_file() -> String {
    "feature_selection.json".to_string()
}

fn default_onnx_threads() -> usize {
    1
}

/// Decision settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Threshold used when a request does not carry one
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Risk tier band upper bounds
    #[serde(default)]
    pub risk_tiers: RiskTierBands,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl ScoringConfig {
    /// Threshold in `[0, 1]` and `0 <= low_max <= medium_max <= 1`
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_threshold) {
            bail!(
                "scoring.default_threshold must lie in [0, 1], got {}",
                self.default_threshold
            );
        }

        let RiskTierBands {
            low_max,
            medium_max,
        } = self.risk_tiers;
        if !(0.0..=1.0).contains(&low_max) || !(0.0..=1.0).contains(&medium_max) {
            bail!(
                "scoring.risk_tiers bounds must lie in [0, 1], got low_max={} medium_max={}",
                low_max,
                medium_max
            );
        }
        if low_max > medium_max {
            bail!(
                "scoring.risk_tiers.low_max ({}) exceeds medium_max ({})",
                low_max,
                medium_max
            );
        }
        Ok(())
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_THRESHOLD,
            risk_tiers: RiskTierBands::default(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests scored concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `CREDIT_RISK__*`
    /// environment overrides (e.g. `CREDIT_RISK__NATS__URL`)
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("CREDIT_RISK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config
            .scoring
            .validate()
            .context("Invalid scoring configuration")?;

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                request_subject: "credit.score".to_string(),
                queue_group: "credit-risk-scoring".to_string(),
            },
            artifacts: ArtifactsConfig {
                dir: PathBuf::from("artifacts"),
                alias: Some("production".to_string()),
                default_version: "v1".to_string(),
                model_name: default_model_name(),
                model_file: default_model_file(),
                preprocessor_file: default_preprocessor_file(),
                contract_file: default_contract_file(),
                onnx_threads: 1,
            },
            scoring: ScoringConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.scoring.default_threshold, 0.42);
        assert_eq!(config.scoring.risk_tiers.low_max, 0.30);
        assert_eq!(config.scoring.risk_tiers.medium_max, 0.60);
        assert_eq!(config.artifacts.default_version, "v1");
    }

    fn write_config(scoring: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://localhost:4222"
request_subject = "credit.score"
queue_group = "scorers"

[artifacts]
dir = "artifacts"
default_version = "v1"

{scoring}

[pipeline]
workers = 2

[logging]
level = "info"
format = "json"
"#
        )
        .unwrap();
        file
    }

    #[test]
    fn test_threshold_outside_unit_interval_rejected() {
        let file = write_config("[scoring]\ndefault_threshold = 1.5");

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("default_threshold"));
    }

    #[test]
    fn test_inverted_tier_bands_rejected() {
        let file = write_config("[scoring.risk_tiers]\nlow_max = 0.9\nmedium_max = 0.2");

        let err = AppConfig::load_from_path(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("exceeds medium_max"));
    }

    #[test]
    fn test_custom_scoring_section_accepted() {
        let file = write_config(
            "[scoring]\ndefault_threshold = 0.5\n\n[scoring.risk_tiers]\nlow_max = 0.2\nmedium_max = 0.2",
        );

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.scoring.default_threshold, 0.5);
        assert_eq!(config.scoring.risk_tiers.low_max, 0.2);
    }

    #[test]
    fn test_load_from_file_applies_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://broker:4222"
request_subject = "credit.score"
queue_group = "scorers"

[artifacts]
dir = "/srv/artifacts"
default_version = "v4"

[pipeline]
workers = 8

[logging]
level = "debug"
format = "pretty"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();

        assert_eq!(config.nats.url, "nats://broker:4222");
        assert_eq!(config.artifacts.default_version, "v4");
        assert_eq!(config.artifacts.alias, None);
        assert_eq!(config.artifacts.model_file, "model.onnx");
        assert_eq!(config.scoring.default_threshold, 0.42);
        assert_eq!(config.pipeline.metrics_interval_secs, 30);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.toml");
        let config = AppConfig::load_from_path(path).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(config.nats.request_subject, defaults.nats.request_subject);
        assert_eq!(config.nats.queue_group, defaults.nats.queue_group);
        assert_eq!(config.artifacts.alias, defaults.artifacts.alias);
        assert_eq!(config.artifacts.default_version, defaults.artifacts.default_version);
        assert_eq!(config.scoring.risk_tiers, defaults.scoring.risk_tiers);
        assert_eq!(config.pipeline.workers, defaults.pipeline.workers);
    }
}
