//! Configuration management for the credit risk pipeline

use crate::models::inference::DEFAULT_THRESHOLD;
use crate::models::loader::{ModelPaths, DEFAULT_MODEL_FILE, SCORE_MODEL_FILE};
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Default location of the configuration file.
pub const CONFIG_FILE: &str = "config/config.toml";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_PATH_VAR: &str = "CREDIT_RISK_CONFIG";

/// Prefix for environment overrides, e.g. `CREDIT_RISK_MODELS__PROJECT_ROOT`.
pub const ENV_PREFIX: &str = "CREDIT_RISK";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelsConfig,
    pub prediction: PredictionConfig,
    pub logging: LoggingConfig,
}

/// Model artifact locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory the model files live in. Defaults to two levels above
    /// the executable's directory.
    pub project_root: Option<PathBuf>,
    pub score_model_file: String,
    pub default_model_file: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            score_model_file: SCORE_MODEL_FILE.to_string(),
            default_model_file: DEFAULT_MODEL_FILE.to_string(),
        }
    }
}

/// Prediction configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Probability above which a loan is labelled as a default
    pub default_threshold: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            default_threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from `$CREDIT_RISK_CONFIG` or the default file,
    /// then apply environment overrides. A missing file is not an error.
    pub fn load() -> Result<Self> {
        let path = env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl ModelsConfig {
    /// Configured project root, or the directory two levels above the
    /// executable's directory. Falls back to the working directory when the
    /// executable path is unavailable.
    pub fn project_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.project_root {
            return Ok(root.clone());
        }

        let exe = env::current_exe().context("Failed to locate the executable")?;
        match exe.ancestors().nth(3) {
            Some(root) => Ok(root.to_path_buf()),
            None => env::current_dir().context("Failed to read the working directory"),
        }
    }

    pub fn resolve_paths(&self) -> Result<ModelPaths> {
        let root = self.project_root()?;
        Ok(ModelPaths {
            score_model: root.join(&self.score_model_file),
            default_model: root.join(&self.default_model_file),
        })
    }
}
