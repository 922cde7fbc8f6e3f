//! Model and decoder configuration.
//!
//! Resolution order: explicit path → `SSHMM_CONFIG` environment variable →
//! built-in defaults. Files are TOML or JSON, chosen by extension.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sshmm_sparse::{Indexing, MphBudget};
use tracing::debug;

use crate::decode::Algorithm;
use crate::error::{ModelError, Result};

/// Environment variable naming a configuration file.
pub const ENV_CONFIG_PATH: &str = "SSHMM_CONFIG";

/// Storage strategies and training options for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Strategy of the initial distribution P0.
    #[serde(with = "indexing_name")]
    pub p0_indexing: Indexing,
    /// Column strategy of the transition matrix A.
    #[serde(with = "indexing_name")]
    pub a_indexing: Indexing,
    /// Column strategy of the emission matrix B.
    #[serde(with = "indexing_name")]
    pub b_indexing: Indexing,
    /// Strategy of the row storage inside every matrix column.
    #[serde(with = "indexing_name")]
    pub column_indexing: Indexing,
    /// Retain A/B row totals after normalization.
    pub keep_row_totals: bool,
    /// Perfect-hash construction budget.
    pub mph: MphBudget,
    /// Decoder settings.
    pub decode: DecodeConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            p0_indexing: Indexing::Hashing,
            a_indexing: Indexing::Hashing,
            b_indexing: Indexing::Full,
            column_indexing: Indexing::None,
            keep_row_totals: false,
            mph: MphBudget::default(),
            decode: DecodeConfig::default(),
        }
    }
}

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Decoder used when none is named explicitly.
    pub algorithm: Algorithm,
    /// Worker threads for batch decoding.
    pub workers: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::SparseViterbi,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Where a configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path passed by the caller.
    Explicit(PathBuf),
    /// Path named by `SSHMM_CONFIG`.
    Environment(PathBuf),
    /// No file; built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit(path) => write!(f, "explicit path {}", path.display()),
            ConfigSource::Environment(path) => {
                write!(f, "{} ({})", ENV_CONFIG_PATH, path.display())
            }
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

impl ModelConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        let config: ModelConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .map_err(|e| ModelError::Config(format!("{}: {}", path.display(), e)))?,
            Some("json") => serde_json::from_str(&text)
                .map_err(|e| ModelError::Config(format!("{}: {}", path.display(), e)))?,
            _ => {
                return Err(ModelError::Config(format!(
                    "{}: expected a .toml or .json file",
                    path.display()
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve the configuration from an explicit path, `SSHMM_CONFIG`, or defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let env_path = std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from);
        Self::resolve_with(explicit, env_path)
    }

    fn resolve_with(
        explicit: Option<&Path>,
        env_path: Option<PathBuf>,
    ) -> Result<(Self, ConfigSource)> {
        let (config, source) = match (explicit, env_path) {
            (Some(path), _) => (Self::load(path)?, ConfigSource::Explicit(path.to_path_buf())),
            (None, Some(path)) if !path.as_os_str().is_empty() => {
                (Self::load(&path)?, ConfigSource::Environment(path))
            }
            _ => (Self::default(), ConfigSource::BuiltinDefault),
        };
        debug!(source = %source, "model configuration resolved");
        Ok((config, source))
    }

    /// Check semantic constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.mph.max_displacement == 0 {
            return Err(ModelError::Config(
                "mph.max_displacement must be at least 1".to_string(),
            ));
        }
        if self.decode.workers == 0 {
            return Err(ModelError::Config(
                "decode.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set every structure's strategy at once.
    pub fn with_indexing(mut self, p0: Indexing, a: Indexing, b: Indexing) -> Self {
        self.p0_indexing = p0;
        self.a_indexing = a;
        self.b_indexing = b;
        self
    }

    /// Set the strategy of rows within matrix columns.
    pub fn with_column_indexing(mut self, indexing: Indexing) -> Self {
        self.column_indexing = indexing;
        self
    }

    /// Keep matrix row totals after normalization.
    pub fn with_keep_row_totals(mut self, keep: bool) -> Self {
        self.keep_row_totals = keep;
        self
    }

    /// Set the number of batch decode workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.decode.workers = workers;
        self
    }
}

/// Strategies are written by name in config files.
mod indexing_name {
    use super::*;

    pub fn serialize<S: Serializer>(indexing: &Indexing, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(indexing.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Indexing, D::Error> {
        Indexing::deserialize(deserializer)
    }
}
