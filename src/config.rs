//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - reasonflow.toml (default configuration)
//! - reasonflow.local.toml (git-ignored local overrides)
//! - Environment variables (REASONFLOW_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # reasonflow.toml
//! [storage]
//! project_dir = "/var/lib/reasonflow/family"
//! backend = "directory"
//!
//! [evaluation]
//! strategy = "naive"
//! max_rule_evaluations = 50
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! REASONFLOW_STORAGE__BACKEND=memory
//! REASONFLOW_EVALUATION__WORKERS=4
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Fact store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Project directory for the directory backend
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    #[serde(default)]
    pub backend: StorageBackend,

    /// Cumulative fact count at which a predicate gets a dedicated location
    #[serde(default = "default_partition_block_size")]
    pub partition_block_size: i64,
}

/// Fact store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Facts live in memory for the lifetime of the reasoner
    #[default]
    Memory,
    /// Facts are mirrored to JSON-lines files under `project_dir`
    Directory,
}

/// Fixpoint evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Evaluator strategy (naive, dependency)
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Per-rule evaluation cap within one stratum (0 = unlimited)
    #[serde(default)]
    pub max_rule_evaluations: usize,

    #[serde(default = "default_true")]
    pub enable_join_optimization: bool,

    /// Largest body the join optimizer searches exhaustively
    #[serde(default = "default_max_join_permutation_literals")]
    pub max_join_permutation_literals: usize,

    /// Dataflow worker threads (0 = all available cores)
    #[serde(default)]
    pub workers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from("./data/default")
}
fn default_partition_block_size() -> i64 {
    1024
}
fn default_strategy() -> String {
    "dependency".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_join_permutation_literals() -> usize {
    8
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. reasonflow.toml (base configuration)
    /// 2. reasonflow.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (REASONFLOW_* prefix)
    pub fn load() -> Result<Self> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("reasonflow.toml"))
            .merge(Toml::file("reasonflow.local.toml"))
            .merge(Env::prefixed("REASONFLOW_").split("__"))
            .extract()
            .map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// Load configuration from specific file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("REASONFLOW_").split("__"))
            .extract()
            .map_err(|e| EngineError::Configuration(e.to_string()))
    }

    /// In-memory configuration for tests and embedding
    pub fn in_memory() -> Self {
        Config::default()
    }

    /// Directory-backed configuration rooted at `project_dir`
    pub fn with_project_dir(project_dir: impl Into<PathBuf>) -> Self {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Directory;
        config.storage.project_dir = project_dir.into();
        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            evaluation: EvaluationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            project_dir: default_project_dir(),
            backend: StorageBackend::default(),
            partition_block_size: default_partition_block_size(),
        }
    }
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            strategy: default_strategy(),
            max_rule_evaluations: 0,
            enable_join_optimization: true,
            max_join_permutation_literals: default_max_join_permutation_literals(),
            workers: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}
