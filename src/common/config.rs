//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::config_path;
use super::Result;
use crate::format::TableFormat;
use crate::pipeline::FailurePolicy;
use crate::runner::{BatchFiles, CommandMode};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// External program settings
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// Failure handling
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Batch-mode file names
    #[serde(default)]
    pub batch: BatchFiles,

    /// Table layout
    #[serde(default)]
    pub table: TableFormat,
}

/// How to launch the external program
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Per-value program
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Fixed arguments placed before the sweep value
    #[serde(default)]
    pub args: Vec<String>,

    /// Batch program, reads the input file instead of an argument
    #[serde(default = "default_batch_program")]
    pub batch_program: PathBuf,

    /// Argument passing mode
    #[serde(default)]
    pub mode: CommandMode,

    /// Per-invocation deadline, none by default
    #[serde(default)]
    pub timeout_secs: Option<f64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            batch_program: default_batch_program(),
            mode: CommandMode::default(),
            timeout_secs: None,
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("./area_cmdline")
}
fn default_batch_program() -> PathBuf {
    PathBuf::from("./area_files")
}

/// Worker pool settings
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrent processes; 1 runs sequentially
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    1
}

/// Failure handling settings
#[derive(Debug, Deserialize, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub failure: FailurePolicy,
}

impl Config {
    /// Load configuration from an explicit path or the default config file
    ///
    /// Returns default configuration if no file exists. An explicit path
    /// that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pool.workers == 0 {
            return Err(super::Error::Config(
                "pool.workers must be at least 1".to_string(),
            ));
        }
        if let Some(secs) = self.runner.timeout_secs {
            if !(secs > 0.0 && secs.is_finite()) {
                return Err(super::Error::Config(format!(
                    "runner.timeout_secs must be a positive number, got {secs}"
                )));
            }
        }
        Ok(())
    }
}
