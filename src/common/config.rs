//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Worker process settings
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Comparison thresholds
    #[serde(default)]
    pub comparison: ComparisonConfig,

    /// Script discovery settings
    #[serde(default)]
    pub scripts: ScriptsConfig,

    /// Run scheduling settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Worker process settings
#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    /// Path to the worker executable (default: next to `framecheck`, then PATH)
    pub path: Option<PathBuf>,

    /// Kill a worker that has not exited after this many seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Size of the shared memory region per invocation
    #[serde(default = "default_region_size")]
    pub region_size_mb: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: default_timeout(),
            region_size_mb: default_region_size(),
        }
    }
}

fn default_timeout() -> u64 {
    600
}
fn default_region_size() -> usize {
    64
}

impl WorkerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn region_size_bytes(&self) -> usize {
        self.region_size_mb * 1024 * 1024
    }
}

/// Comparison thresholds
#[derive(Debug, Deserialize)]
pub struct ComparisonConfig {
    /// Largest tolerated throughput drop, in percent of the reference fps
    #[serde(default = "default_max_fps_drop")]
    pub max_fps_drop_percent: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            max_fps_drop_percent: default_max_fps_drop(),
        }
    }
}

fn default_max_fps_drop() -> f64 {
    5.0
}

/// Script discovery settings
#[derive(Debug, Deserialize)]
pub struct ScriptsConfig {
    /// File extension of test scripts, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
        }
    }
}

fn default_extension() -> String {
    "avs".to_string()
}

/// Run scheduling settings
#[derive(Debug, Deserialize, Default)]
pub struct RunConfig {
    /// Run the candidate and reference workers of one case at the same time
    #[serde(default)]
    pub concurrent_builds: bool,
}

impl Config {
    /// Load configuration from an explicit file, or the default config file
    ///
    /// Returns default configuration if no file exists. An explicit path that
    /// does not exist is an error.
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
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
