//! Benchmark configuration
//!
//! Every field has a default so a partial TOML file, or none at all, is valid.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use tracing as trc;

use crate::error::{BenchError, Result};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BenchConfig {
    /// Sampler tick in milliseconds
    pub sample_interval_ms: u64,
    /// Capacity of the FPS timestamp window
    pub fps_window: usize,
    /// Default length of one recording window in milliseconds
    pub recording_length_ms: u64,
    /// Time to let a workload settle before recording starts
    pub settle_ms: u64,
    /// Directory reports are written into
    pub output_dir: PathBuf,
    /// File name prefix for reports
    pub file_prefix: String,
    /// Report extension, `csv` or `tsv`
    pub extension: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            sample_interval_ms: 100,
            fps_window: 120,
            recording_length_ms: 5_000,
            settle_ms: 200,
            output_dir: PathBuf::from("./benchmark_results"),
            file_prefix: "benchmark".to_string(),
            extension: "csv".to_string(),
        }
    }
}

impl BenchConfig {
    /// Load a config from a TOML file
    #[trc::instrument(level = "debug")]
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn sample_interval(&self) -> Duration {
        // A zero interval would make the ticker spin
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn recording_length(&self) -> Duration {
        Duration::from_millis(self.recording_length_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}
