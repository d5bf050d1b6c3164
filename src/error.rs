use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors surfaced by the benchmarking core
#[derive(Error, Debug)]
pub enum BenchError {
    /// A statistic or comparison was requested over zero samples
    #[error("insufficient data: no samples for {what}")]
    EmptyInput { what: &'static str },

    /// The native side of a ratio averaged exactly zero
    #[error("cannot compare {metric}: native average is zero")]
    DegenerateRatio { metric: &'static str },

    /// The monitor must be running for this operation
    #[error("monitor is not running")]
    NotRunning,

    /// The sampler thread could not be spawned
    #[error("could not start sampler thread")]
    Sampler(#[source] std::io::Error),

    /// A report file could not be created, written or read
    #[error("report I/O failed for `{}`", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A report row could not be parsed back into a metric
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// The TOML configuration was invalid
    #[error("invalid configuration")]
    Config(#[from] toml::de::Error),

    /// The chart backend failed
    #[error("could not draw chart: {0}")]
    Chart(String),
}

impl BenchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.into(),
            source,
        }
    }
}
