//! Performance harness for comparing custom widgets against native ones.
//!
//! A [`Monitor`] samples frame rate, memory and CPU while a widget renders
//! and calls [`Monitor::add_frame`]. Recorded metrics are summarized with
//! [`stats`], scored against a native baseline with [`compare`] and written
//! out with [`ReportExporter`].

pub mod alloc;
pub mod batch;
pub mod chart;
pub mod compare;
pub mod config;
pub mod error;
pub mod export;
pub mod fps;
pub mod metrics;
pub mod monitor;
pub mod probe;
pub mod stats;
pub mod workload;

pub use batch::{BatchCollector, BatchEntry, BatchReport};
pub use compare::{compare, Comparison};
pub use config::BenchConfig;
pub use error::{BenchError, Result};
pub use export::{read_metrics, ReportExporter, ReportPayload};
pub use fps::FpsCalculator;
pub use metrics::{Category, PerformanceMetric};
pub use monitor::Monitor;
pub use stats::{compute_stats, summarize_component, Stats, Summary};
