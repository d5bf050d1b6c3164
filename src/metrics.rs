use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Lowest FPS value ever recorded, keeps ratio math defined
pub const MIN_FPS: f64 = 0.1;

/// Render time reported when no frame rate is known (one 60 Hz frame)
pub const FALLBACK_RENDER_TIME_MS: f64 = 16.67;

/// Update time is approximated as this share of the render time. It is not measured.
pub const UPDATE_TIME_RATIO: f64 = 0.3;

/// Which side of a comparison a component belongs to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Custom,
    Native,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Custom => "custom",
            Category::Native => "native",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "custom" => Ok(Category::Custom),
            "native" => Ok(Category::Native),
            other => Err(format!("unknown component category `{}`", other)),
        }
    }
}

/// One sample captured by the monitor
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PerformanceMetric {
    pub timestamp: DateTime<Local>,
    pub component: String,
    pub category: Category,
    pub scenario: String,

    pub fps: f64,
    pub memory_used_mb: f64,
    /// Cumulative, never decreases within a session
    pub memory_allocated_mb: f64,
    /// Collector runs, or allocator reclaims when the host has no collector
    pub gc_count: u32,
    /// Cumulative pause time
    pub gc_time_ms: f64,
    /// Always within `0..=100`
    pub cpu_percent: f64,
    pub render_time_ms: f64,
    pub update_time_ms: f64,

    pub workers: usize,
    pub cores: usize,
}

impl PerformanceMetric {
    /// Start a metric with its labels; measurements are filled in by the caller
    pub fn new(component: &str, category: Category, scenario: &str) -> Self {
        PerformanceMetric {
            timestamp: Local::now(),
            component: component.to_string(),
            category,
            scenario: scenario.to_string(),
            fps: MIN_FPS,
            memory_used_mb: 0.,
            memory_allocated_mb: 0.,
            gc_count: 0,
            gc_time_ms: 0.,
            cpu_percent: 0.,
            render_time_ms: FALLBACK_RENDER_TIME_MS,
            update_time_ms: FALLBACK_RENDER_TIME_MS * UPDATE_TIME_RATIO,
            workers: 0,
            cores: 0,
        }
    }

    /// Set the frame rate and the timings derived from it
    pub fn set_fps(&mut self, fps: f64) {
        let fps = if fps.is_finite() { fps.max(MIN_FPS) } else { MIN_FPS };
        self.fps = fps;
        self.render_time_ms = if fps > 0. {
            1000. / fps
        } else {
            FALLBACK_RENDER_TIME_MS
        };
        self.update_time_ms = self.render_time_ms * UPDATE_TIME_RATIO;
    }

    pub fn set_cpu_percent(&mut self, percent: f64) {
        self.cpu_percent = if percent.is_finite() {
            percent.clamp(0., 100.)
        } else {
            0.
        };
    }
}

/// Host description written at the bottom of reports
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SystemInfo {
    pub crate_version: String,
    pub os: String,
    pub arch: String,
    pub cores: usize,
}

impl SystemInfo {
    pub fn current() -> Self {
        SystemInfo {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cores: logical_cores(),
        }
    }
}

pub fn logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
