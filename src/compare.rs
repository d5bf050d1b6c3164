//! Custom versus native comparison
//!
//! Both series are summarized independently, then the custom side is scored
//! against the native side. FPS is better when higher, memory and CPU when
//! lower. The significance check is a signal-to-noise heuristic, not a
//! statistical test.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::metrics::{Category, PerformanceMetric};
use crate::stats::{round_to, summarize_component, Stats, Summary};

const FPS_WEIGHT: f64 = 0.3;
const MEMORY_WEIGHT: f64 = 0.3;
const CPU_WEIGHT: f64 = 0.4;

const FPS_CV_PENALTY: f64 = 0.5;
const MEMORY_CV_PENALTY: f64 = 0.3;
const CPU_CV_PENALTY: f64 = 0.2;

/// Message shown in place of a conclusion when a comparison could not run
pub const INSUFFICIENT_DATA: &str = "Insufficient data: a conclusion needs samples from both components";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Bad,
}

impl Grade {
    /// Grade a metric where a higher value is better
    pub fn higher_is_better(diff_percent: f64) -> Self {
        if diff_percent >= 10. {
            Grade::Excellent
        } else if diff_percent >= 0. {
            Grade::Good
        } else if diff_percent >= -10. {
            Grade::Acceptable
        } else if diff_percent >= -30. {
            Grade::Poor
        } else {
            Grade::Bad
        }
    }

    /// Grade a metric where a lower value is better
    pub fn lower_is_better(diff_percent: f64) -> Self {
        if diff_percent <= -10. {
            Grade::Excellent
        } else if diff_percent <= 0. {
            Grade::Good
        } else if diff_percent <= 20. {
            Grade::Acceptable
        } else if diff_percent <= 50. {
            Grade::Poor
        } else {
            Grade::Bad
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Excellent => "excellent",
            Grade::Good => "good",
            Grade::Acceptable => "acceptable",
            Grade::Poor => "poor",
            Grade::Bad => "bad",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Confidence from how many coefficients of variation the delta spans
    pub fn from_delta(abs_diff_percent: f64, cv: f64) -> Self {
        if cv == 0. {
            return Confidence::High;
        }

        let ratio = abs_diff_percent / cv;
        if ratio >= 3. {
            Confidence::VeryHigh
        } else if ratio >= 2. {
            Confidence::High
        } else if ratio >= 1. {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::VeryHigh => "very high",
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the custom side differs from the native side on one metric
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct MetricDelta {
    /// custom / native, 3 decimals
    pub ratio: f64,
    /// (custom - native) / native * 100, 2 decimals
    pub diff_percent: f64,
    pub significant: bool,
    pub confidence: Confidence,
    pub grade: Grade,
}

/// Unrounded ratio and delta, used for scoring before display rounding
#[derive(Clone, Copy, Debug)]
struct RawDelta {
    ratio: f64,
    diff_percent: f64,
}

impl RawDelta {
    fn between(metric: &'static str, custom: f64, native: f64) -> Result<Self> {
        if native == 0. {
            if custom == 0. {
                return Ok(RawDelta {
                    ratio: 1.,
                    diff_percent: 0.,
                });
            }
            return Err(BenchError::DegenerateRatio { metric });
        }

        Ok(RawDelta {
            ratio: custom / native,
            diff_percent: (custom - native) / native * 100.,
        })
    }

    fn finish(self, custom: &Stats, grade: Grade) -> MetricDelta {
        let abs_diff = self.diff_percent.abs();
        MetricDelta {
            ratio: round_to(self.ratio, 3),
            diff_percent: round_to(self.diff_percent, 2),
            significant: abs_diff > custom.cv * 2.,
            confidence: Confidence::from_delta(abs_diff, custom.cv),
            grade,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comparison {
    pub custom: Summary,
    pub native: Summary,
    pub fps: MetricDelta,
    pub memory: MetricDelta,
    pub cpu: MetricDelta,
    /// Composite score in `0..=100`, 1 decimal
    pub score: f64,
    pub conclusion: String,
}

pub fn compare(custom: &[PerformanceMetric], native: &[PerformanceMetric]) -> Result<Comparison> {
    if custom.is_empty() {
        return Err(BenchError::EmptyInput {
            what: "custom component",
        });
    }
    if native.is_empty() {
        return Err(BenchError::EmptyInput {
            what: "native component",
        });
    }

    let custom = summarize_component(custom, Category::Custom)?;
    let native = summarize_component(native, Category::Native)?;

    let fps = RawDelta::between("fps", custom.fps.avg, native.fps.avg)?;
    let memory = RawDelta::between("memory", custom.memory.avg, native.memory.avg)?;
    let cpu = RawDelta::between("cpu", custom.cpu.avg, native.cpu.avg)?;

    let score = performance_score(
        fps.ratio,
        memory.ratio,
        cpu.ratio,
        &custom.fps,
        &custom.memory,
        &custom.cpu,
    );

    let fps = fps.finish(&custom.fps, Grade::higher_is_better(fps.diff_percent));
    let memory = memory.finish(&custom.memory, Grade::lower_is_better(memory.diff_percent));
    let cpu = cpu.finish(&custom.cpu, Grade::lower_is_better(cpu.diff_percent));

    let conclusion = conclude(score, &fps, &memory, &cpu);

    Ok(Comparison {
        custom,
        native,
        fps,
        memory,
        cpu,
        score,
        conclusion,
    })
}

/// Weighted blend of the sub-scores minus a penalty for noisy custom samples
pub fn performance_score(
    fps_ratio: f64,
    memory_ratio: f64,
    cpu_ratio: f64,
    fps: &Stats,
    memory: &Stats,
    cpu: &Stats,
) -> f64 {
    let fps_score = if fps_ratio >= 1. { 100. } else { fps_ratio * 100. };
    let memory_score = lower_is_better_score(memory_ratio);
    let cpu_score = lower_is_better_score(cpu_ratio);

    let stability_penalty =
        fps.cv * FPS_CV_PENALTY + memory.cv * MEMORY_CV_PENALTY + cpu.cv * CPU_CV_PENALTY;

    let total = fps_score * FPS_WEIGHT + memory_score * MEMORY_WEIGHT + cpu_score * CPU_WEIGHT
        - stability_penalty;

    round_to(total.clamp(0., 100.), 1)
}

fn lower_is_better_score(ratio: f64) -> f64 {
    if ratio <= 1. {
        100.
    } else {
        100. / ratio
    }
}

fn conclude(score: f64, fps: &MetricDelta, memory: &MetricDelta, cpu: &MetricDelta) -> String {
    if score >= 90. {
        format!(
            "Excellent ({:.1}). The custom component matches or beats the native one while keeping its visual effects.",
            score
        )
    } else if score >= 80. {
        format!(
            "Good ({:.1}). Overhead is acceptable. FPS: {}, memory: {}, CPU: {}.",
            score, fps.grade, memory.grade, cpu.grade
        )
    } else if score >= 70. {
        format!(
            "Fair ({:.1}). Noticeable overhead, optimization advised. FPS diff: {:.1}%, memory overhead: {:.1}%, CPU overhead: {:.1}%.",
            score, fps.diff_percent, memory.diff_percent, cpu.diff_percent
        )
    } else {
        format!(
            "Poor ({:.1}). Heavy overhead, needs focused optimization. FPS: {}, memory: {}, CPU: {}.",
            score, fps.grade, memory.grade, cpu.grade
        )
    }
}

/// Conclusion for a comparison outcome, or the insufficient data message
pub fn describe_outcome(outcome: &Result<Comparison>) -> String {
    match outcome {
        Ok(comparison) => comparison.conclusion.clone(),
        Err(BenchError::EmptyInput { .. }) => INSUFFICIENT_DATA.to_string(),
        Err(e) => format!("{}: {}", INSUFFICIENT_DATA, e),
    }
}

impl Comparison {
    /// Multi-line console rendering
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "========== Performance comparison ==========")?;
        for summary in [&self.custom, &self.native] {
            writeln!(out)?;
            writeln!(out, "{} component ({} samples)", summary.category, summary.sample_count)?;
            writeln!(
                out,
                "  FPS:    {:.1} ({:.1}-{:.1}) σ={:.2} CV={:.1}%",
                summary.fps.avg, summary.fps.min, summary.fps.max, summary.fps.std_dev, summary.fps.cv
            )?;
            writeln!(
                out,
                "  Memory: {:.2}MB ({:.2}-{:.2}) σ={:.2} CV={:.1}%",
                summary.memory.avg,
                summary.memory.min,
                summary.memory.max,
                summary.memory.std_dev,
                summary.memory.cv
            )?;
            writeln!(
                out,
                "  CPU:    {:.1}% ({:.1}-{:.1}) σ={:.2} CV={:.1}%",
                summary.cpu.avg, summary.cpu.min, summary.cpu.max, summary.cpu.std_dev, summary.cpu.cv
            )?;
        }

        writeln!(out)?;
        for (name, delta) in [("FPS", &self.fps), ("Memory", &self.memory), ("CPU", &self.cpu)] {
            writeln!(
                out,
                "{:<7} ratio {:.3} ({:+.1}%) {} | significant: {} (confidence {})",
                name, delta.ratio, delta.diff_percent, delta.grade, delta.significant, delta.confidence
            )?;
        }

        writeln!(out)?;
        writeln!(out, "Score: {:.1}/100", self.score)?;
        writeln!(out, "Conclusion: {}", self.conclusion)
    }
}
