//! Summary statistics over metric series
//!
//! Everything here is a pure function of its input. All figures are rounded
//! to two decimals so repeated runs print identically.

use std::time::Duration;

use criterion_stats::univariate::Sample;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};
use crate::metrics::{Category, PerformanceMetric, SystemInfo};

/// Percentile used for the "low" frame rate
const FPS_LOW_PERCENTILE: f64 = 5.0;

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Mean, spread and coefficient of variation of one series
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Stats {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// `std_dev / avg * 100`, zero when the mean is zero
    pub cv: f64,
}

pub fn compute_stats(values: &[f64]) -> Result<Stats> {
    if values.is_empty() {
        return Err(BenchError::EmptyInput { what: "statistics" });
    }

    let n = values.len() as f64;
    let (sum, min, max) = values.iter().fold(
        (0., f64::INFINITY, f64::NEG_INFINITY),
        |(sum, min, max), &v| (sum + v, min.min(v), max.max(v)),
    );
    let avg = sum / n;

    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let cv = if avg != 0. { std_dev / avg * 100. } else { 0. };

    Ok(Stats {
        avg: round_to(avg, 2),
        min: round_to(min, 2),
        max: round_to(max, 2),
        std_dev: round_to(std_dev, 2),
        cv: round_to(cv, 2),
    })
}

/// Per-component summary used by comparisons
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Summary {
    pub category: Category,
    pub sample_count: usize,
    pub fps: Stats,
    pub memory: Stats,
    pub cpu: Stats,
    pub render_time_avg: f64,
    /// 5th percentile FPS, needs at least two samples
    pub fps_low: Option<f64>,
}

pub fn summarize_component(metrics: &[PerformanceMetric], category: Category) -> Result<Summary> {
    if metrics.is_empty() {
        return Err(BenchError::EmptyInput {
            what: "component summary",
        });
    }

    let fps: Vec<f64> = metrics.iter().map(|m| m.fps).collect();
    let memory: Vec<f64> = metrics.iter().map(|m| m.memory_used_mb).collect();
    let cpu: Vec<f64> = metrics.iter().map(|m| m.cpu_percent).collect();
    let render_total: f64 = metrics.iter().map(|m| m.render_time_ms).sum();

    Ok(Summary {
        category,
        sample_count: metrics.len(),
        fps: compute_stats(&fps)?,
        memory: compute_stats(&memory)?,
        cpu: compute_stats(&cpu)?,
        render_time_avg: round_to(render_total / metrics.len() as f64, 2),
        fps_low: low_percentile(&fps),
    })
}

fn low_percentile(values: &[f64]) -> Option<f64> {
    // `Sample` rejects fewer than two points and NaNs
    if values.len() < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let percentiles = Sample::new(values).percentiles();
    Some(round_to(percentiles.at(FPS_LOW_PERCENTILE), 2))
}

/// Whole-session summary as reported by the monitor
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionSummary {
    pub test_name: String,
    pub component: String,
    pub category: Category,
    pub scenario: String,
    pub fps: Stats,
    pub memory: Stats,
    pub cpu: Stats,
    pub total_samples: usize,
    pub duration_secs: f64,
    pub total_frames: u64,
    pub system: SystemInfo,
}

/// Summarize a session; labels come from its most recent sample
pub fn summarize_session(
    test_name: &str,
    metrics: &[PerformanceMetric],
    duration: Duration,
    total_frames: u64,
) -> Result<SessionSummary> {
    let last = metrics.last().ok_or(BenchError::EmptyInput {
        what: "session summary",
    })?;
    let summary = summarize_component(metrics, last.category)?;

    Ok(SessionSummary {
        test_name: test_name.to_string(),
        component: last.component.clone(),
        category: last.category,
        scenario: last.scenario.clone(),
        fps: summary.fps,
        memory: summary.memory,
        cpu: summary.cpu,
        total_samples: metrics.len(),
        duration_secs: round_to(duration.as_secs_f64(), 1),
        total_frames,
        system: SystemInfo::current(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn metric(fps: f64, memory: f64, cpu: f64) -> PerformanceMetric {
        let mut metric = PerformanceMetric::new("Widget", Category::Custom, "static_render");
        metric.set_fps(fps);
        metric.memory_used_mb = memory;
        metric.set_cpu_percent(cpu);
        metric
    }

    #[test]
    fn ten_twenty_thirty() {
        let stats = compute_stats(&[10., 20., 30.]).unwrap();
        assert_eq!(stats.avg, 20.);
        assert_eq!(stats.min, 10.);
        assert_eq!(stats.max, 30.);
        assert_eq!(stats.std_dev, 8.16);
        assert_eq!(stats.cv, 40.82);
    }

    #[test]
    fn constant_series_has_zero_cv() {
        let stats = compute_stats(&[5., 5., 5.]).unwrap();
        assert_eq!(stats.std_dev, 0.);
        assert_eq!(stats.cv, 0.);
        assert!(!stats.cv.is_nan());
    }

    #[test]
    fn zero_mean_has_zero_cv() {
        let stats = compute_stats(&[-1., 1.]).unwrap();
        assert_eq!(stats.avg, 0.);
        assert_eq!(stats.cv, 0.);
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(
            compute_stats(&[]),
            Err(BenchError::EmptyInput { .. })
        ));
        assert!(matches!(
            summarize_component(&[], Category::Custom),
            Err(BenchError::EmptyInput { .. })
        ));
        assert!(summarize_session("t", &[], Duration::from_secs(1), 0).is_err());
    }

    #[test]
    fn summary_splits_series() {
        let metrics = vec![metric(60., 10., 4.), metric(50., 12., 6.), metric(40., 14., 8.)];
        let summary = summarize_component(&metrics, Category::Native).unwrap();

        assert_eq!(summary.category, Category::Native);
        assert_eq!(summary.sample_count, 3);
        assert_eq!(summary.fps.avg, 50.);
        assert_eq!(summary.memory.avg, 12.);
        assert_eq!(summary.cpu.avg, 6.);
        // 1000/60, 1000/50, 1000/40
        assert_eq!(summary.render_time_avg, 20.56);
        let low = summary.fps_low.unwrap();
        assert!(low >= 40. && low <= 50.);
    }

    #[test]
    fn single_sample_has_no_low_percentile() {
        let summary = summarize_component(&[metric(60., 1., 1.)], Category::Custom).unwrap();
        assert_eq!(summary.fps_low, None);
        assert_eq!(summary.fps.std_dev, 0.);
    }

    #[test]
    fn session_summary_takes_latest_labels() {
        let mut metrics = vec![metric(60., 10., 4.)];
        let mut last = metric(58., 11., 5.);
        last.component = "ToggleSwitch".into();
        last.scenario = "toggle_animation".into();
        metrics.push(last);

        let summary = summarize_session("toggle", &metrics, Duration::from_millis(2_340), 140).unwrap();
        assert_eq!(summary.component, "ToggleSwitch");
        assert_eq!(summary.scenario, "toggle_animation");
        assert_eq!(summary.total_samples, 2);
        assert_eq!(summary.duration_secs, 2.3);
        assert_eq!(summary.total_frames, 140);
    }

    proptest! {
        #[test]
        fn bounds_hold(values in prop::collection::vec(0.0f64..1_000.0, 1..200)) {
            let stats = compute_stats(&values).unwrap();
            prop_assert!(stats.min <= stats.avg + 0.01);
            prop_assert!(stats.avg <= stats.max + 0.01);
            prop_assert!(stats.std_dev >= 0.);
            prop_assert!(stats.cv >= 0.);
        }
    }
}
