//! Synthetic widgets for driving the monitor without a GUI
//!
//! A [`SyntheticComponent`] stands in for a rendered widget: every frame it
//! allocates, keeps a few frames of data alive, burns some CPU and reports
//! the frame to the monitor. Frame pacing is jittered from a seeded RNG so
//! runs are repeatable.

use std::collections::VecDeque;
use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing as trc;

use crate::batch::BatchEntry;
use crate::compare::compare;
use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::metrics::{Category, PerformanceMetric};
use crate::monitor::Monitor;

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticComponent {
    pub name: String,
    pub category: Category,
    /// Frame rate the component paces itself to
    pub target_fps: f64,
    /// Random deviation of each frame interval, as a share of the interval
    pub jitter: f64,
    /// Bytes allocated every frame
    pub alloc_per_frame: usize,
    /// How many frames of allocations stay alive
    pub retained_frames: usize,
    /// Hashing rounds per frame
    pub busy_work: u32,
    pub seed: u64,
}

impl SyntheticComponent {
    pub fn new(name: &str, category: Category) -> Self {
        SyntheticComponent {
            name: name.to_string(),
            category,
            target_fps: 60.,
            jitter: 0.05,
            alloc_per_frame: 4 * 1024,
            retained_frames: 8,
            busy_work: 1_000,
            seed: 0,
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.target_fps = fps;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0., 1.);
        self
    }

    pub fn with_allocation(mut self, bytes_per_frame: usize, retained_frames: usize) -> Self {
        self.alloc_per_frame = bytes_per_frame;
        self.retained_frames = retained_frames;
        self
    }

    pub fn with_busy_work(mut self, rounds: u32) -> Self {
        self.busy_work = rounds;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn base_interval(&self) -> Duration {
        let fps = if self.target_fps.is_finite() && self.target_fps >= 1. {
            self.target_fps
        } else {
            1.
        };
        Duration::from_secs_f64(1. / fps)
    }

    fn next_interval(&self, rng: &mut StdRng) -> Duration {
        let base = self.base_interval();
        if self.jitter <= 0. {
            return base;
        }
        let factor = 1. + rng.gen_range(-self.jitter..=self.jitter);
        base.mul_f64(factor.max(0.))
    }

    /// The first `frames` frame intervals this component will use
    pub fn frame_schedule(&self, frames: usize) -> Vec<Duration> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..frames).map(|_| self.next_interval(&mut rng)).collect()
    }

    /// Render frames into the monitor until `deadline`. Returns the frame count.
    fn drive(&self, monitor: &Monitor, rng: &mut StdRng, deadline: Instant) -> u64 {
        let mut retained: VecDeque<Vec<u8>> = VecDeque::with_capacity(self.retained_frames + 1);
        let mut next_frame = Instant::now();
        let mut frames = 0;

        while Instant::now() < deadline {
            let mut buffer = vec![0u8; self.alloc_per_frame];
            rng.fill(&mut buffer[..]);
            retained.push_back(buffer);
            while retained.len() > self.retained_frames {
                retained.pop_front();
            }

            let mut hash = 0xcbf2_9ce4_8422_2325u64;
            for round in 0..self.busy_work {
                hash ^= u64::from(round);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            black_box(hash);

            monitor.add_frame();
            frames += 1;

            next_frame += self.next_interval(rng);
            let now = Instant::now();
            if next_frame > now {
                thread::sleep(next_frame.min(deadline).saturating_duration_since(now));
            } else {
                // Running behind, do not try to catch up
                next_frame = now;
            }
        }

        frames
    }
}

/// Run one monitored window over `component` and return its metrics
#[trc::instrument(skip(component, config), fields(component = %component.name, category = %component.category))]
pub fn measure_component(
    component: &SyntheticComponent,
    scenario: &str,
    duration: Duration,
    config: &BenchConfig,
) -> Result<Vec<PerformanceMetric>> {
    let monitor = Monitor::new(&format!("{}_{}", component.name, scenario), config);
    let mut rng = StdRng::seed_from_u64(component.seed);

    monitor.start()?;

    // Warm the frame window before recording
    let settle = config.settle();
    if !settle.is_zero() {
        component.drive(&monitor, &mut rng, Instant::now() + settle);
    }

    monitor.start_recording(&component.name, component.category, scenario)?;
    let frames = component.drive(&monitor, &mut rng, Instant::now() + duration);
    monitor.stop_recording();
    monitor.stop();

    let metrics = monitor.component_metrics(&component.name, component.category);
    trc::debug!(frames, samples = metrics.len(), "Measurement finished");
    if metrics.is_empty() {
        return Err(BenchError::EmptyInput {
            what: "measurement",
        });
    }
    Ok(metrics)
}

/// A custom widget and the native widget it is measured against
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentPair {
    pub test_name: String,
    pub scenario: String,
    pub custom: SyntheticComponent,
    pub native: SyntheticComponent,
}

/// Metrics of both sides of a pair and the resulting batch entry
#[derive(Clone, Debug)]
pub struct PairRun {
    pub custom: Vec<PerformanceMetric>,
    pub native: Vec<PerformanceMetric>,
    pub entry: BatchEntry,
}

impl ComponentPair {
    pub fn new(test_name: &str, scenario: &str, custom: SyntheticComponent, native: SyntheticComponent) -> Self {
        ComponentPair {
            test_name: test_name.to_string(),
            scenario: scenario.to_string(),
            custom,
            native,
        }
    }

    /// Measure the custom side, then the native side, and compare them
    #[trc::instrument(skip(self, config), fields(test = %self.test_name))]
    pub fn run(&self, duration: Duration, config: &BenchConfig) -> Result<PairRun> {
        let started = Local::now();
        let custom = measure_component(&self.custom, &self.scenario, duration, config)?;

        // Let the previous run's allocations and threads wind down
        thread::sleep(config.settle());

        let native = measure_component(&self.native, &self.scenario, duration, config)?;
        let comparison = compare(&custom, &native)?;
        trc::info!(score = comparison.score, "Comparison finished");

        let entry = BatchEntry {
            test_name: self.test_name.clone(),
            custom_component: self.custom.name.clone(),
            native_component: self.native.name.clone(),
            comparison,
            started,
            finished: Local::now(),
        };
        Ok(PairRun {
            custom,
            native,
            entry,
        })
    }
}

/// The widget pairs of the standard benchmark suite
pub fn presets() -> Vec<ComponentPair> {
    let native = |name: &str, seed| {
        SyntheticComponent::new(name, Category::Native)
            .with_allocation(2 * 1024, 4)
            .with_busy_work(2_000)
            .with_seed(seed)
    };
    let custom = |name: &str, seed| SyntheticComponent::new(name, Category::Custom).with_seed(seed);

    vec![
        ComponentPair::new(
            "particle_button",
            "click_animation",
            // Particles: many short-lived allocations
            custom("ParticleButton", 1)
                .with_allocation(64 * 1024, 30)
                .with_busy_work(40_000),
            native("Button", 2),
        ),
        ComponentPair::new(
            "material_entry",
            "input_animation",
            custom("MaterialEntry", 3)
                .with_allocation(8 * 1024, 12)
                .with_busy_work(8_000),
            native("Entry", 4),
        ),
        ComponentPair::new(
            "toggle_switch",
            "toggle_animation",
            custom("ToggleSwitch", 5)
                .with_allocation(4 * 1024, 8)
                .with_busy_work(5_000),
            native("Checkbox", 6),
        ),
        ComponentPair::new(
            "material_checkbox",
            "check_animation",
            custom("MaterialCheckbox", 7)
                .with_allocation(16 * 1024, 10)
                .with_busy_work(10_000),
            native("Checkbox", 8),
        ),
        ComponentPair::new(
            "step_tabs",
            "tab_switch",
            custom("StepTabs", 9)
                .with_allocation(32 * 1024, 16)
                .with_busy_work(20_000)
                .with_jitter(0.1),
            native("AppTabs", 10),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BenchConfig {
        BenchConfig {
            sample_interval_ms: 10,
            settle_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn schedule_is_seeded() {
        let a = SyntheticComponent::new("A", Category::Custom).with_seed(42).with_jitter(0.2);
        let b = a.clone();
        assert_eq!(a.frame_schedule(50), b.frame_schedule(50));
        assert_ne!(a.frame_schedule(50), a.clone().with_seed(43).frame_schedule(50));
    }

    #[test]
    fn schedule_stays_within_jitter() {
        let component = SyntheticComponent::new("A", Category::Custom)
            .with_fps(50.)
            .with_jitter(0.1);
        for interval in component.frame_schedule(200) {
            let ms = interval.as_secs_f64() * 1000.;
            assert!((18.0 - 1e-6..=22.0 + 1e-6).contains(&ms), "{}ms", ms);
        }

        let steady = component.with_jitter(0.);
        assert!(steady.frame_schedule(5).iter().all(|d| *d == Duration::from_millis(20)));
    }

    #[test]
    fn silly_frame_rates_are_bounded() {
        let component = SyntheticComponent::new("A", Category::Native).with_fps(0.).with_jitter(0.);
        assert_eq!(component.frame_schedule(1)[0], Duration::from_secs(1));
    }

    #[test]
    fn measurement_produces_labelled_metrics() {
        let component = SyntheticComponent::new("Probe", Category::Native)
            .with_fps(100.)
            .with_allocation(1024, 2)
            .with_busy_work(10);
        let metrics = measure_component(&component, "idle", Duration::from_millis(200), &fast_config()).unwrap();

        assert!(metrics.len() >= 2);
        assert!(metrics.iter().all(|m| m.component == "Probe"
            && m.category == Category::Native
            && m.scenario == "idle"
            && m.fps >= 0.1
            && (0.0..=100.0).contains(&m.cpu_percent)));
    }

    #[test]
    fn presets_cover_the_suite() {
        let presets = presets();
        let names: Vec<&str> = presets.iter().map(|p| p.custom.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["ParticleButton", "MaterialEntry", "ToggleSwitch", "MaterialCheckbox", "StepTabs"]
        );
        assert!(presets
            .iter()
            .all(|p| p.custom.category == Category::Custom && p.native.category == Category::Native));
    }
}
