//! Sampling monitor
//!
//! A monitor is `Stopped` or `Running`. While running, a sampler thread
//! ticks at the configured interval and captures one [`PerformanceMetric`]
//! per tick, but only inside a recording window opened by
//! [`Monitor::start_recording`]. Opening and closing a window each capture a
//! sample immediately so the window is bounded even if no tick fired.
//!
//! All session state sits behind one reader/writer lock. Rendering threads
//! call [`Monitor::add_frame`] at any rate.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use crossbeam_channel::{select, Sender};
use parking_lot::{Mutex, RwLock};
use tracing as trc;

use crate::config::BenchConfig;
use crate::error::{BenchError, Result};
use crate::fps::FpsCalculator;
use crate::metrics::{logical_cores, Category, PerformanceMetric};
use crate::probe::{estimate_cpu_percent, HeapSnapshot, ProcessProbe, RuntimeProbe};
use crate::stats::{summarize_session, SessionSummary};

const BYTES_PER_MB: f64 = 1024. * 1024.;

/// Minimum recording time before the frame counter is trusted as an FPS source
const MIN_FALLBACK_ELAPSED: Duration = Duration::from_millis(100);

pub struct Monitor {
    test_name: String,
    interval: Duration,
    state: Arc<RwLock<State>>,
    fps: Arc<FpsCalculator>,
    sampler: Mutex<Option<Sampler>>,
}

struct Sampler {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

struct State {
    probe: Box<dyn RuntimeProbe>,
    session: Session,
    interval: Duration,
    last_heap: HeapSnapshot,
    last_cpu: Option<f64>,
    warned_cpu: bool,
}

struct Session {
    recording_started: Instant,
    component: String,
    category: Category,
    scenario: String,
    recording: bool,
    metrics: Vec<PerformanceMetric>,
    total_frames: u64,
}

impl Session {
    fn new() -> Self {
        Session {
            recording_started: Instant::now(),
            component: String::new(),
            category: Category::Custom,
            scenario: String::new(),
            recording: false,
            metrics: Vec::new(),
            total_frames: 0,
        }
    }

    /// Append keeping timestamps strictly increasing
    fn push(&mut self, mut metric: PerformanceMetric) {
        if let Some(last) = self.metrics.last() {
            if metric.timestamp <= last.timestamp {
                metric.timestamp = next_instant(last.timestamp);
            }
        }
        self.metrics.push(metric);
    }
}

fn next_instant(after: DateTime<Local>) -> DateTime<Local> {
    after + chrono::Duration::nanoseconds(1)
}

impl State {
    fn capture(&mut self, fps: &FpsCalculator) {
        let now = Instant::now();
        let session = &self.session;
        let mut metric =
            PerformanceMetric::new(&session.component, session.category, &session.scenario);

        let heap = self.probe.heap();
        metric.memory_used_mb = heap.in_use_bytes as f64 / BYTES_PER_MB;
        metric.memory_allocated_mb = heap.allocated_bytes as f64 / BYTES_PER_MB;
        metric.gc_count = heap.collections;
        metric.gc_time_ms = heap.pause_total.as_secs_f64() * 1000.;

        let mut current_fps = fps.current_fps();
        if fps.sample_count() < 2 && session.total_frames > 0 {
            let elapsed = now.saturating_duration_since(session.recording_started);
            if elapsed > MIN_FALLBACK_ELAPSED {
                current_fps = session.total_frames as f64 / elapsed.as_secs_f64();
            }
        }
        metric.set_fps(current_fps);

        let cpu = match self.probe.cpu_percent() {
            Ok(percent) => {
                self.last_cpu = Some(percent);
                percent
            }
            Err(e) => match self.last_cpu {
                Some(percent) => {
                    trc::debug!("CPU probe failed, reusing last value: {}", e);
                    percent
                }
                None => {
                    if !self.warned_cpu {
                        trc::warn!("CPU probe unavailable, estimating from pause time: {}", e);
                        self.warned_cpu = true;
                    }
                    let pause_delta = heap.pause_total.saturating_sub(self.last_heap.pause_total);
                    estimate_cpu_percent(pause_delta, self.interval)
                }
            },
        };
        metric.set_cpu_percent(cpu);

        metric.workers = self.probe.workers();
        metric.cores = logical_cores();
        self.last_heap = heap;

        trc::trace!(
            component = %metric.component,
            fps = metric.fps,
            cpu = metric.cpu_percent,
            "Captured sample"
        );
        self.session.push(metric);
    }
}

impl Monitor {
    /// Monitor the current process
    pub fn new(test_name: &str, config: &BenchConfig) -> Self {
        Self::with_probe(test_name, config, Box::new(ProcessProbe::new()))
    }

    pub fn with_probe(test_name: &str, config: &BenchConfig, probe: Box<dyn RuntimeProbe>) -> Self {
        let interval = config.sample_interval();
        Monitor {
            test_name: test_name.to_string(),
            interval,
            state: Arc::new(RwLock::new(State {
                probe,
                session: Session::new(),
                interval,
                last_heap: HeapSnapshot::default(),
                last_cpu: None,
                warned_cpu: false,
            })),
            fps: Arc::new(FpsCalculator::new(config.fps_window)),
            sampler: Mutex::new(None),
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn is_running(&self) -> bool {
        self.sampler.lock().is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.state.read().session.recording
    }

    /// Start sampling. Does nothing if already running.
    pub fn start(&self) -> Result<()> {
        let mut sampler = self.sampler.lock();
        if sampler.is_some() {
            return Ok(());
        }

        {
            let mut state = self.state.write();
            state.session = Session::new();
            let baseline = state.probe.heap();
            state.last_heap = baseline;
            state.last_cpu = state.probe.cpu_percent().ok();
        }
        self.fps.reset();

        let (stop, stop_signal) = crossbeam_channel::bounded::<()>(0);
        let ticker = crossbeam_channel::tick(self.interval);
        let state = self.state.clone();
        let fps = self.fps.clone();

        let handle = thread::Builder::new()
            .name(format!("sampler-{}", self.test_name))
            .spawn(move || loop {
                select! {
                    recv(ticker) -> _ => {
                        let mut state = state.write();
                        if state.session.recording {
                            state.capture(&fps);
                        }
                    }
                    recv(stop_signal) -> _ => break,
                }
            })
            .map_err(BenchError::Sampler)?;

        *sampler = Some(Sampler { stop, handle });
        trc::info!(test = %self.test_name, interval = ?self.interval, "Monitor started");
        Ok(())
    }

    /// Open a recording window and capture its first sample
    pub fn start_recording(&self, component: &str, category: Category, scenario: &str) -> Result<()> {
        if !self.is_running() {
            return Err(BenchError::NotRunning);
        }

        let mut state = self.state.write();
        let session = &mut state.session;
        session.component = component.to_string();
        session.category = category;
        session.scenario = scenario.to_string();
        session.recording = true;
        session.total_frames = 0;
        session.recording_started = Instant::now();

        state.capture(&self.fps);
        trc::info!(component, %category, scenario, "Recording started");
        Ok(())
    }

    /// Capture a closing sample and leave the recording window
    pub fn stop_recording(&self) {
        let mut state = self.state.write();
        if !state.session.recording {
            trc::debug!("stop_recording called without an open recording");
            return;
        }

        state.capture(&self.fps);
        state.session.recording = false;
        trc::info!(
            component = %state.session.component,
            samples = state.session.metrics.len(),
            "Recording stopped"
        );
    }

    /// Stop sampling. Blocks until the sampler thread has exited.
    pub fn stop(&self) {
        let sampler = self.sampler.lock().take();
        let Some(sampler) = sampler else {
            return;
        };

        // Rendezvous: returns once the sampler has taken the signal
        if sampler.stop.send(()).is_err() {
            trc::warn!("Sampler exited before it was asked to stop");
        }
        if sampler.handle.join().is_err() {
            trc::error!("Sampler thread panicked");
        }

        self.stop_recording();
        trc::info!(test = %self.test_name, "Monitor stopped");
    }

    /// Count one rendered frame
    pub fn add_frame(&self) {
        self.state.write().session.total_frames += 1;
        self.fps.record_frame();
    }

    pub fn total_frames(&self) -> u64 {
        self.state.read().session.total_frames
    }

    pub fn current_fps(&self) -> f64 {
        self.fps.current_fps()
    }

    /// Copy of every metric recorded since the last start or reset
    pub fn metrics(&self) -> Vec<PerformanceMetric> {
        self.state.read().session.metrics.clone()
    }

    pub fn metrics_for_component(&self, component: &str) -> Vec<PerformanceMetric> {
        self.filtered(|m| m.component == component)
    }

    pub fn metrics_by_category(&self, category: Category) -> Vec<PerformanceMetric> {
        self.filtered(|m| m.category == category)
    }

    pub fn component_metrics(&self, component: &str, category: Category) -> Vec<PerformanceMetric> {
        self.filtered(|m| m.component == component && m.category == category)
    }

    fn filtered(&self, keep: impl Fn(&PerformanceMetric) -> bool) -> Vec<PerformanceMetric> {
        self.state
            .read()
            .session
            .metrics
            .iter()
            .filter(|m| keep(m))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> Result<SessionSummary> {
        let state = self.state.read();
        let session = &state.session;
        summarize_session(
            &self.test_name,
            &session.metrics,
            session.recording_started.elapsed(),
            session.total_frames,
        )
    }

    /// Drop recorded metrics and counters without changing the running state
    pub fn reset(&self) {
        {
            let mut state = self.state.write();
            let session = &mut state.session;
            session.metrics.clear();
            session.total_frames = 0;
            session.recording_started = Instant::now();
        }
        self.fps.reset();
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeError;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Probe returning scripted values. Each heap read advances pause time.
    struct FakeProbe {
        reads: Arc<AtomicU64>,
        pause_step: Duration,
        cpu: Vec<Option<f64>>,
    }

    impl FakeProbe {
        fn steady(cpu: f64) -> Self {
            FakeProbe {
                reads: Arc::new(AtomicU64::new(0)),
                pause_step: Duration::ZERO,
                cpu: vec![Some(cpu)],
            }
        }
    }

    impl RuntimeProbe for FakeProbe {
        fn heap(&mut self) -> HeapSnapshot {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            HeapSnapshot {
                in_use_bytes: 8 * 1024 * 1024,
                allocated_bytes: n * 1024 * 1024,
                collections: n as u32,
                pause_total: self.pause_step * n as u32,
            }
        }

        fn cpu_percent(&mut self) -> std::result::Result<f64, ProbeError> {
            let next = if self.cpu.len() > 1 {
                self.cpu.remove(0)
            } else {
                self.cpu[0]
            };
            next.ok_or_else(|| ProbeError::Unavailable("scripted".into()))
        }

        fn workers(&mut self) -> usize {
            3
        }
    }

    fn config(interval_ms: u64) -> BenchConfig {
        BenchConfig {
            sample_interval_ms: interval_ms,
            ..Default::default()
        }
    }

    fn monitor(interval_ms: u64, probe: FakeProbe) -> Monitor {
        Monitor::with_probe("test", &config(interval_ms), Box::new(probe))
    }

    #[test]
    fn recording_without_ticks_is_bounded_by_two_samples() {
        let monitor = monitor(60_000, FakeProbe::steady(12.));
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();
        monitor.stop();

        let metrics = monitor.metrics();
        assert_eq!(metrics.len(), 2);
        assert!(metrics.iter().all(|m| m.component == "A" && m.scenario == "s"));
        assert!(metrics[0].timestamp < metrics[1].timestamp);
        assert_eq!(metrics[0].cpu_percent, 12.);
        assert_eq!(metrics[0].workers, 3);
        assert_eq!(metrics[0].memory_used_mb, 8.);
        assert!(!monitor.is_recording());
    }

    #[test]
    fn recording_requires_running() {
        let monitor = monitor(100, FakeProbe::steady(1.));
        let err = monitor.start_recording("A", Category::Custom, "s").unwrap_err();
        assert!(matches!(err, BenchError::NotRunning));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let monitor = monitor(100, FakeProbe::steady(1.));
        monitor.stop();
        monitor.start().unwrap();
        monitor.start().unwrap();
        assert!(monitor.is_running());
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn ticks_only_sample_while_recording() {
        let monitor = monitor(5, FakeProbe::steady(1.));
        monitor.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(monitor.metrics().is_empty());

        monitor.start_recording("A", Category::Native, "idle").unwrap();
        thread::sleep(Duration::from_millis(100));
        monitor.stop_recording();
        let recorded = monitor.metrics().len();
        assert!(recorded > 3, "only {} samples", recorded);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(monitor.metrics().len(), recorded);
        monitor.stop();
    }

    #[test]
    fn nothing_is_sampled_after_stop() {
        let monitor = monitor(2, FakeProbe::steady(1.));
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();
        thread::sleep(Duration::from_millis(30));
        monitor.stop();

        let count = monitor.metrics().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(monitor.metrics().len(), count);

        let metrics = monitor.metrics();
        assert!(metrics.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(metrics
            .windows(2)
            .all(|w| w[0].memory_allocated_mb <= w[1].memory_allocated_mb));
    }

    #[test]
    fn restart_clears_previous_session() {
        let monitor = monitor(60_000, FakeProbe::steady(1.));
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();
        monitor.stop();
        assert_eq!(monitor.metrics().len(), 2);

        monitor.start().unwrap();
        assert!(monitor.metrics().is_empty());
        monitor.stop();
    }

    #[test]
    fn cpu_falls_back_to_pause_estimate() {
        let probe = FakeProbe {
            reads: Arc::new(AtomicU64::new(0)),
            pause_step: Duration::from_millis(5),
            cpu: vec![None],
        };
        let monitor = monitor(100, probe);
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();

        // 5ms of pause over a 100ms interval
        let first = monitor.metrics()[0].clone();
        assert!((first.cpu_percent - 50.).abs() < 1e-6, "cpu was {}", first.cpu_percent);
        assert!((first.gc_time_ms - 10.).abs() < 1e-6);
        assert_eq!(first.gc_count, 2);
        monitor.stop();
    }

    #[test]
    fn cpu_reuses_last_good_value() {
        let probe = FakeProbe {
            reads: Arc::new(AtomicU64::new(0)),
            pause_step: Duration::ZERO,
            cpu: vec![Some(30.), Some(40.), None],
        };
        let monitor = monitor(60_000, probe);
        // start reads 30, recording reads 40, stop gets an error
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();
        monitor.stop();

        let cpu: Vec<f64> = monitor.metrics().iter().map(|m| m.cpu_percent).collect();
        assert_eq!(cpu, vec![40., 40.]);
    }

    #[test]
    fn cpu_is_clamped() {
        let monitor = monitor(60_000, FakeProbe::steady(180.));
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();
        monitor.stop();
        assert!(monitor.metrics().iter().all(|m| m.cpu_percent == 100.));
    }

    #[test]
    fn frame_counter_backs_up_an_empty_window() {
        let monitor = monitor(60_000, FakeProbe::steady(1.));
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();
        monitor.add_frame();
        thread::sleep(Duration::from_millis(150));
        monitor.stop_recording();

        let last = monitor.metrics().pop().unwrap();
        // One frame in roughly 150ms
        assert!(last.fps > 0.1 && last.fps < 10., "fps was {}", last.fps);
        assert_eq!(monitor.total_frames(), 1);
        monitor.stop();
    }

    #[test]
    fn accessors_filter_and_copy() {
        let monitor = monitor(60_000, FakeProbe::steady(1.));
        monitor.start().unwrap();
        monitor.start_recording("Particle", Category::Custom, "click").unwrap();
        monitor.stop_recording();
        monitor.start_recording("Button", Category::Native, "click").unwrap();
        monitor.stop_recording();
        monitor.stop();

        assert_eq!(monitor.metrics().len(), 4);
        assert_eq!(monitor.metrics_for_component("Particle").len(), 2);
        assert_eq!(monitor.metrics_by_category(Category::Native).len(), 2);
        assert_eq!(monitor.component_metrics("Button", Category::Custom).len(), 0);

        let mut copy = monitor.metrics();
        copy.clear();
        assert_eq!(monitor.metrics().len(), 4);
    }

    #[test]
    fn summary_and_reset() {
        let monitor = monitor(60_000, FakeProbe::steady(1.));
        assert!(matches!(monitor.summary(), Err(BenchError::EmptyInput { .. })));

        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();
        for _ in 0..5 {
            monitor.add_frame();
        }
        monitor.stop();

        let summary = monitor.summary().unwrap();
        assert_eq!(summary.total_samples, 2);
        assert_eq!(summary.total_frames, 5);
        assert_eq!(summary.component, "A");

        monitor.reset();
        assert!(monitor.metrics().is_empty());
        assert_eq!(monitor.total_frames(), 0);
    }

    #[test]
    fn frames_from_many_threads() {
        let monitor = Arc::new(monitor(1, FakeProbe::steady(1.)));
        monitor.start().unwrap();
        monitor.start_recording("A", Category::Custom, "s").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let monitor = monitor.clone();
                thread::spawn(move || {
                    for _ in 0..250 {
                        monitor.add_frame();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(monitor.total_frames(), 1_000);
        monitor.stop();
        assert!(monitor.metrics().len() >= 2);
    }
}
