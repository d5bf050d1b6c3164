//! Rolling-window frame rate
//!
//! Frame timestamps live in a bounded FIFO. The frame rate is the number of
//! timestamps inside the trailing second, recomputed at most once per second
//! on the write path and lazily on reads that find the value stale.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

/// Default number of frame timestamps kept
pub const DEFAULT_CAPACITY: usize = 120;

/// FPS reported before any measurement
pub const DEFAULT_FPS: f64 = 60.0;

const WINDOW: Duration = Duration::from_secs(1);
const STALE_AFTER: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct FpsCalculator {
    inner: RwLock<Window>,
}

#[derive(Debug)]
struct Window {
    frames: VecDeque<Instant>,
    capacity: usize,
    last_fps: f64,
    last_update: Instant,
}

impl Window {
    fn new(capacity: usize, now: Instant) -> Self {
        Window {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            last_fps: DEFAULT_FPS,
            last_update: now,
        }
    }

    fn recompute(&mut self, now: Instant) {
        self.last_update = now;

        if self.frames.len() < 2 {
            return;
        }

        // Frames are pushed in order so we can stop at the first old one
        let count = self
            .frames
            .iter()
            .rev()
            .take_while(|&&t| now.saturating_duration_since(t) < WINDOW)
            .count();

        if count > 0 {
            self.last_fps = count as f64;
        }
    }
}

impl Default for FpsCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FpsCalculator {
    pub fn new(capacity: usize) -> Self {
        FpsCalculator {
            inner: RwLock::new(Window::new(capacity.max(1), Instant::now())),
        }
    }

    /// Record a frame rendered now
    pub fn record_frame(&self) {
        self.record_frame_at(Instant::now());
    }

    /// Record a frame rendered at `at`. Instants must not go backwards.
    pub fn record_frame_at(&self, at: Instant) {
        let mut window = self.inner.write();

        window.frames.push_back(at);
        while window.frames.len() > window.capacity {
            window.frames.pop_front();
        }

        if at.saturating_duration_since(window.last_update) >= WINDOW {
            window.recompute(at);
        }
    }

    pub fn current_fps(&self) -> f64 {
        self.current_fps_at(Instant::now())
    }

    /// Frame rate as seen at `now`, recomputing if the value went stale
    pub fn current_fps_at(&self, now: Instant) -> f64 {
        let window = self.inner.upgradable_read();

        if now.saturating_duration_since(window.last_update) > STALE_AFTER {
            let mut window = RwLockUpgradableReadGuard::upgrade(window);
            window.recompute(now);
            window.last_fps
        } else {
            window.last_fps
        }
    }

    /// Number of timestamps currently held
    pub fn sample_count(&self) -> usize {
        self.inner.read().frames.len()
    }

    pub fn reset(&self) {
        let mut window = self.inner.write();
        let capacity = window.capacity;
        *window = Window::new(capacity, Instant::now());
    }
}
