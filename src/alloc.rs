//! Allocation accounting
//!
//! Rust has no collector to ask for heap statistics, so the binary installs
//! [`TrackingAllocator`] as its global allocator and the process probe reads
//! the counters back. Library users can opt in the same way:
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: widget_benchmark::alloc::TrackingAllocator = widget_benchmark::alloc::TrackingAllocator;
//! ```

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

static COUNTERS: Counters = Counters::new();

/// Byte and reclaim counters fed by an allocator
struct Counters {
    active: AtomicBool,
    live_bytes: AtomicU64,
    total_bytes: AtomicU64,
    reclaims: AtomicU64,
}

impl Counters {
    const fn new() -> Self {
        Counters {
            active: AtomicBool::new(false),
            live_bytes: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            reclaims: AtomicU64::new(0),
        }
    }

    fn allocated(&self, size: usize) {
        let size = size as u64;
        self.live_bytes.fetch_add(size, Ordering::Relaxed);
        self.total_bytes.fetch_add(size, Ordering::Relaxed);
        self.active.store(true, Ordering::Relaxed);
    }

    fn freed(&self, size: usize) {
        self.live_bytes.fetch_sub(size as u64, Ordering::Relaxed);
        self.reclaims.fetch_add(1, Ordering::Relaxed);
    }

    /// A block changed size. Growth counts as new allocation; nothing is reclaimed.
    fn resized(&self, old_size: usize, new_size: usize) {
        if new_size >= old_size {
            let grown = (new_size - old_size) as u64;
            self.live_bytes.fetch_add(grown, Ordering::Relaxed);
            self.total_bytes.fetch_add(grown, Ordering::Relaxed);
        } else {
            self.live_bytes
                .fetch_sub((old_size - new_size) as u64, Ordering::Relaxed);
        }
        self.active.store(true, Ordering::Relaxed);
    }

    fn stats(&self) -> Option<AllocatorStats> {
        if !self.active.load(Ordering::Relaxed) {
            return None;
        }

        Some(AllocatorStats {
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            reclaims: self.reclaims.load(Ordering::Relaxed),
        })
    }
}

/// System allocator wrapper that counts bytes in and out
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            COUNTERS.allocated(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            COUNTERS.allocated(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            COUNTERS.resized(layout.size(), new_size);
        }
        new_ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        COUNTERS.freed(layout.size());
    }
}

/// Counters read from the tracking allocator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub live_bytes: u64,
    pub total_bytes: u64,
    pub reclaims: u64,
}

/// `None` until [`TrackingAllocator`] has served an allocation. Installed as
/// the global allocator it does so before `main` runs.
pub fn allocator_stats() -> Option<AllocatorStats> {
    COUNTERS.stats()
}
