//! Process introspection behind a trait so the monitor can run on hosts
//! where a CPU probe is missing, and so tests can feed it fixed numbers.

use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;
use tracing as trc;

use crate::alloc;

/// The probe could not produce a value. Never escapes the monitor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("process probe unavailable: {0}")]
    Unavailable(String),
    #[error("process {0} disappeared from the process table")]
    ProcessGone(u32),
}

/// Heap and collector counters at one instant
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HeapSnapshot {
    pub in_use_bytes: u64,
    /// Cumulative
    pub allocated_bytes: u64,
    /// Cumulative collections or reclaims
    pub collections: u32,
    /// Cumulative pause time
    pub pause_total: Duration,
}

pub trait RuntimeProbe: Send + Sync {
    fn heap(&mut self) -> HeapSnapshot;

    /// Current CPU use of this process in percent
    fn cpu_percent(&mut self) -> Result<f64, ProbeError>;

    /// Number of threads working in this process
    fn workers(&mut self) -> usize;
}

/// Rough CPU estimate from collector pause time.
///
/// Assumes pauses make up a tenth of CPU time. This is a proxy for when no
/// real CPU probe exists and is not an accurate measurement.
pub fn estimate_cpu_percent(pause_delta: Duration, interval: Duration) -> f64 {
    let interval = interval.as_secs_f64();
    if interval <= 0. {
        return 0.;
    }

    let estimated_cpu_secs = pause_delta.as_secs_f64() * 10.;
    (estimated_cpu_secs / interval * 100.).clamp(0., 100.)
}

/// Probe for the current process backed by `sysinfo` and the tracking allocator
pub struct ProcessProbe {
    system: System,
    pid: Option<Pid>,
    peak_resident: u64,
}

impl ProcessProbe {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                trc::warn!("Could not resolve current process, CPU will be estimated: {}", e);
                None
            }
        };

        let mut probe = ProcessProbe {
            system: System::new(),
            pid,
            peak_resident: 0,
        };
        // The first CPU reading is always zero; prime it
        probe.refresh();
        probe
    }

    fn refresh(&mut self) -> Option<&sysinfo::Process> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid)
    }
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeProbe for ProcessProbe {
    fn heap(&mut self) -> HeapSnapshot {
        if let Some(stats) = alloc::allocator_stats() {
            return HeapSnapshot {
                in_use_bytes: stats.live_bytes,
                allocated_bytes: stats.total_bytes,
                collections: u32::try_from(stats.reclaims).unwrap_or(u32::MAX),
                pause_total: Duration::ZERO,
            };
        }

        // Without allocator counters fall back to resident memory, using
        // its high-water mark as the cumulative figure
        let resident = self.refresh().map(|p| p.memory()).unwrap_or(0);
        self.peak_resident = self.peak_resident.max(resident);

        HeapSnapshot {
            in_use_bytes: resident,
            allocated_bytes: self.peak_resident,
            collections: 0,
            pause_total: Duration::ZERO,
        }
    }

    fn cpu_percent(&mut self) -> Result<f64, ProbeError> {
        let pid = self
            .pid
            .ok_or_else(|| ProbeError::Unavailable("no process id".to_string()))?;

        self.refresh()
            .map(|p| p.cpu_usage() as f64)
            .ok_or(ProbeError::ProcessGone(pid.as_u32()))
    }

    fn workers(&mut self) -> usize {
        self.refresh()
            .and_then(|p| p.tasks().map(|tasks| tasks.len()))
            .filter(|&n| n > 0)
            .unwrap_or(1)
    }
}
