//! # Resource metrics for supervised processes.
//!
//! [`StatsCollector`] wraps a persistent [`sysinfo::System`] so CPU
//! percentages are measured over the interval since the previous collection
//! for each pid; the first sample reports `0.0`. One refresh per monitor
//! tick covers the whole fleet.

use std::time::SystemTime;

use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Timestamped resource snapshot of one supervised process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessStats {
    /// Manifest name of the process.
    pub name: String,
    /// OS pid at collection time.
    pub pid: u32,
    /// Resident memory in MiB.
    pub memory_mb: f64,
    /// CPU usage since the previous collection, in percent of one core.
    /// `0.0` on the first sample.
    pub cpu_percent: f32,
    /// Thread count (0 where the platform does not expose it).
    pub num_threads: usize,
    /// Direct child process count.
    pub num_children: usize,
    /// When this snapshot was taken.
    pub collected_at: SystemTime,
}

/// Fleet-wide metrics reader backed by one persistent [`System`].
pub struct StatsCollector {
    system: System,
}

impl StatsCollector {
    /// Creates an empty collector. Nothing is read until the first
    /// [`collect`](Self::collect).
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Refreshes the process table once and snapshots every target.
    ///
    /// Targets whose process has vanished between polling and collection are
    /// silently skipped; the monitor loop observes the exit on its own.
    pub fn collect(&mut self, targets: &[(String, u32)]) -> Vec<ProcessStats> {
        if targets.is_empty() {
            return Vec::new();
        }
        // Full refresh: counting children requires the whole table anyway.
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let now = SystemTime::now();
        targets
            .iter()
            .filter_map(|(name, pid)| {
                let spid = Pid::from_u32(*pid);
                let proc = self.system.process(spid)?;
                let num_children = self
                    .system
                    .processes()
                    .values()
                    .filter(|p| p.parent() == Some(spid))
                    .count();
                Some(ProcessStats {
                    name: name.clone(),
                    pid: *pid,
                    memory_mb: proc.memory() as f64 / (1024.0 * 1024.0),
                    cpu_percent: proc.cpu_usage(),
                    num_threads: thread_count(proc),
                    num_children,
                    collected_at: now,
                })
            })
            .collect()
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn thread_count(proc: &sysinfo::Process) -> usize {
    proc.tasks().map(|t| t.len()).unwrap_or(1)
}

#[cfg(not(target_os = "linux"))]
fn thread_count(_proc: &sysinfo::Process) -> usize {
    0
}
