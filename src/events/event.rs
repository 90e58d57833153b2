//! # Runtime events emitted by the supervisor and monitor loop.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Startup events**: launch flow (starting, spawned, ready, ready timeout)
//! - **Supervision events**: exits, restarts, demotions, removals
//! - **Shutdown events**: operator stop, escalation, teardown completion
//! - **Plugin events**: hook and stats handler failures
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! process name, pid, exit code, and error messages.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.
//!
//! ## Event flow examples
//!
//! ### Dependency-gated startup
//! ```text
//! ProcessStarting(db) → ProcessSpawned(db) → ProcessReady(db)
//!   → ProcessStarting(api) → ...
//! ```
//!
//! ### Restart-policy exit
//! ```text
//! ProcessExited(worker) → RestartScheduled(worker)
//!   → ProcessSpawned(worker) → ProcessReady(worker)
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Startup events ===
    /// PRE_START hooks are about to run for a process.
    ProcessStarting,
    /// The OS process was spawned.
    ProcessSpawned,
    /// The process passed its readiness probe (or had none).
    ProcessReady,
    /// The readiness probe did not succeed within its deadline.
    ReadyTimeout,

    // === Supervision events ===
    /// A supervised process exited on its own.
    ProcessExited,
    /// A `restart`-policy process is about to be respawned.
    RestartScheduled,
    /// Readiness failed after a restart; the process was demoted to
    /// `do_not_restart` and removed from the active set.
    RestartAbandoned,
    /// A process left the active set.
    ProcessRemoved,

    // === Shutdown events ===
    /// A graceful stop was requested for a process.
    ProcessStopping,
    /// A process ignored graceful stop past its timeout and was SIGKILLed.
    StopEscalated,
    /// Fleet shutdown was requested (operator signal, `stop()`, or a
    /// `shutdown_everything` exit).
    ShutdownRequested,
    /// A second operator signal arrived; stragglers are force-killed.
    ForceKillRequested,
    /// All children are stopped and the active set is clear.
    TeardownComplete,

    // === Plugin events ===
    /// A lifecycle hook failed or panicked.
    HookFailed,
    /// A stats handler failed or panicked.
    StatsHandlerFailed,

    // === Terminal diagnostics ===
    /// The monitor loop hit an unexpected internal error and is tearing the
    /// fleet down.
    MonitorError,
}

/// Runtime event with optional metadata.
///
/// Carries information about process lifecycle, pids, exit codes, errors,
/// and timing.
///
/// ## Fields
///
/// - `seq`: Unique sequence number for ordering (monotonically increasing)
/// - `at`: Wall-clock timestamp (may go backwards due to NTP, use for logging only)
/// - `kind`: Event classification
/// - `process`, `pid`, `exit_code`, `error`, `restarts`, `timeout`: Optional metadata
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Name of the process, if applicable.
    pub process: Option<String>,
    /// OS pid, if the process had been spawned.
    pub pid: Option<u32>,
    /// Exit code, for exit events. `None` means killed by signal.
    pub exit_code: Option<i32>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
    /// Restart counter at the time of the event.
    pub restarts: Option<u64>,
    /// Relevant timeout (ready deadline, graceful-stop budget).
    pub timeout: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            pid: None,
            exit_code: None,
            error: None,
            restarts: None,
            timeout: None,
        }
    }

    /// Attaches a process name.
    pub fn with_process(mut self, name: impl Into<String>) -> Self {
        self.process = Some(name.into());
        self
    }

    /// Attaches an OS pid.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches an exit code.
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches a restart count.
    pub fn with_restarts(mut self, n: u64) -> Self {
        self.restarts = Some(n);
        self
    }

    /// Attaches a timeout duration.
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase_monotonically() {
        let a = Event::now(EventKind::ProcessStarting);
        let b = Event::now(EventKind::ProcessSpawned);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::ProcessExited)
            .with_process("db")
            .with_pid(42)
            .with_exit_code(Some(1))
            .with_error("boom")
            .with_restarts(3);

        assert_eq!(ev.kind, EventKind::ProcessExited);
        assert_eq!(ev.process.as_deref(), Some("db"));
        assert_eq!(ev.pid, Some(42));
        assert_eq!(ev.exit_code, Some(1));
        assert_eq!(ev.error.as_deref(), Some("boom"));
        assert_eq!(ev.restarts, Some(3));
    }
}
