//! # Lifecycle states of a supervised process.
//!
//! State transitions:
//! ```text
//! Pending ──► Starting ──► Ready ──► Running ──► Stopping ──► Exited
//!                │                      │
//!                │                      └──► Exited (natural exit)
//!                └──► Exited (startup failure)
//!
//! Any live state ──► TerminatedByPolicy (reaped by a peer's
//!                                        shutdown_everything)
//! ```
//!
//! ## Rules
//! - `Pending` at scheduler init, before the batch containing the spec runs.
//! - `Starting` once PRE_START hooks begin.
//! - `Ready` after the readiness probe succeeds (immediately if none).
//! - `Running` on the first monitor tick that confirms liveness after Ready.
//! - `Stopping` on explicit stop or restart.
//! - `Exited` on natural termination or graceful stop.
//! - `TerminatedByPolicy` when fleet teardown reaps it on a peer's behalf.

/// Where a supervised process is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Known to the scheduler, not yet launched.
    Pending,
    /// PRE_START through readiness probing.
    Starting,
    /// Passed its readiness probe; dependents may start.
    Ready,
    /// Confirmed alive by the monitor loop.
    Running,
    /// Graceful stop in progress.
    Stopping,
    /// Terminated on its own or via graceful stop.
    Exited,
    /// Reaped because a peer's `shutdown_everything` took the fleet down.
    TerminatedByPolicy,
}

impl LifecycleState {
    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Exited => "exited",
            LifecycleState::TerminatedByPolicy => "terminated_by_policy",
        }
    }

    /// True for states in which the OS process may be alive.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            LifecycleState::Starting
                | LifecycleState::Ready
                | LifecycleState::Running
                | LifecycleState::Stopping
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}
