//! # Runtime handle to one supervised OS process.
//!
//! [`ChildHandle`] pairs a [`ProcessSpec`] with the spawned
//! [`tokio::process::Child`], its lifecycle state, the most recent exit
//! status and stats snapshot, and the restart counter.
//!
//! ## Rules
//! - The child is spawned into its own process group so a terminal Ctrl-C
//!   reaches only the supervisor; stop signals are delivered explicitly.
//! - `kill_on_drop` backstops the no-orphans invariant if the supervisor
//!   itself dies.
//! - Graceful stop is SIGTERM, a bounded wait, then SIGKILL on overrun.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::error::PilotError;
use crate::manifest::ProcessSpec;

use super::state::LifecycleState;
use super::stats::ProcessStats;

/// Outcome of a graceful stop request.
#[derive(Debug)]
pub enum StopOutcome {
    /// The child exited within the graceful window (or was already down).
    Graceful(ExitStatus),
    /// The child ignored SIGTERM past its budget and was SIGKILLed.
    Killed(ExitStatus),
}

/// Read-only view of a child handed to plugin callables.
///
/// Plugins receive this during hook and probe invocations and must not
/// retain it past the call.
#[derive(Debug, Clone)]
pub struct ChildView {
    spec: Arc<ProcessSpec>,
    pid: Option<u32>,
    restarts: u64,
}

impl ChildView {
    /// Manifest name of the process.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// The declared configuration.
    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// OS pid, absent before the first spawn (PRE_START hooks).
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// How many times the process has been respawned.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }
}

/// One running (or terminated) OS process plus its declared configuration.
pub struct ChildHandle {
    spec: Arc<ProcessSpec>,
    state: LifecycleState,
    child: Option<Child>,
    pid: Option<u32>,
    started_at: Option<SystemTime>,
    exit_status: Option<ExitStatus>,
    last_stats: Option<ProcessStats>,
    restarts: u64,
}

impl ChildHandle {
    /// Creates a handle in `Pending`, before any spawn.
    pub fn new(spec: Arc<ProcessSpec>) -> Self {
        Self {
            spec,
            state: LifecycleState::Pending,
            child: None,
            pid: None,
            started_at: None,
            exit_status: None,
            last_stats: None,
            restarts: 0,
        }
    }

    /// The declared configuration.
    pub fn spec(&self) -> &Arc<ProcessSpec> {
        &self.spec
    }

    /// Manifest name of the process.
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Explicit state transition, driven by the launcher and monitor.
    pub fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    /// OS pid of the current incarnation.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the current incarnation was spawned.
    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    /// Most recent exit status, once exited.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Restart counter; increments monotonically across respawns.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Marks one completed respawn.
    pub fn mark_restarted(&mut self) {
        self.restarts += 1;
    }

    /// Cached stats from the last monitor collection.
    pub fn last_stats(&self) -> Option<&ProcessStats> {
        self.last_stats.as_ref()
    }

    /// Caches a fresh stats snapshot.
    pub fn record_stats(&mut self, stats: ProcessStats) {
        self.last_stats = Some(stats);
    }

    /// Read-only view for plugin callables.
    pub fn view(&self) -> ChildView {
        ChildView {
            spec: Arc::clone(&self.spec),
            pid: self.pid,
            restarts: self.restarts,
        }
    }

    /// Fork/execs the configured command with the merged environment.
    ///
    /// Records pid and start time and transitions to `Starting`. The spec's
    /// `env` entries overlay the inherited environment.
    pub fn spawn(&mut self) -> Result<(), PilotError> {
        let mut cmd = Command::new(&self.spec.path);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .kill_on_drop(true);
        if let Some(dir) = &self.spec.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group: terminal signals stay with the supervisor.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| PilotError::Startup {
            process: self.spec.name.clone(),
            reason: format!("spawn of {} failed: {e}", self.spec.path.display()),
        })?;

        self.pid = child.id();
        self.started_at = Some(SystemTime::now());
        self.exit_status = None;
        self.state = LifecycleState::Starting;
        self.child = Some(child);
        Ok(())
    }

    /// Non-blocking reap. Returns the exit status the first time the exit is
    /// observed, `None` while alive or once already reaped.
    pub fn try_reap(&mut self) -> Option<ExitStatus> {
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                self.state = LifecycleState::Exited;
                self.child = None;
                Some(status)
            }
            Ok(None) => None,
            // An errored wait means the handle is unusable; treat as gone.
            Err(_) => {
                self.child = None;
                self.state = LifecycleState::Exited;
                None
            }
        }
    }

    /// Non-blocking liveness check.
    pub fn poll_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        self.try_reap();
        self.exit_status.is_none() && self.child.is_some()
    }

    /// Blocks until exit or the deadline. `Ok(None)` means the deadline
    /// passed with the child still alive.
    pub async fn wait(&mut self, deadline: Instant) -> Result<Option<ExitStatus>, PilotError> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }
        let Some(child) = self.child.as_mut() else {
            return Err(PilotError::Internal {
                message: format!("wait on never-spawned process '{}'", self.spec.name),
            });
        };
        match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => {
                self.exit_status = Some(status);
                self.state = LifecycleState::Exited;
                self.child = None;
                Ok(Some(status))
            }
            Ok(Err(e)) => Err(PilotError::Internal {
                message: format!("wait on '{}' failed: {e}", self.spec.name),
            }),
            Err(_elapsed) => Ok(None),
        }
    }

    /// Graceful stop: SIGTERM, wait up to `grace`, SIGKILL on overrun.
    ///
    /// Transitions through `Stopping` and ends at `Exited`. Always succeeds;
    /// the outcome reports whether escalation was needed.
    pub async fn request_stop(&mut self, grace: std::time::Duration) -> Result<StopOutcome, PilotError> {
        if let Some(status) = self.exit_status {
            return Ok(StopOutcome::Graceful(status));
        }
        if self.child.is_none() {
            return Err(PilotError::Internal {
                message: format!("stop of never-spawned process '{}'", self.spec.name),
            });
        }
        self.state = LifecycleState::Stopping;
        self.terminate();

        if let Some(status) = self.wait(Instant::now() + grace).await? {
            return Ok(StopOutcome::Graceful(status));
        }

        // Ignored SIGTERM past the budget.
        let child = self.child.as_mut().expect("still held after timed-out wait");
        let _ = child.start_kill();
        let status = child.wait().await.map_err(|e| PilotError::Internal {
            message: format!("post-kill wait on '{}' failed: {e}", self.spec.name),
        })?;
        self.exit_status = Some(status);
        self.state = LifecycleState::Exited;
        self.child = None;
        Ok(StopOutcome::Killed(status))
    }

    /// Immediate SIGKILL, for force-kill escalation during teardown.
    pub fn force_kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }

    /// Sends the platform's graceful stop signal.
    #[cfg(unix)]
    fn terminate(&mut self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }

    /// No SIGTERM equivalent; fall back to the runtime's kill.
    #[cfg(not(unix))]
    fn terminate(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}
