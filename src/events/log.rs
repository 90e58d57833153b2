//! # Tracing-backed event narrator.
//!
//! [`EventLogger`] drains a bus subscription in a background task and renders
//! each event through `tracing`, so operators get one coherent narrated
//! stream regardless of which component published the event.
//!
//! ## Output format
//! ```text
//! INFO  starting process=db
//! INFO  spawned process=db pid=4242
//! INFO  ready process=db
//! WARN  exited process=db code=1
//! INFO  restart-scheduled process=db restarts=1
//! WARN  stop-escalated process=api timeout=5s
//! INFO  teardown-complete
//! ```

use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::event::{Event, EventKind};

/// Renders bus events through `tracing`.
pub struct EventLogger;

impl EventLogger {
    /// Spawns the logging listener. Runs until the bus is closed.
    pub fn spawn(mut rx: Receiver<Event>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => Self::render(&ev),
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "event logger lagged behind the bus");
                    }
                }
            }
        })
    }

    fn render(ev: &Event) {
        let name = ev.process.as_deref().unwrap_or("-");
        match ev.kind {
            EventKind::ProcessStarting => info!(process = name, "starting"),
            EventKind::ProcessSpawned => {
                info!(process = name, pid = ev.pid, "spawned");
            }
            EventKind::ProcessReady => info!(process = name, "ready"),
            EventKind::ReadyTimeout => {
                warn!(process = name, timeout = ?ev.timeout, "readiness probe timed out");
            }
            EventKind::ProcessExited => {
                warn!(process = name, code = ev.exit_code, "exited");
            }
            EventKind::RestartScheduled => {
                info!(process = name, restarts = ev.restarts, "restart scheduled");
            }
            EventKind::RestartAbandoned => {
                warn!(
                    process = name,
                    error = ev.error.as_deref(),
                    "restart abandoned; demoted to do_not_restart"
                );
            }
            EventKind::ProcessRemoved => debug!(process = name, "removed from active set"),
            EventKind::ProcessStopping => info!(process = name, "stopping"),
            EventKind::StopEscalated => {
                warn!(process = name, timeout = ?ev.timeout, "graceful stop timed out; SIGKILL sent");
            }
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::ForceKillRequested => warn!("force kill requested"),
            EventKind::TeardownComplete => info!("teardown complete"),
            EventKind::HookFailed => {
                warn!(process = name, error = ev.error.as_deref(), "lifecycle hook failed");
            }
            EventKind::StatsHandlerFailed => {
                warn!(error = ev.error.as_deref(), "stats handler failed");
            }
            EventKind::MonitorError => {
                error!(error = ev.error.as_deref(), "monitor loop error; tearing fleet down");
            }
        }
    }
}
