//! # Operator signal handling.
//!
//! [`wait_for_stop_signal`] completes when the supervisor receives a
//! termination signal; [`spawn_signal_watcher`] turns signals into control
//! actions:
//!
//! - the **first** SIGINT/SIGTERM cancels the runtime token (preempting
//!   readiness waits and restarts) and requests one fleet stop;
//! - a **second** signal escalates: stragglers still ignoring their graceful
//!   stop are force-killed;
//! - further signals are ignored.
//!
//! The watcher exits on its own once the monitor loop is gone.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::events::{Bus, Event, EventKind};

use super::command::Command;

/// Waits for a termination signal (SIGINT or SIGTERM on unix, Ctrl-C
/// elsewhere).
///
/// Each call creates independent signal listeners.
#[cfg(unix)]
pub async fn wait_for_stop_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}

/// Waits for a termination signal (Ctrl-C).
#[cfg(not(unix))]
pub async fn wait_for_stop_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Spawns the signal → control-action translator.
///
/// `cancel` is the runtime token shared with readiness waits; `force` is the
/// escalation token observed by fleet teardown.
pub fn spawn_signal_watcher(
    tx: mpsc::Sender<Command>,
    bus: Bus,
    cancel: CancellationToken,
    force: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            // Monitor gone: nothing left to stop.
            _ = tx.closed() => return,
            sig = wait_for_stop_signal() => {
                if let Err(e) = sig {
                    warn!(error = %e, "signal listener unavailable");
                    return;
                }
            }
        }

        cancel.cancel();
        let (done, _ignored) = oneshot::channel();
        let _ = tx.send(Command::Stop { done }).await;

        tokio::select! {
            _ = tx.closed() => {}
            sig = wait_for_stop_signal() => {
                if sig.is_ok() {
                    bus.publish(Event::now(EventKind::ForceKillRequested));
                    force.cancel();
                }
            }
        }
    })
}
