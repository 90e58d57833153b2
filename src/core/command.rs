//! # Control commands from the facade to the monitor loop.
//!
//! The facade is the sole mutator of the active set, but it drives the
//! monitor loop through this channel rather than touching child handles
//! directly: the monitor drains pending commands between ticks, so command
//! handling is serialized with polling and stats dispatch.

use tokio::sync::oneshot;

use crate::error::PilotError;

/// One control request for the monitor loop.
pub enum Command {
    /// Tear the fleet down in reverse start order and exit the loop.
    /// Acknowledged once the active set is clear.
    Stop { done: oneshot::Sender<()> },
    /// Stop and respawn the named processes, readiness-gated.
    Restart {
        names: Vec<String>,
        done: oneshot::Sender<Result<(), PilotError>>,
    },
}
