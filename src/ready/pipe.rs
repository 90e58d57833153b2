//! # Named-pipe lifetime management for the `pipe` readiness strategy.
//!
//! The supervisor owns the pipe: [`PipeGuard::create`] makes the FIFO before
//! PRE_START hooks run, the guard lives as long as the child (across
//! restarts), and dropping it unlinks the path after the child leaves the
//! active set.
//!
//! Platform branching for pipes is confined to this module and the probe;
//! the scheduler treats the configured path as opaque.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PilotError;

/// RAII handle to a supervisor-created FIFO; unlinks on drop.
pub struct PipeGuard {
    path: PathBuf,
}

impl PipeGuard {
    /// Creates the FIFO at `path`, replacing any stale one from a previous
    /// run.
    #[cfg(unix)]
    pub fn create(path: PathBuf) -> Result<Self, PilotError> {
        use nix::sys::stat::Mode;
        use nix::unistd::mkfifo;

        if path.exists() {
            std::fs::remove_file(&path).ok();
        }
        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| PilotError::Internal {
            message: format!("cannot create readiness pipe {}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), "created readiness pipe");
        Ok(Self { path })
    }

    /// Named-pipe creation is not wired up off unix.
    #[cfg(not(unix))]
    pub fn create(path: PathBuf) -> Result<Self, PilotError> {
        Err(PilotError::Internal {
            message: format!(
                "pipe readiness strategy requires a unix platform ({})",
                path.display()
            ),
        })
    }

    /// Path of the FIFO.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PipeGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed readiness pipe"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove readiness pipe"),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn guard_creates_and_unlinks_the_fifo() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("svc.ready");
        {
            let guard = PipeGuard::create(path.clone()).unwrap();
            assert!(guard.path().exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn stale_pipe_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("svc.ready");
        std::fs::write(&path, b"stale").unwrap();

        let guard = PipeGuard::create(path.clone()).unwrap();
        assert!(guard.path().exists());
        let meta = std::fs::metadata(&path).unwrap();
        use std::os::unix::fs::FileTypeExt;
        assert!(meta.file_type().is_fifo());
    }
}
