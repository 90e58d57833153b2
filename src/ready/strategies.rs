//! # Built-in readiness probes.
//!
//! One type per built-in strategy, each answering a single cheap question
//! per call. Transient conditions are `Ok(false)`; the deadline loop in
//! [`wait_ready`](super::wait_ready) decides when to give up.
//!
//! | Strategy | Ready predicate |
//! |---|---|
//! | [`TcpProbe`]  | a TCP connect to `host:port` succeeds |
//! | [`FileProbe`] | the configured path exists as a regular file |
//! | [`PipeProbe`] | a non-blocking read from the FIFO yields `ready` |

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::child::ChildView;
use crate::plugins::ReadyProbe;

/// Ready iff a TCP connection to the configured endpoint succeeds.
///
/// Any connect error (refused, unreachable, reset) is a transient failure,
/// not a probe error.
pub struct TcpProbe {
    host: String,
    port: u16,
}

impl TcpProbe {
    /// Each connect attempt is individually bounded so a black-holed SYN
    /// cannot eat the whole readiness budget.
    const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

    pub fn new(host: String, port: u16) -> Self {
        Self { host, port }
    }
}

#[async_trait]
impl ReadyProbe for TcpProbe {
    async fn poll_once(&self, _child: &ChildView) -> anyhow::Result<bool> {
        let attempt = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(Self::CONNECT_TIMEOUT, attempt).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }
}

/// Ready iff the configured path exists as a regular file.
///
/// Permission errors are transient: the child may still be tightening the
/// file into place.
pub struct FileProbe {
    path: PathBuf,
}

impl FileProbe {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ReadyProbe for FileProbe {
    async fn poll_once(&self, _child: &ChildView) -> anyhow::Result<bool> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(_) => Ok(false),
        }
    }
}

/// Ready iff a non-blocking read from the supervisor-created FIFO yields the
/// literal token `ready` (trailing whitespace ignored).
///
/// An empty read or would-block is transient.
pub struct PipeProbe {
    path: PathBuf,
}

impl PipeProbe {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[cfg(unix)]
    fn read_token(&self) -> anyhow::Result<bool> {
        use std::io::Read;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = match std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
        {
            Ok(f) => f,
            // Pipe missing or not yet openable: transient.
            Err(_) => return Ok(false),
        };

        // Drain whatever is buffered; a would-block after partial data must
        // not discard the token already read.
        let mut buf = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        if buf.is_empty() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&buf).trim_end() == "ready")
    }

    #[cfg(not(unix))]
    fn read_token(&self) -> anyhow::Result<bool> {
        anyhow::bail!(
            "pipe readiness strategy requires a unix platform ({})",
            self.path.display()
        )
    }
}

#[async_trait]
impl ReadyProbe for PipeProbe {
    async fn poll_once(&self, _child: &ChildView) -> anyhow::Result<bool> {
        self.read_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::ChildHandle;
    use crate::manifest::ProcessSpec;
    use std::sync::Arc;

    fn view() -> ChildView {
        let spec: ProcessSpec = serde_json::from_value(serde_json::json!({
            "name": "probe-target",
            "path": "/bin/true",
        }))
        .unwrap();
        ChildHandle::new(Arc::new(spec)).view()
    }

    #[tokio::test]
    async fn tcp_probe_connects_to_a_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new("127.0.0.1".into(), port);
        assert!(probe.poll_once(&view()).await.unwrap());
    }

    #[tokio::test]
    async fn tcp_probe_treats_refused_connect_as_transient() {
        // Bind-then-drop guarantees nothing is listening on the port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new("127.0.0.1".into(), port);
        assert!(!probe.poll_once(&view()).await.unwrap());
    }

    #[tokio::test]
    async fn file_probe_requires_a_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.ready");

        let probe = FileProbe::new(path.clone());
        assert!(!probe.poll_once(&view()).await.unwrap());

        // A directory at the path does not count.
        std::fs::create_dir(&path).unwrap();
        assert!(!probe.poll_once(&view()).await.unwrap());
        std::fs::remove_dir(&path).unwrap();

        std::fs::write(&path, b"").unwrap();
        assert!(probe.poll_once(&view()).await.unwrap());
    }

    /// Opens a FIFO read-write so a test writer neither blocks on open nor
    /// sees EPIPE, and written data stays buffered for the probe.
    #[cfg(unix)]
    fn open_rw(path: &std::path::Path) -> std::fs::File {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipe_probe_accepts_the_ready_token() {
        use crate::ready::PipeGuard;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.pipe");
        let _guard = PipeGuard::create(path.clone()).unwrap();

        let probe = PipeProbe::new(path.clone());
        // No writer yet: transient.
        assert!(!probe.poll_once(&view()).await.unwrap());

        let mut writer = open_rw(&path);
        // Still nothing written: transient.
        assert!(!probe.poll_once(&view()).await.unwrap());

        writer.write_all(b"ready\n").unwrap();
        assert!(probe.poll_once(&view()).await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pipe_probe_rejects_other_tokens() {
        use crate::ready::PipeGuard;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.pipe");
        let _guard = PipeGuard::create(path.clone()).unwrap();

        let probe = PipeProbe::new(path.clone());
        let mut writer = open_rw(&path);
        writer.write_all(b"warming-up\n").unwrap();

        assert!(!probe.poll_once(&view()).await.unwrap());
    }
}
