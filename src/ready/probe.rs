//! # Deadline-driven readiness waiting.
//!
//! [`wait_ready`] drives one [`ReadyProbe`] until it reports ready, the
//! deadline passes, or the runtime is canceled.
//!
//! ## Rules
//! - The deadline is computed once by the caller; this loop never extends it.
//! - The deadline is re-checked **before every sleep**, and the final sleep
//!   is clamped to the remainder, so a slow probe cannot overrun the budget
//!   by more than one interval plus its own blocking cost.
//! - Cancellation (operator stop) preempts the wait between probe attempts.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::child::ChildView;
use crate::plugins::ReadyProbe;

/// How a readiness wait concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The probe reported ready within the deadline.
    Ready,
    /// The deadline passed without a ready report.
    TimedOut,
    /// The runtime was canceled mid-wait.
    Canceled,
}

/// Polls `probe` every `interval` until ready, deadline, or cancellation.
///
/// `Err` propagates a hard probe fault (custom probes only; the built-ins
/// treat everything transient as "not ready yet").
pub async fn wait_ready(
    probe: &dyn ReadyProbe,
    child: &ChildView,
    deadline: Instant,
    interval: Duration,
    cancel: &CancellationToken,
) -> anyhow::Result<ProbeStatus> {
    loop {
        if cancel.is_cancelled() {
            return Ok(ProbeStatus::Canceled);
        }
        if probe.poll_once(child).await? {
            return Ok(ProbeStatus::Ready);
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(ProbeStatus::TimedOut);
        }
        let nap = interval.min(deadline - now);
        tokio::select! {
            _ = sleep(nap) => {}
            _ = cancel.cancelled() => return Ok(ProbeStatus::Canceled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child::ChildHandle;
    use crate::manifest::ProcessSpec;
    use crate::plugins::ProbeFn;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn view() -> ChildView {
        let spec: ProcessSpec = serde_json::from_value(serde_json::json!({
            "name": "wait-target",
            "path": "/bin/true",
        }))
        .unwrap();
        ChildHandle::new(Arc::new(spec)).view()
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_probe_times_out_at_the_deadline() {
        let probe = ProbeFn::arc(|_| async { Ok(false) });
        let budget = Duration::from_secs(5);
        let started = Instant::now();

        let status = wait_ready(
            probe.as_ref(),
            &view(),
            started + budget,
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(status, ProbeStatus::TimedOut);
        // Exactly the budget under the paused clock: the last sleep is
        // clamped to the remainder.
        assert_eq!(started.elapsed(), budget);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_ready_on_later_attempt_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_probe = Arc::clone(&calls);
        let probe = ProbeFn::arc(move |_| {
            let calls = Arc::clone(&calls_in_probe);
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2) }
        });

        let status = wait_ready(
            probe.as_ref(),
            &view(),
            Instant::now() + Duration::from_secs(5),
            Duration::from_millis(100),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(status, ProbeStatus::Ready);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_preempts_the_wait() {
        let probe = ProbeFn::arc(|_| async { Ok(false) });
        let cancel = CancellationToken::new();

        let canceler = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            canceler.cancel();
        });

        let status = wait_ready(
            probe.as_ref(),
            &view(),
            Instant::now() + Duration::from_secs(60),
            Duration::from_millis(100),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(status, ProbeStatus::Canceled);
    }

    #[tokio::test]
    async fn probe_faults_propagate() {
        let probe = ProbeFn::arc(|_| async { anyhow::bail!("registry handed us a broken probe") });
        let err = wait_ready(
            probe.as_ref(),
            &view(),
            Instant::now() + Duration::from_secs(1),
            Duration::from_millis(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("broken probe"));
    }
}
