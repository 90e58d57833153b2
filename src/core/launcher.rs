//! # Dependency-ordered fleet startup.
//!
//! Executes a [`StartPlan`] batch by batch: every spec in a batch starts
//! concurrently, and the next batch begins only once the whole batch is
//! READY, so dependencies reach READY strictly before any dependent runs
//! PRE_START.
//!
//! ## Per-child start flow
//! ```text
//! ProcessStarting
//!   ├─► create readiness pipe        (pipe strategy only)
//!   ├─► PRE_START hooks              (failure aborts the start)
//!   ├─► deadline = now + ready_timeout
//!   ├─► spawn ──► ProcessSpawned
//!   ├─► POST_START hooks             (failures logged)
//!   └─► readiness probe to deadline
//!         ├─► Ready    ──► ProcessReady
//!         └─► TimedOut ──► ReadyTimeout ──► stop child ──► StartupFailure
//! ```
//!
//! ## Rules
//! - Within a batch children spawn in declaration order; probing overlaps.
//! - Any failure is fatal to the whole `start`: children already up are torn
//!   down in reverse start order and the first failure (by declaration
//!   order) surfaces.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::child::{ChildHandle, LifecycleState};
use crate::config::PilotConfig;
use crate::error::PilotError;
use crate::events::{Bus, Event, EventKind};
use crate::manifest::{HookKind, StartPlan};
use crate::ready::{wait_ready, PipeGuard, ProbeStatus};

use super::fleet::{run_hooks, stop_one, tear_down_fleet, ActiveChild, RuntimeSpec};
use super::table::StateTable;

/// Launches the whole fleet per the plan.
///
/// On success every child is READY and registered in the returned active
/// set, in start order. On failure whatever had started is already torn
/// down.
pub(crate) async fn launch_fleet(
    runtimes: &[Arc<RuntimeSpec>],
    plan: &StartPlan,
    bus: &Bus,
    table: &Arc<StateTable>,
    cfg: &PilotConfig,
    cancel: &CancellationToken,
    force: &CancellationToken,
) -> Result<Vec<ActiveChild>, PilotError> {
    let mut started: Vec<ActiveChild> = Vec::with_capacity(runtimes.len());

    for batch in plan.batches() {
        let mut set: JoinSet<(usize, Result<ActiveChild, PilotError>)> = JoinSet::new();
        for (pos, &idx) in batch.iter().enumerate() {
            let rt = Arc::clone(&runtimes[idx]);
            let bus = bus.clone();
            let table = Arc::clone(table);
            let interval = cfg.probe_interval;
            let cancel = cancel.clone();
            set.spawn(async move {
                let res = start_one(rt, &bus, &table, interval, &cancel).await;
                (pos, res)
            });
        }

        let mut results: Vec<Option<Result<ActiveChild, PilotError>>> =
            (0..batch.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((pos, res)) => results[pos] = Some(res),
                Err(join_err) => {
                    // A panicked start task counts as a failed child.
                    if let Some(slot) = results.iter_mut().find(|r| r.is_none()) {
                        *slot = Some(Err(PilotError::Internal {
                            message: format!("start task panicked: {join_err}"),
                        }));
                    }
                }
            }
        }

        let mut first_failure: Option<PilotError> = None;
        for res in results.into_iter().flatten() {
            match res {
                Ok(child) => started.push(child),
                Err(e) => {
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
            }
        }

        if let Some(failure) = first_failure {
            tear_down_fleet(&mut started, bus, table, cfg, LifecycleState::Exited, force).await;
            return Err(failure);
        }
    }

    Ok(started)
}

/// Runs one child from PRE_START through readiness.
async fn start_one(
    rt: Arc<RuntimeSpec>,
    bus: &Bus,
    table: &StateTable,
    probe_interval: std::time::Duration,
    cancel: &CancellationToken,
) -> Result<ActiveChild, PilotError> {
    let name = rt.spec.name.clone();
    bus.publish(Event::now(EventKind::ProcessStarting).with_process(&name));
    table.set_state(&name, LifecycleState::Starting);

    // The pipe exists before PRE_START so hooks can hand the path onward.
    let pipe = match rt.probe.as_ref().and_then(|p| p.pipe_path.clone()) {
        Some(path) => Some(PipeGuard::create(path).map_err(|e| PilotError::Startup {
            process: name.clone(),
            reason: e.to_string(),
        })?),
        None => None,
    };

    let mut handle = ChildHandle::new(Arc::clone(&rt.spec));
    run_hooks(HookKind::PreStart, &rt, &handle.view(), bus)
        .await
        .map_err(|e| PilotError::Startup {
            process: name.clone(),
            reason: e.to_string(),
        })?;

    // The readiness budget starts once PRE_START completes.
    let deadline = rt
        .probe
        .as_ref()
        .map(|p| Instant::now() + p.timeout);

    handle.spawn()?;
    bus.publish(
        Event::now(EventKind::ProcessSpawned)
            .with_process(&name)
            .with_pid(handle.pid().unwrap_or(0)),
    );
    table.update(&name, |s| {
        s.pid = handle.pid();
        s.started_at = handle.started_at();
    });

    run_hooks(HookKind::PostStart, &rt, &handle.view(), bus).await?;

    if let Some(probe) = &rt.probe {
        let deadline = deadline.expect("deadline computed with probe");
        let status = wait_ready(
            probe.probe.as_ref(),
            &handle.view(),
            deadline,
            probe_interval,
            cancel,
        )
        .await;

        let failure = match status {
            Ok(ProbeStatus::Ready) => None,
            Ok(ProbeStatus::TimedOut) => {
                bus.publish(
                    Event::now(EventKind::ReadyTimeout)
                        .with_process(&name)
                        .with_timeout(probe.timeout),
                );
                Some(format!(
                    "readiness probe timed out after {:?}",
                    probe.timeout
                ))
            }
            Ok(ProbeStatus::Canceled) => Some("startup canceled".to_string()),
            Err(fault) => Some(format!("readiness probe failed: {fault}")),
        };

        if let Some(reason) = failure {
            let mut child = ActiveChild {
                runtime: Arc::clone(&rt),
                handle,
                pipe,
            };
            stop_one(
                &mut child,
                bus,
                table,
                rt.spec.stop_timeout(),
                LifecycleState::Exited,
                &CancellationToken::new(),
            )
            .await;
            return Err(PilotError::Startup {
                process: name,
                reason,
            });
        }
    }

    handle.set_state(LifecycleState::Ready);
    table.set_state(&name, LifecycleState::Ready);
    bus.publish(Event::now(EventKind::ProcessReady).with_process(&name));

    Ok(ActiveChild {
        runtime: rt,
        handle,
        pipe,
    })
}
