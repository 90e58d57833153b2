//! # Resolved fleet plumbing shared by the launcher and monitor loop.
//!
//! At `start()`, every manifest spec is resolved against the plugin registry
//! exactly once into a [`RuntimeSpec`]: flattened hook lists per transition,
//! the readiness probe with its budget, and the pipe path when the `pipe`
//! strategy is declared. No registry lookups happen during supervision.
//!
//! This module also owns the two pieces both the launcher and the monitor
//! need:
//! - [`run_hooks`]: plugin dispatch with panic isolation; fatal only for
//!   PRE_START
//! - [`tear_down_fleet`]: reverse-start-order fleet shutdown
//!
//! ## Rules
//! - Hook callables run inline on the control path, in group declaration
//!   order, isolated with `catch_unwind`.
//! - Teardown stops still-running children in reverse start order with each
//!   child's own graceful budget (clamped by the optional global deadline),
//!   fires ON_SHUTDOWN after exit, and unlinks readiness pipes by dropping
//!   the guards.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::child::{ChildHandle, ChildView, LifecycleState, StopOutcome};
use crate::config::PilotConfig;
use crate::error::{ManifestError, PilotError};
use crate::events::{Bus, Event, EventKind};
use crate::manifest::{HookKind, ProcessManifest, ProcessSpec, ReadyCheck};
use crate::plugins::{HookRef, PluginRegistry, ProbeRef, StatsRef};
use crate::ready::PipeGuard;

use super::table::StateTable;

/// A readiness strategy resolved to a runnable probe.
pub(crate) struct ResolvedProbe {
    /// The probe to poll.
    pub probe: ProbeRef,
    /// Budget measured from just before the spawn.
    pub timeout: Duration,
    /// FIFO to create before PRE_START, for the `pipe` strategy.
    pub pipe_path: Option<PathBuf>,
}

/// One manifest spec with every registry reference resolved.
pub(crate) struct RuntimeSpec {
    pub spec: Arc<ProcessSpec>,
    /// Flattened `(group, hook)` lists per transition kind, in the spec's
    /// group declaration order.
    pub hooks: HashMap<HookKind, Vec<(String, HookRef)>>,
    pub probe: Option<ResolvedProbe>,
}

/// A supervised child in the active set: resolved spec, OS handle, and the
/// readiness pipe whose lifetime is tied to the child.
pub(crate) struct ActiveChild {
    pub runtime: Arc<RuntimeSpec>,
    pub handle: ChildHandle,
    pub pipe: Option<PipeGuard>,
}

impl ActiveChild {
    pub fn name(&self) -> &str {
        self.handle.name()
    }
}

/// Resolves every spec and the union of referenced stats handlers.
///
/// Fails with `UnknownCapability` before any side effects if a referenced
/// strategy, hook group, or stats handler is absent from the registry.
pub(crate) fn resolve_fleet(
    manifest: &ProcessManifest,
    registry: &PluginRegistry,
) -> Result<(Vec<Arc<RuntimeSpec>>, Vec<(String, StatsRef)>), ManifestError> {
    registry.validate_manifest(manifest)?;

    let mut runtimes = Vec::with_capacity(manifest.processes.len());
    let mut handler_names: Vec<String> = Vec::new();
    for spec in &manifest.processes {
        let mut hooks: HashMap<HookKind, Vec<(String, HookRef)>> = HashMap::new();
        for kind in HookKind::ALL {
            let mut callables = Vec::new();
            for group in &spec.hooks {
                for hook in registry.resolve_hooks(group, kind)? {
                    callables.push((group.clone(), hook.clone()));
                }
            }
            if !callables.is_empty() {
                hooks.insert(kind, callables);
            }
        }

        let probe = match spec.ready_check()? {
            None => None,
            Some(check) => {
                let pipe_path = match &check {
                    ReadyCheck::Pipe { path } => Some(path.clone()),
                    _ => None,
                };
                Some(ResolvedProbe {
                    probe: registry.resolve_probe(&check)?,
                    timeout: spec.ready_timeout().expect("validated with strategy"),
                    pipe_path,
                })
            }
        };

        for handler in &spec.stats_handlers {
            if !handler_names.contains(handler) {
                handler_names.push(handler.clone());
            }
        }

        runtimes.push(Arc::new(RuntimeSpec {
            spec: Arc::new(spec.clone()),
            hooks,
            probe,
        }));
    }

    let handlers = handler_names
        .into_iter()
        .map(|name| registry.resolve_stats(&name).map(|h| (name, h)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((runtimes, handlers))
}

/// Extracts a printable message from a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs every hook of one transition kind for one child, in order.
///
/// Failures and panics publish `HookFailed`; only PRE_START failures return
/// an error (aborting that child's start), everything else is logged and
/// supervision continues.
pub(crate) async fn run_hooks(
    kind: HookKind,
    rt: &RuntimeSpec,
    view: &ChildView,
    bus: &Bus,
) -> Result<(), PilotError> {
    let Some(hooks) = rt.hooks.get(&kind) else {
        return Ok(());
    };
    for (group, hook) in hooks {
        let outcome = std::panic::AssertUnwindSafe(hook.run(view))
            .catch_unwind()
            .await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(format!("panic: {}", panic_message(payload))),
        };
        let Some(message) = failure else { continue };

        bus.publish(
            Event::now(EventKind::HookFailed)
                .with_process(&rt.spec.name)
                .with_error(format!("{group}/{kind}: {message}")),
        );
        let err = PilotError::Plugin {
            name: group.clone(),
            stage: kind.as_label(),
            message,
        };
        if kind == HookKind::PreStart {
            return Err(err);
        }
        warn!(process = %rt.spec.name, error = %err, "non-fatal hook failure");
    }
    Ok(())
}

/// Stops one child: graceful signal, bounded wait, SIGKILL on overrun, then
/// ON_SHUTDOWN hooks. The `force` token skips the graceful phase entirely.
pub(crate) async fn stop_one(
    child: &mut ActiveChild,
    bus: &Bus,
    table: &StateTable,
    grace: Duration,
    terminal: LifecycleState,
    force: &CancellationToken,
) {
    let name = child.name().to_string();
    let was_live = child.handle.poll_alive();

    if was_live {
        bus.publish(Event::now(EventKind::ProcessStopping).with_process(&name));
        table.set_state(&name, LifecycleState::Stopping);

        if force.is_cancelled() {
            child.handle.force_kill();
            let _ = child.handle.wait(Instant::now() + Duration::from_secs(5)).await;
        } else {
            let escalate = {
                let stopping = child.handle.request_stop(grace);
                tokio::pin!(stopping);
                tokio::select! {
                    res = &mut stopping => {
                        match res {
                            Ok(StopOutcome::Killed(_)) => {
                                let err = PilotError::StopTimeout {
                                    process: name.clone(),
                                    timeout: grace,
                                };
                                warn!(label = err.as_label(), "{err}");
                                bus.publish(
                                    Event::now(EventKind::StopEscalated)
                                        .with_process(&name)
                                        .with_timeout(grace),
                                );
                            }
                            Ok(StopOutcome::Graceful(_)) => {}
                            Err(e) => warn!(process = %name, error = %e, "stop failed"),
                        }
                        false
                    }
                    _ = force.cancelled() => true,
                }
            };
            if escalate {
                bus.publish(
                    Event::now(EventKind::StopEscalated)
                        .with_process(&name)
                        .with_timeout(grace),
                );
                child.handle.force_kill();
                let _ = child.handle.wait(Instant::now() + Duration::from_secs(5)).await;
            }
        }
    }

    let view = child.handle.view();
    let _ = run_hooks(HookKind::OnShutdown, &child.runtime, &view, bus).await;

    child.handle.set_state(terminal);
    table.update(&name, |s| {
        s.state = terminal;
        s.pid = None;
    });
    bus.publish(Event::now(EventKind::ProcessRemoved).with_process(&name));
}

/// Tears the whole fleet down in reverse start order.
///
/// Still-running children get their configured graceful budget (clamped by
/// the optional global `stop_deadline`); the active set is drained and every
/// readiness pipe unlinked before this returns.
pub(crate) async fn tear_down_fleet(
    children: &mut Vec<ActiveChild>,
    bus: &Bus,
    table: &StateTable,
    cfg: &PilotConfig,
    terminal: LifecycleState,
    force: &CancellationToken,
) {
    let overall = cfg.stop_deadline.map(|d| Instant::now() + d);

    for child in children.iter_mut().rev() {
        let mut grace = child.runtime.spec.stop_timeout();
        if let Some(deadline) = overall {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                child.handle.force_kill();
            }
            grace = grace.min(remaining);
        }
        stop_one(child, bus, table, grace, terminal, force).await;
    }

    // Dropping the children unlinks any readiness pipes.
    children.clear();
    bus.publish(Event::now(EventKind::TeardownComplete));
}
