//! # Monitor loop: liveness, stats, and the shutdown-policy machine.
//!
//! Runs on a single control path after `start()` returns. Each tick:
//!
//! ```text
//! tick
//!  ├─► reap each child (non-blocking)
//!  │     ├─► alive: promote Ready → Running
//!  │     └─► newly exited: ProcessExited, mark for policy
//!  ├─► collect one stats batch (one entry per live child)
//!  ├─► dispatch the batch to every referenced stats handler
//!  ├─► ON_SHUTDOWN hooks for each exited child
//!  └─► apply shutdown policies
//!        ├─► shutdown_everything: fleet teardown, exit loop
//!        ├─► restart: ON_RESTART → respawn → readiness
//!        │     └─► readiness fails: demote to do_not_restart, remove
//!        └─► do_not_restart: remove from the active set
//! ```
//!
//! Between ticks the loop drains control commands (stop, restart-by-name).
//!
//! ## Rules
//! - Policies are applied only after **all** exits of a tick are collected:
//!   a `shutdown_everything` exit preempts every pending restart.
//! - Stats handlers see a consistent per-tick snapshot; failures and panics
//!   are logged and swallowed.
//! - The loop never dies silently: an unexpected internal error publishes
//!   `MonitorError`, tears the fleet down, and exits.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::child::{LifecycleState, ProcessStats, StatsCollector};
use crate::config::PilotConfig;
use crate::error::PilotError;
use crate::events::{Bus, Event, EventKind};
use crate::manifest::{HookKind, ShutdownStrategy};
use crate::plugins::StatsRef;
use crate::ready::{wait_ready, ProbeStatus};

use super::command::Command;
use super::fleet::{panic_message, run_hooks, tear_down_fleet, ActiveChild};
use super::table::StateTable;

/// What a tick decided about the loop's future.
enum Flow {
    Continue,
    Teardown,
}

/// The supervision loop over one active set.
pub(crate) struct MonitorLoop {
    cfg: PilotConfig,
    bus: Bus,
    table: Arc<StateTable>,
    children: Vec<ActiveChild>,
    stats_handlers: Vec<(String, StatsRef)>,
    collector: StatsCollector,
    cancel: CancellationToken,
    force: CancellationToken,
}

impl MonitorLoop {
    pub fn new(
        cfg: PilotConfig,
        bus: Bus,
        table: Arc<StateTable>,
        children: Vec<ActiveChild>,
        stats_handlers: Vec<(String, StatsRef)>,
        cancel: CancellationToken,
        force: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            table,
            children,
            stats_handlers,
            collector: StatsCollector::new(),
            cancel,
            force,
        }
    }

    /// Runs until an operator stop, a `shutdown_everything` exit, or an
    /// internal error. The active set is empty when this returns; an `Err`
    /// means the loop died on an unexpected internal error (after tearing
    /// the fleet down).
    pub async fn run(mut self, mut rx: mpsc::Receiver<Command>) -> Result<(), PilotError> {
        let mut ticker = interval(self.cfg.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Teardown) => {
                            self.teardown(LifecycleState::TerminatedByPolicy).await;
                            return Ok(());
                        }
                        Err(e) => {
                            self.bus.publish(
                                Event::now(EventKind::MonitorError).with_error(e.to_string()),
                            );
                            self.teardown(LifecycleState::Exited).await;
                            return Err(e);
                        }
                    }
                }
                cmd = rx.recv() => match cmd {
                    Some(Command::Stop { done }) => {
                        self.teardown(LifecycleState::Exited).await;
                        let _ = done.send(());
                        return Ok(());
                    }
                    Some(Command::Restart { names, done }) => {
                        let res = self.restart_many(&names).await;
                        let _ = done.send(res);
                    }
                    // Facade gone: nothing can command us anymore; leave no
                    // orphans behind.
                    None => {
                        self.teardown(LifecycleState::Exited).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn teardown(&mut self, terminal: LifecycleState) {
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        tear_down_fleet(
            &mut self.children,
            &self.bus,
            &self.table,
            &self.cfg,
            terminal,
            &self.force,
        )
        .await;
    }

    /// One monitor tick. See the module docs for the step order.
    async fn tick(&mut self) -> Result<Flow, PilotError> {
        let mut exited: Vec<usize> = Vec::new();

        for (i, child) in self.children.iter_mut().enumerate() {
            let name = child.name().to_string();
            if let Some(status) = child.handle.try_reap() {
                self.bus.publish(
                    Event::now(EventKind::ProcessExited)
                        .with_process(&name)
                        .with_exit_code(status.code())
                        .with_restarts(child.handle.restarts()),
                );
                self.table.update(&name, |s| {
                    s.state = LifecycleState::Exited;
                    s.pid = None;
                });
                exited.push(i);
            } else if child.handle.state() == LifecycleState::Ready && child.handle.poll_alive() {
                // First tick that confirms liveness after READY.
                child.handle.set_state(LifecycleState::Running);
                self.table.set_state(&name, LifecycleState::Running);
                debug!(process = %name, "running");
            }
        }

        let batch = self.collect_stats(&exited);
        self.dispatch_stats(&batch).await;

        // ON_SHUTDOWN before any policy decision, restart included.
        for &i in &exited {
            let child = &self.children[i];
            let view = child.handle.view();
            let _ = run_hooks(HookKind::OnShutdown, &child.runtime, &view, &self.bus).await;
        }

        let fleet_shutdown = exited
            .iter()
            .any(|&i| self.children[i].runtime.spec.shutdown_strategy == ShutdownStrategy::ShutdownEverything);

        if fleet_shutdown {
            // The exited children leave the set first so teardown only
            // touches survivors (and does not re-fire their hooks).
            self.remove_children(&exited);
            return Ok(Flow::Teardown);
        }

        let mut remove: Vec<usize> = Vec::new();
        for &i in &exited {
            match self.children[i].runtime.spec.shutdown_strategy {
                ShutdownStrategy::DoNotRestart => remove.push(i),
                ShutdownStrategy::Restart => {
                    if !self.attempt_restart(i).await {
                        remove.push(i);
                    }
                }
                ShutdownStrategy::ShutdownEverything => unreachable!("handled above"),
            }
        }
        self.remove_children(&remove);

        Ok(Flow::Continue)
    }

    /// One stats entry per live child, skipping this tick's exits.
    fn collect_stats(&mut self, exited: &[usize]) -> Vec<ProcessStats> {
        let targets: Vec<(String, u32)> = self
            .children
            .iter()
            .enumerate()
            .filter(|(i, child)| !exited.contains(i) && child.handle.state().is_live())
            .filter_map(|(_, child)| child.handle.pid().map(|pid| (child.name().to_string(), pid)))
            .collect();

        let batch = self.collector.collect(&targets);
        for stats in &batch {
            if let Some(child) = self.children.iter_mut().find(|c| c.name() == stats.name) {
                child.handle.record_stats(stats.clone());
            }
            self.table
                .update(&stats.name, |s| s.stats = Some(stats.clone()));
        }
        batch
    }

    /// Hands the batch to every referenced handler; a broken observer must
    /// not crash supervision.
    async fn dispatch_stats(&self, batch: &[ProcessStats]) {
        if batch.is_empty() {
            return;
        }
        for (name, handler) in &self.stats_handlers {
            let outcome = std::panic::AssertUnwindSafe(handler.on_stats(batch))
                .catch_unwind()
                .await;
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(payload) => Some(format!("panic: {}", panic_message(payload))),
            };
            if let Some(message) = failure {
                warn!(handler = %name, error = %message, "stats handler failed");
                self.bus.publish(
                    Event::now(EventKind::StatsHandlerFailed)
                        .with_error(format!("{name}: {message}")),
                );
            }
        }
    }

    /// ON_RESTART → respawn → readiness. Returns `false` when the child
    /// could not come back and must be demoted to `do_not_restart`.
    async fn attempt_restart(&mut self, i: usize) -> bool {
        let runtime = Arc::clone(&self.children[i].runtime);
        let name = runtime.spec.name.clone();

        self.bus.publish(
            Event::now(EventKind::RestartScheduled)
                .with_process(&name)
                .with_restarts(self.children[i].handle.restarts() + 1),
        );
        let view = self.children[i].handle.view();
        let _ = run_hooks(HookKind::OnRestart, &runtime, &view, &self.bus).await;

        if let Err(e) = self.children[i].handle.spawn() {
            self.bus.publish(
                Event::now(EventKind::RestartAbandoned)
                    .with_process(&name)
                    .with_error(e.to_string()),
            );
            return false;
        }
        self.children[i].handle.mark_restarted();
        let pid = self.children[i].handle.pid();
        let started_at = self.children[i].handle.started_at();
        self.bus.publish(
            Event::now(EventKind::ProcessSpawned)
                .with_process(&name)
                .with_pid(pid.unwrap_or(0)),
        );
        self.table.update(&name, |s| {
            s.state = LifecycleState::Starting;
            s.pid = pid;
            s.started_at = started_at;
            s.restarts += 1;
        });

        if let Some((probe, timeout)) = runtime
            .probe
            .as_ref()
            .map(|p| (Arc::clone(&p.probe), p.timeout))
        {
            let deadline = Instant::now() + timeout;
            let view = self.children[i].handle.view();
            let status = wait_ready(
                probe.as_ref(),
                &view,
                deadline,
                self.cfg.probe_interval,
                &self.cancel,
            )
            .await;

            match status {
                Ok(ProbeStatus::Ready) => {}
                // Stop is underway; leave the fresh child in the set so the
                // coming teardown reaps it.
                Ok(ProbeStatus::Canceled) => return true,
                Ok(ProbeStatus::TimedOut) => {
                    self.bus.publish(
                        Event::now(EventKind::ReadyTimeout)
                            .with_process(&name)
                            .with_timeout(timeout),
                    );
                    return self.abandon_restart(i, "readiness probe timed out").await;
                }
                Err(fault) => {
                    return self
                        .abandon_restart(i, &format!("readiness probe failed: {fault}"))
                        .await;
                }
            }
        }

        self.children[i].handle.set_state(LifecycleState::Ready);
        self.table.set_state(&name, LifecycleState::Ready);
        self.bus
            .publish(Event::now(EventKind::ProcessReady).with_process(&name));
        true
    }

    /// Demote-and-log path for a failed restart.
    async fn abandon_restart(&mut self, i: usize, reason: &str) -> bool {
        let child = &mut self.children[i];
        let name = child.name().to_string();
        let grace = child.runtime.spec.stop_timeout();
        self.bus.publish(
            Event::now(EventKind::RestartAbandoned)
                .with_process(&name)
                .with_error(reason),
        );
        let _ = child.handle.request_stop(grace).await;
        self.table.update(&name, |s| {
            s.state = LifecycleState::Exited;
            s.pid = None;
        });
        false
    }

    /// Operator-driven restart: STOPPING → ON_RESTART → spawn → readiness.
    ///
    /// Validates every name against the active set before any side effects.
    async fn restart_many(&mut self, names: &[String]) -> Result<(), PilotError> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .children
                .iter()
                .position(|c| {
                    c.name() == name.as_str()
                        && matches!(
                            c.handle.state(),
                            LifecycleState::Ready | LifecycleState::Running
                        )
                })
                .ok_or_else(|| PilotError::UnknownProcess { name: name.clone() })?;
            indices.push(idx);
        }

        for idx in indices {
            if self.cancel.is_cancelled() {
                // A concurrent stop() preempts the remaining restarts.
                return Ok(());
            }
            let child = &mut self.children[idx];
            let name = child.name().to_string();
            let grace = child.runtime.spec.stop_timeout();
            self.bus
                .publish(Event::now(EventKind::ProcessStopping).with_process(&name));
            self.table.set_state(&name, LifecycleState::Stopping);
            let _ = child.handle.request_stop(grace).await;

            if !self.attempt_restart(idx).await {
                self.remove_children(&[idx]);
                return Err(PilotError::Startup {
                    process: name,
                    reason: "restart failed".into(),
                });
            }
        }
        Ok(())
    }

    /// Drops the given children (descending index order), unlinking their
    /// readiness pipes.
    fn remove_children(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        for i in sorted {
            let child = self.children.remove(i);
            self.bus
                .publish(Event::now(EventKind::ProcessRemoved).with_process(child.name()));
        }
    }
}
