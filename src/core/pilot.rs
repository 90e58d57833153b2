//! # ProcessPilot: the supervision facade.
//!
//! [`ProcessPilot`] owns the runtime components (event bus, state table,
//! cancellation tokens) and orchestrates the fleet from manifest validation
//! through dependency-ordered startup, monitoring, and graceful teardown.
//!
//! ## Architecture
//! ```text
//! ProcessManifest ──► ProcessPilot::new()        validate + plan batches
//!                          │
//!      register_plugins()  │  (pre-start only)
//!                          ▼
//!                     start()
//!                          ├──► resolve capabilities (registry closes)
//!                          ├──► launch_fleet()      batch by batch, readiness-gated
//!                          ├──► spawn MonitorLoop   (single control path)
//!                          └──► spawn signal watcher
//!                          │
//!            stop() ───────┼──► cancel token + Stop command ──► teardown
//!   restart_processes() ───┴──► Restart command ──► stop/respawn/readiness
//! ```
//!
//! ## Rules
//! - `start()` blocks until every child is READY, or until post-failure
//!   teardown completes; calling it twice yields `AlreadyStarted`.
//! - `stop()` is idempotent; the second call returns immediately.
//! - The facade never touches child handles directly after `start()`: all
//!   mutation flows through the monitor's command channel.
//! - The first SIGINT/SIGTERM triggers `stop()` exactly once; a second
//!   signal force-kills stragglers.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PilotConfig;
use crate::error::PilotError;
use crate::events::{Bus, EventLogger};
use crate::manifest::{ProcessManifest, StartPlan};
use crate::plugins::{Plugin, PluginRegistry};

use super::command::Command;
use super::fleet::resolve_fleet;
use super::launcher::launch_fleet;
use super::monitor::MonitorLoop;
use super::signals::spawn_signal_watcher;
use super::table::{ProcessStatus, StateTable};

/// Facade lifecycle.
enum Phase {
    Idle,
    Running {
        tx: mpsc::Sender<Command>,
        monitor: Option<JoinHandle<Result<(), PilotError>>>,
    },
    Terminated,
}

/// Manifest-driven process supervisor.
pub struct ProcessPilot {
    cfg: PilotConfig,
    manifest: Arc<ProcessManifest>,
    plan: StartPlan,
    registry: Mutex<PluginRegistry>,
    bus: Bus,
    table: Arc<StateTable>,
    /// Runtime token: canceled on stop, preempts readiness waits.
    cancel: CancellationToken,
    /// Escalation token: canceled on a second operator signal.
    force: CancellationToken,
    phase: Mutex<Phase>,
}

impl std::fmt::Debug for ProcessPilot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPilot").finish_non_exhaustive()
    }
}

impl ProcessPilot {
    /// Validates the manifest, plans start batches, and prepares the
    /// registry with the built-in readiness strategies.
    ///
    /// Fails with a manifest-error kind if any invariant does not hold; no
    /// process has started at that point.
    pub fn new(manifest: ProcessManifest, cfg: PilotConfig) -> Result<Self, PilotError> {
        manifest.validate()?;
        let plan = StartPlan::build(&manifest)?;
        let table = StateTable::seed(manifest.processes.iter().map(|s| s.name.as_str()));
        let bus = Bus::new(cfg.bus_capacity);

        Ok(Self {
            cfg,
            manifest: Arc::new(manifest),
            plan,
            registry: Mutex::new(PluginRegistry::new()),
            bus,
            table: Arc::new(table),
            cancel: CancellationToken::new(),
            force: CancellationToken::new(),
            phase: Mutex::new(Phase::Idle),
        })
    }

    /// Registers plugins. Legal only before `start()`.
    pub async fn register_plugins(
        &self,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Result<(), PilotError> {
        let phase = self.phase.lock().await;
        if !matches!(*phase, Phase::Idle) {
            return Err(PilotError::AlreadyStarted);
        }
        let mut registry = self.registry.lock().await;
        for plugin in plugins {
            registry.register(plugin)?;
        }
        Ok(())
    }

    /// Starts the fleet: resolves capabilities, launches batches in
    /// dependency order with readiness gating, then hands the active set to
    /// the monitor loop.
    ///
    /// Blocks until every child is READY. On a startup failure, blocks until
    /// the reverse-order teardown of whatever had started completes, then
    /// surfaces the failure.
    pub async fn start(&self) -> Result<(), PilotError> {
        let mut phase = self.phase.lock().await;
        if !matches!(*phase, Phase::Idle) {
            return Err(PilotError::AlreadyStarted);
        }

        let (runtimes, stats_handlers) = {
            let registry = self.registry.lock().await;
            resolve_fleet(&self.manifest, &registry)?
        };

        let _logger = EventLogger::spawn(self.bus.subscribe());

        let children = match launch_fleet(
            &runtimes,
            &self.plan,
            &self.bus,
            &self.table,
            &self.cfg,
            &self.cancel,
            &self.force,
        )
        .await
        {
            Ok(children) => children,
            Err(e) => {
                *phase = Phase::Terminated;
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(16);
        let monitor = MonitorLoop::new(
            self.cfg.clone(),
            self.bus.clone(),
            Arc::clone(&self.table),
            children,
            stats_handlers,
            self.cancel.clone(),
            self.force.clone(),
        );
        let handle = tokio::spawn(monitor.run(rx));
        let _watcher = spawn_signal_watcher(
            tx.clone(),
            self.bus.clone(),
            self.cancel.clone(),
            self.force.clone(),
        );

        *phase = Phase::Running {
            tx,
            monitor: Some(handle),
        };
        Ok(())
    }

    /// Initiates fleet teardown and blocks until the active set is clear.
    ///
    /// Idempotent: once terminated, further calls return immediately. Before
    /// `start()` it is a lifecycle misuse (`NotStarted`).
    pub async fn stop(&self) -> Result<(), PilotError> {
        let mut phase = self.phase.lock().await;
        match &mut *phase {
            Phase::Idle => Err(PilotError::NotStarted),
            Phase::Terminated => Ok(()),
            Phase::Running { tx, monitor } => {
                // Preempt readiness waits and in-flight restarts first.
                self.cancel.cancel();

                let (done_tx, done_rx) = oneshot::channel();
                if tx.send(Command::Stop { done: done_tx }).await.is_ok() {
                    // A dropped ack means the monitor tore down on its own.
                    let _ = done_rx.await;
                }
                if let Some(handle) = monitor.take() {
                    let _ = handle.await;
                }
                *phase = Phase::Terminated;
                Ok(())
            }
        }
    }

    /// Stops and respawns the named processes, readiness-gated.
    ///
    /// Validates every name against the manifest before any side effects;
    /// the monitor additionally requires each target to be currently
    /// supervised and live. A concurrent `stop()` preempts the restarts.
    pub async fn restart_processes(&self, names: &[&str]) -> Result<(), PilotError> {
        for &name in names {
            if self.manifest.get(name).is_none() {
                return Err(PilotError::UnknownProcess {
                    name: name.to_string(),
                });
            }
        }

        let phase = self.phase.lock().await;
        let Phase::Running { tx, .. } = &*phase else {
            return Err(PilotError::NotStarted);
        };

        let (done_tx, done_rx) = oneshot::channel();
        tx.send(Command::Restart {
            names: names.iter().map(|n| n.to_string()).collect(),
            done: done_tx,
        })
        .await
        .map_err(|_| PilotError::NotStarted)?;
        done_rx.await.map_err(|_| PilotError::Internal {
            message: "monitor dropped a restart acknowledgement".into(),
        })?
    }

    /// Blocks until the monitor loop exits (operator stop, a
    /// `shutdown_everything` exit, or an internal error).
    ///
    /// An internal monitor error surfaces here (the fleet is already torn
    /// down by then).
    pub async fn wait_terminated(&self) -> Result<(), PilotError> {
        let mut phase = self.phase.lock().await;
        match &mut *phase {
            Phase::Idle => Err(PilotError::NotStarted),
            Phase::Terminated => Ok(()),
            Phase::Running { monitor, .. } => {
                let outcome = match monitor.take() {
                    Some(handle) => match handle.await {
                        Ok(res) => res,
                        Err(join_err) => Err(PilotError::Internal {
                            message: format!("monitor task panicked: {join_err}"),
                        }),
                    },
                    None => Ok(()),
                };
                *phase = Phase::Terminated;
                outcome
            }
        }
    }

    /// Observable status of one process.
    pub fn status(&self, name: &str) -> Option<ProcessStatus> {
        self.table.status(name)
    }

    /// Observable status of the whole fleet, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, ProcessStatus)> {
        self.table.snapshot()
    }

    /// Subscribes to the runtime event stream.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<crate::events::Event> {
        self.bus.subscribe()
    }
}
