//! # process-pilot
//!
//! **process-pilot** is a manifest-driven process supervisor.
//!
//! Given a declarative manifest of child programs and their dependencies, it
//! launches each program in dependency order, waits until it is observably
//! "ready", monitors liveness and resource usage, responds to exits per a
//! per-process shutdown policy, and tears the whole fleet down gracefully on
//! an operator signal.
//!
//! ## Features
//!
//! | Area            | Description                                                      | Key types / traits                      |
//! |-----------------|------------------------------------------------------------------|-----------------------------------------|
//! | **Manifest**    | JSON/YAML process specs with dependencies and policies.          | [`ProcessManifest`], [`ProcessSpec`]    |
//! | **Scheduling**  | Topological start batches with readiness gating.                 | [`StartPlan`]                           |
//! | **Readiness**   | TCP / file / pipe probes plus registry fall-through.             | [`ReadyProbe`]                          |
//! | **Supervision** | Monitor loop, shutdown policies, restart handling.               | [`ProcessPilot`], [`ShutdownStrategy`]  |
//! | **Plugins**     | Lifecycle hooks, custom probes, stats consumers.                 | [`Plugin`], [`LifecycleHook`], [`StatsHandler`] |
//! | **Errors**      | Typed errors for validation and runtime failures.                | [`ManifestError`], [`PilotError`]       |
//!
//! ```no_run
//! use process_pilot::{PilotConfig, ProcessManifest, ProcessPilot};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manifest = ProcessManifest::from_json(r#"{
//!         "processes": [
//!             {
//!                 "name": "db",
//!                 "path": "/usr/local/bin/run-db",
//!                 "ready_strategy": "tcp",
//!                 "ready_timeout_sec": 5.0,
//!                 "ready_params": {"port": 15432}
//!             },
//!             {"name": "api", "path": "/usr/local/bin/api", "dependencies": ["db"]}
//!         ]
//!     }"#)?;
//!
//!     let pilot = ProcessPilot::new(manifest, PilotConfig::default())?;
//!     pilot.start().await?;
//!     pilot.wait_terminated().await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod child;
mod config;
mod core;
mod error;
mod events;
pub mod export;
mod manifest;
mod plugins;
mod ready;

// ---- Public re-exports ----

pub use child::{ChildHandle, ChildView, LifecycleState, ProcessStats, StatsCollector, StopOutcome};
pub use config::PilotConfig;
pub use crate::core::{ProcessPilot, ProcessStatus};
pub use error::{CapabilityKind, ManifestError, PilotError};
pub use events::{Event, EventKind};
pub use manifest::{HookKind, ProcessManifest, ProcessSpec, ReadyCheck, ShutdownStrategy, StartPlan};
pub use plugins::{
    HookFn, HookMap, HookRef, LifecycleHook, Plugin, ProbeFn, ProbeRef, ReadyProbe, StatsFn,
    StatsHandler, StatsRef,
};
