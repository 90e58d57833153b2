//! # Plugin capability traits.
//!
//! A [`Plugin`] bundles three kinds of capabilities under plugin-provided
//! names:
//!
//! - **[`LifecycleHook`]**: callables fired at named transitions
//!   (pre_start / post_start / on_shutdown / on_restart), grouped under
//!   hook-group names that manifest entries reference via `hooks`.
//! - **[`ReadyProbe`]**: readiness strategies referenced via
//!   `ready_strategy`.
//! - **[`StatsHandler`]**: per-tick consumers of fleet resource metrics,
//!   referenced via `stats_handlers`.
//!
//! ## Contract
//! - Callables are awaited inline on the supervisor's control path; bounding
//!   long-running work is the plugin's responsibility.
//! - A PRE_START failure aborts that child's start. POST_START, ON_SHUTDOWN,
//!   ON_RESTART, and stats-handler failures are logged and supervision
//!   continues.
//! - Callables receive a [`ChildView`] and must not retain it past the call.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::child::{ChildView, ProcessStats};
use crate::manifest::HookKind;

/// Shared handle to a lifecycle hook.
pub type HookRef = Arc<dyn LifecycleHook>;
/// Shared handle to a readiness probe.
pub type ProbeRef = Arc<dyn ReadyProbe>;
/// Shared handle to a stats handler.
pub type StatsRef = Arc<dyn StatsHandler>;
/// Hook-group name → hooks per transition kind.
pub type HookMap = HashMap<String, HashMap<HookKind, Vec<HookRef>>>;

/// Callable fired at a named lifecycle transition of one child.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Runs the hook for `child`. `child.pid()` is `None` during PRE_START.
    async fn run(&self, child: &ChildView) -> anyhow::Result<()>;
}

/// One readiness strategy: a repeatable, cheap check.
///
/// The supervisor drives the deadline loop; implementations answer a single
/// question per call. Transient conditions (connection refused, file not yet
/// present) are `Ok(false)`, not errors; `Err` aborts the start.
#[async_trait]
pub trait ReadyProbe: Send + Sync {
    /// One probe attempt. `Ok(true)` means ready.
    async fn poll_once(&self, child: &ChildView) -> anyhow::Result<bool>;
}

/// Per-tick consumer of fleet resource metrics.
#[async_trait]
pub trait StatsHandler: Send + Sync {
    /// Receives one freshly built batch per monitor tick: one entry per
    /// currently-running child, no duplicates. The batch is owned by the
    /// handler after the call.
    async fn on_stats(&self, batch: &[ProcessStats]) -> anyhow::Result<()>;
}

/// A named bundle of capabilities to register with the supervisor.
///
/// The default methods return empty maps so a plugin only implements the
/// capability kinds it provides.
pub trait Plugin: Send + Sync {
    /// Stable plugin name, used for diagnostics and idempotent
    /// re-registration.
    fn name(&self) -> &str;

    /// Hook groups keyed by group name.
    fn hooks(&self) -> HookMap {
        HashMap::new()
    }

    /// Readiness strategies keyed by strategy name.
    fn probes(&self) -> HashMap<String, ProbeRef> {
        HashMap::new()
    }

    /// Stats handlers keyed by handler name.
    fn stats_handlers(&self) -> HashMap<String, StatsRef> {
        HashMap::new()
    }
}

/// Function-backed [`LifecycleHook`], for closures and tests.
pub struct HookFn<F>(F);

impl<F> HookFn<F>
where
    F: Fn(&ChildView) -> anyhow::Result<()> + Send + Sync + 'static,
{
    /// Wraps a synchronous closure as a shared hook.
    pub fn arc(f: F) -> HookRef {
        Arc::new(HookFn(f))
    }
}

#[async_trait]
impl<F> LifecycleHook for HookFn<F>
where
    F: Fn(&ChildView) -> anyhow::Result<()> + Send + Sync,
{
    async fn run(&self, child: &ChildView) -> anyhow::Result<()> {
        (self.0)(child)
    }
}

/// Function-backed [`ReadyProbe`], for closures and tests.
pub struct ProbeFn<F>(F);

impl<F, Fut> ProbeFn<F>
where
    F: Fn(ChildView) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    /// Wraps an async closure as a shared probe.
    pub fn arc(f: F) -> ProbeRef {
        Arc::new(ProbeFn(f))
    }
}

#[async_trait]
impl<F, Fut> ReadyProbe for ProbeFn<F>
where
    F: Fn(ChildView) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn poll_once(&self, child: &ChildView) -> anyhow::Result<bool> {
        (self.0)(child.clone()).await
    }
}

/// Function-backed [`StatsHandler`], for closures and tests.
pub struct StatsFn<F>(F);

impl<F> StatsFn<F>
where
    F: Fn(&[ProcessStats]) -> anyhow::Result<()> + Send + Sync + 'static,
{
    /// Wraps a synchronous closure as a shared stats handler.
    pub fn arc(f: F) -> StatsRef {
        Arc::new(StatsFn(f))
    }
}

#[async_trait]
impl<F> StatsHandler for StatsFn<F>
where
    F: Fn(&[ProcessStats]) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_stats(&self, batch: &[ProcessStats]) -> anyhow::Result<()> {
        (self.0)(batch)
    }
}
