//! # Error types used by the process-pilot runtime.
//!
//! This module defines two main error enums:
//!
//! - [`ManifestError`] errors raised while validating a process manifest,
//!   before any child process has been spawned.
//! - [`PilotError`] errors raised by the supervision runtime itself.
//!
//! Both types provide an `as_label` helper that yields a short stable
//! snake_case label for logs and metrics.

use std::time::Duration;

use thiserror::Error;

/// Which registry namespace a capability name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    /// A readiness strategy (`ready_strategy`).
    Strategy,
    /// A lifecycle hook group (`hooks`).
    HookGroup,
    /// A stats handler (`stats_handlers`).
    StatsHandler,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CapabilityKind::Strategy => "ready strategy",
            CapabilityKind::HookGroup => "hook group",
            CapabilityKind::StatsHandler => "stats handler",
        };
        f.write_str(s)
    }
}

/// # Errors raised during manifest validation.
///
/// Raised strictly before any child process starts; there are no side
/// effects to clean up when one of these surfaces.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest did not match the expected schema (parse errors,
    /// out-of-range values, missing required fields).
    #[error("manifest schema violation: {message}")]
    SchemaViolation { message: String },

    /// Two processes share the same name.
    #[error("duplicate process name '{name}'")]
    DuplicateName { name: String },

    /// A dependency references a process name that is not in the manifest.
    #[error("process '{process}' depends on unknown process '{dependency}'")]
    UnknownDependency { process: String, dependency: String },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// A referenced strategy / hook group / stats handler does not resolve
    /// in the plugin registry.
    #[error("unknown {kind} '{name}'")]
    UnknownCapability { kind: CapabilityKind, name: String },

    /// `ready_params` is missing a key required by the declared strategy.
    #[error("process '{process}': ready strategy '{strategy}' requires param '{param}'")]
    MissingReadyParam {
        process: String,
        strategy: String,
        param: String,
    },
}

impl ManifestError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManifestError::SchemaViolation { .. } => "manifest_schema_violation",
            ManifestError::DuplicateName { .. } => "manifest_duplicate_name",
            ManifestError::UnknownDependency { .. } => "manifest_unknown_dependency",
            ManifestError::CycleDetected { .. } => "manifest_cycle_detected",
            ManifestError::UnknownCapability { .. } => "manifest_unknown_capability",
            ManifestError::MissingReadyParam { .. } => "manifest_missing_ready_param",
        }
    }
}

/// # Errors raised by the supervision runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PilotError {
    /// The manifest failed validation.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A child failed a PRE_START hook, failed to spawn, or failed to become
    /// ready within its deadline. Whatever had already started has been torn
    /// down in reverse start order by the time this surfaces.
    #[error("process '{process}' failed to start: {reason}")]
    Startup { process: String, reason: String },

    /// A plugin-provided callable failed or panicked.
    ///
    /// Fatal only for PRE_START hooks; elsewhere it is logged and
    /// supervision continues.
    #[error("plugin callable '{name}' failed during {stage}: {message}")]
    Plugin {
        name: String,
        stage: &'static str,
        message: String,
    },

    /// A child ignored graceful stop past its configured timeout and was
    /// escalated to SIGKILL. The stop operation itself still succeeds.
    #[error("process '{process}' ignored graceful stop for {timeout:?}")]
    StopTimeout { process: String, timeout: Duration },

    /// `restart_processes` received a name that is not in the manifest or
    /// not currently supervised.
    #[error("unknown process '{name}'")]
    UnknownProcess { name: String },

    /// A plugin tried to register a capability name that a different plugin
    /// already owns. Re-registering the same plugin object is idempotent.
    #[error("capability '{name}' is already registered by a different plugin")]
    DuplicateCapability { name: String },

    /// The facade was asked to start twice, or mutated after starting.
    #[error("supervisor already started")]
    AlreadyStarted,

    /// An operation that requires a running fleet was called before `start`.
    #[error("supervisor not started")]
    NotStarted,

    /// Unexpected internal failure. The monitor loop never dies silently:
    /// this triggers fleet teardown before it surfaces.
    #[error("internal supervision error: {message}")]
    Internal { message: String },
}

impl PilotError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PilotError::Manifest(e) => e.as_label(),
            PilotError::Startup { .. } => "pilot_startup_failure",
            PilotError::Plugin { .. } => "pilot_plugin_failure",
            PilotError::StopTimeout { .. } => "pilot_stop_timeout",
            PilotError::UnknownProcess { .. } => "pilot_unknown_process",
            PilotError::DuplicateCapability { .. } => "pilot_duplicate_capability",
            PilotError::AlreadyStarted => "pilot_already_started",
            PilotError::NotStarted => "pilot_not_started",
            PilotError::Internal { .. } => "pilot_internal",
        }
    }
}
