//! # Declarative description of one managed process.
//!
//! [`ProcessSpec`] is the manifest entry: executable, arguments, environment,
//! dependencies, shutdown policy, readiness strategy, and the plugin
//! capabilities (hook groups, stats handlers) wired to the process.
//!
//! Specs are immutable once loaded. Timing fields are stored as seconds
//! (matching the manifest wire format) and exposed as [`Duration`]s.
//!
//! ## Rules
//! - Unknown manifest fields are rejected (strict schema).
//! - `ready_timeout_sec` is required iff `ready_strategy` is set.
//! - `ready_params` keys depend on the strategy; [`ReadyCheck::from_spec`]
//!   validates them and produces the tagged, typed form.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ManifestError;

/// What the supervisor does when a managed process exits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStrategy {
    /// Respawn the process immediately (default).
    #[default]
    Restart,
    /// Leave it dead; surviving dependents continue.
    DoNotRestart,
    /// Take the whole fleet down with it.
    ShutdownEverything,
}

/// Named transition at which a lifecycle hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Before the OS process is spawned.
    PreStart,
    /// After the OS process is spawned, before readiness.
    PostStart,
    /// After the process is observed EXITED, before any restart.
    OnShutdown,
    /// After ON_SHUTDOWN and before the replacement spawn.
    OnRestart,
}

impl HookKind {
    /// All hook kinds, in lifecycle order.
    pub const ALL: [HookKind; 4] = [
        HookKind::PreStart,
        HookKind::PostStart,
        HookKind::OnShutdown,
        HookKind::OnRestart,
    ];

    /// Short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HookKind::PreStart => "pre_start",
            HookKind::PostStart => "post_start",
            HookKind::OnShutdown => "on_shutdown",
            HookKind::OnRestart => "on_restart",
        }
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One manifest entry: a process under supervision.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessSpec {
    /// Unique, non-empty name.
    pub name: String,
    /// Absolute or PATH-resolvable executable.
    pub path: PathBuf,
    /// Arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment entries merged over the supervisor's inherited
    /// environment; entries win.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the child.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Seconds allotted to a graceful stop before force-kill.
    #[serde(default = "default_timeout_sec")]
    pub timeout: f64,
    /// What to do when the process exits on its own.
    #[serde(default)]
    pub shutdown_strategy: ShutdownStrategy,
    /// Name of the readiness strategy, resolved against built-ins first and
    /// then the plugin registry.
    #[serde(default)]
    pub ready_strategy: Option<String>,
    /// Seconds allotted to the readiness probe. Required iff
    /// `ready_strategy` is set.
    #[serde(default)]
    pub ready_timeout_sec: Option<f64>,
    /// Strategy-specific parameters (e.g. `port`, `path`).
    #[serde(default)]
    pub ready_params: HashMap<String, Value>,
    /// Names of processes that must be READY before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Hook-group names resolved in the plugin registry.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// Stats-handler names resolved in the plugin registry.
    #[serde(default)]
    pub stats_handlers: Vec<String>,
}

fn default_timeout_sec() -> f64 {
    10.0
}

impl ProcessSpec {
    /// Graceful-stop budget as a [`Duration`].
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.0))
    }

    /// Readiness deadline budget as a [`Duration`], if a strategy is declared.
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_sec.map(Duration::from_secs_f64)
    }

    /// Builds the typed readiness check from `ready_strategy` /
    /// `ready_params`, validating required parameters.
    pub fn ready_check(&self) -> Result<Option<ReadyCheck>, ManifestError> {
        let Some(strategy) = self.ready_strategy.as_deref() else {
            return Ok(None);
        };
        ReadyCheck::from_spec(&self.name, strategy, &self.ready_params).map(Some)
    }
}

/// Tagged, validated form of a readiness strategy declaration.
///
/// The three built-in strategies get typed parameters here; anything else
/// falls through to the plugin registry by name.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyCheck {
    /// Ready iff a TCP connect to `host:port` succeeds.
    Tcp { host: String, port: u16 },
    /// Ready iff `path` exists as a regular file.
    File { path: PathBuf },
    /// Ready iff a read from the named pipe at `path` yields the token
    /// `ready`.
    Pipe { path: PathBuf },
    /// Registry-provided strategy.
    Custom { name: String },
}

impl ReadyCheck {
    const DEFAULT_TCP_HOST: &'static str = "127.0.0.1";

    /// Parses and validates a strategy declaration for `process`.
    pub fn from_spec(
        process: &str,
        strategy: &str,
        params: &HashMap<String, Value>,
    ) -> Result<Self, ManifestError> {
        match strategy {
            "tcp" => {
                let port = require_param(process, strategy, params, "port")?;
                let port = port
                    .as_u64()
                    .filter(|p| (1..=65535).contains(p))
                    .ok_or_else(|| ManifestError::SchemaViolation {
                        message: format!(
                            "process '{process}': tcp ready param 'port' must be in 1..=65535"
                        ),
                    })? as u16;
                let host = match params.get("host") {
                    None => Self::DEFAULT_TCP_HOST.to_string(),
                    Some(v) => as_string(process, strategy, "host", v)?,
                };
                Ok(ReadyCheck::Tcp { host, port })
            }
            "file" => {
                let raw = require_param(process, strategy, params, "path")?;
                let path = PathBuf::from(as_string(process, strategy, "path", raw)?);
                if !path.is_absolute() {
                    return Err(ManifestError::SchemaViolation {
                        message: format!(
                            "process '{process}': file ready param 'path' must be absolute"
                        ),
                    });
                }
                Ok(ReadyCheck::File { path })
            }
            "pipe" => {
                let raw = require_param(process, strategy, params, "path")?;
                let path = PathBuf::from(as_string(process, strategy, "path", raw)?);
                Ok(ReadyCheck::Pipe { path })
            }
            custom => Ok(ReadyCheck::Custom {
                name: custom.to_string(),
            }),
        }
    }
}

fn require_param<'a>(
    process: &str,
    strategy: &str,
    params: &'a HashMap<String, Value>,
    key: &str,
) -> Result<&'a Value, ManifestError> {
    params
        .get(key)
        .ok_or_else(|| ManifestError::MissingReadyParam {
            process: process.to_string(),
            strategy: strategy.to_string(),
            param: key.to_string(),
        })
}

fn as_string(
    process: &str,
    strategy: &str,
    key: &str,
    value: &Value,
) -> Result<String, ManifestError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ManifestError::SchemaViolation {
            message: format!("process '{process}': {strategy} ready param '{key}' must be a string"),
        })
}
