//! # Manifest loading and structural validation.
//!
//! [`ProcessManifest`] is the ordered set of [`ProcessSpec`]s. It loads from
//! JSON or YAML (interchangeable, chosen by file extension) under a strict
//! schema, and [`ProcessManifest::validate`] checks every invariant that can
//! be checked without the plugin registry:
//!
//! - names are unique and non-empty
//! - timing fields are in range (`timeout >= 0`, `ready_timeout_sec > 0`)
//! - `ready_strategy` and `ready_timeout_sec` come as a pair
//! - `ready_params` carries the keys its strategy requires
//!
//! Dependency resolution and cycle detection live in
//! [`StartPlan::build`](super::graph::StartPlan::build); capability
//! resolution runs at `start()` once plugins are registered.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::ManifestError;

use super::spec::ProcessSpec;

/// The ordered sequence of process specs from one manifest file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessManifest {
    /// Process specs in declaration order.
    pub processes: Vec<ProcessSpec>,
}

impl ProcessManifest {
    /// Parses a JSON manifest.
    pub fn from_json(data: &str) -> Result<Self, ManifestError> {
        serde_json::from_str(data).map_err(|e| ManifestError::SchemaViolation {
            message: e.to_string(),
        })
    }

    /// Parses a YAML manifest.
    pub fn from_yaml(data: &str) -> Result<Self, ManifestError> {
        serde_yaml::from_str(data).map_err(|e| ManifestError::SchemaViolation {
            message: e.to_string(),
        })
    }

    /// Loads a manifest from disk, picking the parser by file extension
    /// (`.json`, `.yaml`, `.yml`).
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let data = std::fs::read_to_string(path).map_err(|e| ManifestError::SchemaViolation {
            message: format!("cannot read manifest {}: {e}", path.display()),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&data),
            Some("yaml") | Some("yml") => Self::from_yaml(&data),
            other => Err(ManifestError::SchemaViolation {
                message: format!(
                    "manifest must be a .json or .yaml file, got {:?}",
                    other.unwrap_or("")
                ),
            }),
        }
    }

    /// Finds a spec by name.
    pub fn get(&self, name: &str) -> Option<&ProcessSpec> {
        self.processes.iter().find(|s| s.name == name)
    }

    /// Checks every structural invariant (see module docs).
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.processes.len());
        for spec in &self.processes {
            if spec.name.is_empty() {
                return Err(ManifestError::SchemaViolation {
                    message: "process name must be non-empty".into(),
                });
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ManifestError::DuplicateName {
                    name: spec.name.clone(),
                });
            }
            if spec.path.as_os_str().is_empty() {
                return Err(ManifestError::SchemaViolation {
                    message: format!("process '{}': path must be non-empty", spec.name),
                });
            }
            if !spec.timeout.is_finite() || spec.timeout < 0.0 {
                return Err(ManifestError::SchemaViolation {
                    message: format!("process '{}': timeout must be >= 0", spec.name),
                });
            }
            match (&spec.ready_strategy, spec.ready_timeout_sec) {
                (Some(_), None) => {
                    return Err(ManifestError::SchemaViolation {
                        message: format!(
                            "process '{}': ready_timeout_sec is required with ready_strategy",
                            spec.name
                        ),
                    });
                }
                (None, Some(_)) => {
                    return Err(ManifestError::SchemaViolation {
                        message: format!(
                            "process '{}': ready_timeout_sec without ready_strategy",
                            spec.name
                        ),
                    });
                }
                (Some(_), Some(t)) if !t.is_finite() || t <= 0.0 => {
                    return Err(ManifestError::SchemaViolation {
                        message: format!("process '{}': ready_timeout_sec must be > 0", spec.name),
                    });
                }
                _ => {}
            }
            // Strategy param validation (MissingReadyParam and friends).
            spec.ready_check()?;
        }
        Ok(())
    }
}
