//! # Plugin registry: names → capabilities.
//!
//! [`PluginRegistry`] holds, keyed by plugin-provided names, the hook
//! groups, readiness strategies, and stats handlers available to a manifest.
//! Stateless after registration closes at `start()`.
//!
//! ## Rules
//! - The built-in strategy names `tcp`, `file`, and `pipe` are reserved at
//!   construction; plugins cannot shadow them.
//! - Registering a capability name owned by a different plugin fails;
//!   re-registering the same plugin object is idempotent (`Arc::ptr_eq`).
//! - A single name may appear in more than one namespace when a plugin
//!   registers heterogeneous capabilities under the same name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CapabilityKind, ManifestError, PilotError};
use crate::manifest::{HookKind, ProcessManifest, ReadyCheck};
use crate::ready::{FileProbe, PipeProbe, TcpProbe};

use super::plugin::{HookRef, Plugin, ProbeRef, StatsRef};

/// Names reserved for the built-in readiness strategies.
const BUILTIN_STRATEGIES: [&str; 3] = ["tcp", "file", "pipe"];

/// Capability store shared by the facade, launcher, and monitor.
pub struct PluginRegistry {
    /// Registered plugin objects, for idempotent re-registration.
    plugins: HashMap<String, Arc<dyn Plugin>>,
    hook_groups: HashMap<String, HashMap<HookKind, Vec<HookRef>>>,
    probes: HashMap<String, ProbeRef>,
    stats: HashMap<String, StatsRef>,
}

impl PluginRegistry {
    /// Creates a registry with the built-in strategies reserved.
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            hook_groups: HashMap::new(),
            probes: HashMap::new(),
            stats: HashMap::new(),
        }
    }

    /// Pulls the plugin's declared capabilities into the registry.
    ///
    /// Fails with [`PilotError::DuplicateCapability`] if any name collides
    /// with a different implementation already present; re-registration of
    /// the same plugin object is a no-op.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PilotError> {
        let plugin_name = plugin.name().to_string();
        if let Some(existing) = self.plugins.get(&plugin_name) {
            if Arc::ptr_eq(existing, &plugin) {
                return Ok(());
            }
            return Err(PilotError::DuplicateCapability { name: plugin_name });
        }

        let hooks = plugin.hooks();
        let probes = plugin.probes();
        let stats = plugin.stats_handlers();

        for name in hooks.keys() {
            if self.hook_groups.contains_key(name) {
                return Err(PilotError::DuplicateCapability { name: name.clone() });
            }
        }
        for name in probes.keys() {
            if BUILTIN_STRATEGIES.contains(&name.as_str()) || self.probes.contains_key(name) {
                return Err(PilotError::DuplicateCapability { name: name.clone() });
            }
        }
        for name in stats.keys() {
            if self.stats.contains_key(name) {
                return Err(PilotError::DuplicateCapability { name: name.clone() });
            }
        }

        self.hook_groups.extend(hooks);
        self.probes.extend(probes);
        self.stats.extend(stats);
        self.plugins.insert(plugin_name, plugin);
        Ok(())
    }

    /// Resolves a validated readiness check to a runnable probe.
    ///
    /// Built-in checks construct their probe from the typed parameters;
    /// custom names fall through to registered plugins.
    pub fn resolve_probe(&self, check: &ReadyCheck) -> Result<ProbeRef, ManifestError> {
        match check {
            ReadyCheck::Tcp { host, port } => Ok(Arc::new(TcpProbe::new(host.clone(), *port))),
            ReadyCheck::File { path } => Ok(Arc::new(FileProbe::new(path.clone()))),
            ReadyCheck::Pipe { path } => Ok(Arc::new(PipeProbe::new(path.clone()))),
            ReadyCheck::Custom { name } => {
                self.probes
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ManifestError::UnknownCapability {
                        kind: CapabilityKind::Strategy,
                        name: name.clone(),
                    })
            }
        }
    }

    /// Resolves a hook group's callables for one transition kind.
    ///
    /// A known group with no callables for `kind` yields an empty slice.
    pub fn resolve_hooks(&self, group: &str, kind: HookKind) -> Result<&[HookRef], ManifestError> {
        let group_map =
            self.hook_groups
                .get(group)
                .ok_or_else(|| ManifestError::UnknownCapability {
                    kind: CapabilityKind::HookGroup,
                    name: group.to_string(),
                })?;
        Ok(group_map.get(&kind).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Resolves a stats handler by name.
    pub fn resolve_stats(&self, name: &str) -> Result<StatsRef, ManifestError> {
        self.stats
            .get(name)
            .cloned()
            .ok_or_else(|| ManifestError::UnknownCapability {
                kind: CapabilityKind::StatsHandler,
                name: name.to_string(),
            })
    }

    /// Checks that every capability the manifest references resolves here.
    ///
    /// Runs at the top of `start()`, after plugin registration closes and
    /// strictly before any child is spawned.
    pub fn validate_manifest(&self, manifest: &ProcessManifest) -> Result<(), ManifestError> {
        for spec in &manifest.processes {
            if let Some(check) = spec.ready_check()? {
                self.resolve_probe(&check)?;
            }
            for group in &spec.hooks {
                if !self.hook_groups.contains_key(group) {
                    return Err(ManifestError::UnknownCapability {
                        kind: CapabilityKind::HookGroup,
                        name: group.clone(),
                    });
                }
            }
            for handler in &spec.stats_handlers {
                self.resolve_stats(handler)?;
            }
        }
        Ok(())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::plugin::{HookFn, HookMap, ProbeFn, StatsFn};
    use std::collections::HashMap as Map;

    struct TestPlugin {
        name: &'static str,
        probe_name: &'static str,
    }

    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn hooks(&self) -> HookMap {
            let mut kinds = Map::new();
            kinds.insert(
                HookKind::PreStart,
                vec![HookFn::arc(|_: &crate::child::ChildView| Ok(()))],
            );
            Map::from([(format!("{}_hooks", self.name), kinds)])
        }

        fn probes(&self) -> Map<String, ProbeRef> {
            Map::from([(
                self.probe_name.to_string(),
                ProbeFn::arc(|_view| async { Ok(true) }),
            )])
        }

        fn stats_handlers(&self) -> Map<String, StatsRef> {
            Map::from([(
                format!("{}_stats", self.name),
                StatsFn::arc(|_: &[crate::child::ProcessStats]| Ok(())),
            )])
        }
    }

    #[test]
    fn registration_exposes_all_namespaces() {
        let mut reg = PluginRegistry::new();
        reg.register(Arc::new(TestPlugin {
            name: "probe",
            probe_name: "http",
        }))
        .unwrap();

        assert!(reg
            .resolve_probe(&ReadyCheck::Custom { name: "http".into() })
            .is_ok());
        assert_eq!(
            reg.resolve_hooks("probe_hooks", HookKind::PreStart).unwrap().len(),
            1
        );
        // Known group, no callables for that kind.
        assert!(reg
            .resolve_hooks("probe_hooks", HookKind::OnShutdown)
            .unwrap()
            .is_empty());
        assert!(reg.resolve_stats("probe_stats").is_ok());
    }

    #[test]
    fn same_object_registration_is_idempotent() {
        let mut reg = PluginRegistry::new();
        let plugin = Arc::new(TestPlugin {
            name: "p",
            probe_name: "http",
        });
        reg.register(plugin.clone()).unwrap();
        reg.register(plugin).unwrap();
    }

    #[test]
    fn different_object_with_same_name_is_rejected() {
        let mut reg = PluginRegistry::new();
        reg.register(Arc::new(TestPlugin {
            name: "p",
            probe_name: "http",
        }))
        .unwrap();
        let err = reg
            .register(Arc::new(TestPlugin {
                name: "p",
                probe_name: "http2",
            }))
            .unwrap_err();
        assert!(matches!(err, PilotError::DuplicateCapability { .. }));
    }

    #[test]
    fn builtin_strategy_names_are_reserved() {
        let mut reg = PluginRegistry::new();
        let err = reg
            .register(Arc::new(TestPlugin {
                name: "shadow",
                probe_name: "tcp",
            }))
            .unwrap_err();
        assert!(matches!(
            err,
            PilotError::DuplicateCapability { ref name } if name == "tcp"
        ));
    }

    #[test]
    fn unknown_capability_lookups_fail() {
        let reg = PluginRegistry::new();
        assert!(matches!(
            reg.resolve_probe(&ReadyCheck::Custom { name: "nope".into() }),
            Err(ManifestError::UnknownCapability { .. })
        ));
        assert!(reg.resolve_hooks("nope", HookKind::PreStart).is_err());
        assert!(reg.resolve_stats("nope").is_err());
    }

    #[test]
    fn builtin_checks_resolve_without_plugins() {
        let reg = PluginRegistry::new();
        assert!(reg
            .resolve_probe(&ReadyCheck::Tcp {
                host: "127.0.0.1".into(),
                port: 80
            })
            .is_ok());
        assert!(reg
            .resolve_probe(&ReadyCheck::File {
                path: "/tmp/r".into()
            })
            .is_ok());
    }
}
