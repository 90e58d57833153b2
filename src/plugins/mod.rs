mod plugin;
mod registry;

pub use plugin::{
    HookFn, HookMap, HookRef, LifecycleHook, Plugin, ProbeFn, ProbeRef, ReadyProbe, StatsFn,
    StatsHandler, StatsRef,
};
pub use registry::PluginRegistry;
