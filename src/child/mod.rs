mod handle;
mod state;
mod stats;

pub use handle::{ChildHandle, ChildView, StopOutcome};
pub use state::LifecycleState;
pub use stats::{ProcessStats, StatsCollector};
