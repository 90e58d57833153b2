//! # Global runtime configuration.
//!
//! [`PilotConfig`] defines the supervisor's timing behavior: how often the
//! monitor loop polls children, how often readiness probes re-check, the
//! event bus capacity, and an optional global bound on fleet teardown.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use process_pilot::PilotConfig;
//!
//! let mut cfg = PilotConfig::default();
//! cfg.tick_interval = Duration::from_millis(50);
//! cfg.stop_deadline = Some(Duration::from_secs(30));
//!
//! assert_eq!(cfg.tick_interval, Duration::from_millis(50));
//! ```

use std::time::Duration;

/// Global configuration for the supervisor runtime.
///
/// Controls monitor tick cadence, readiness probe cadence, event bus
/// capacity, and the optional global teardown deadline.
#[derive(Clone, Debug)]
pub struct PilotConfig {
    /// Interval between monitor loop ticks.
    pub tick_interval: Duration,
    /// Interval between readiness probe attempts.
    pub probe_interval: Duration,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// Optional global bound on fleet teardown. `None` means teardown waits
    /// for each child's own graceful timeout in reverse start order; with a
    /// deadline set, children past the budget are force-killed.
    pub stop_deadline: Option<Duration>,
}

impl Default for PilotConfig {
    /// Provides a default configuration:
    /// - `tick_interval = 100ms`
    /// - `probe_interval = 100ms`
    /// - `bus_capacity = 1024`
    /// - `stop_deadline = None` (per-child timeouts only)
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            probe_interval: Duration::from_millis(100),
            bus_capacity: 1024,
            stop_deadline: None,
        }
    }
}
