//! # Shared, read-mostly view of fleet state.
//!
//! [`StateTable`] is the observable side of supervision: the launcher and
//! monitor loop (the single control path) write lifecycle transitions, pids,
//! restart counts, and stats snapshots; the facade and external callers read
//! them concurrently without touching the control path.
//!
//! ## Rules
//! - Only the control path writes; readers get clones.
//! - Entries survive process removal so a caller can still observe the
//!   terminal state of an exited child.

use dashmap::DashMap;

use crate::child::{LifecycleState, ProcessStats};

/// Observable status of one supervised process.
#[derive(Debug, Clone)]
pub struct ProcessStatus {
    /// Current lifecycle state.
    pub state: LifecycleState,
    /// OS pid of the current incarnation, if spawned.
    pub pid: Option<u32>,
    /// When the current incarnation was spawned.
    pub started_at: Option<std::time::SystemTime>,
    /// How many times the process has been respawned.
    pub restarts: u64,
    /// Most recent stats snapshot.
    pub stats: Option<ProcessStats>,
}

/// Name-keyed fleet status, safe for concurrent readers.
pub struct StateTable {
    entries: DashMap<String, ProcessStatus>,
}

impl StateTable {
    /// Creates a table with one `Pending` entry per name.
    pub fn seed<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = DashMap::new();
        for name in names {
            entries.insert(
                name.to_string(),
                ProcessStatus {
                    state: LifecycleState::Pending,
                    pid: None,
                    started_at: None,
                    restarts: 0,
                    stats: None,
                },
            );
        }
        Self { entries }
    }

    /// Applies `f` to the named entry, if present.
    pub fn update(&self, name: &str, f: impl FnOnce(&mut ProcessStatus)) {
        if let Some(mut entry) = self.entries.get_mut(name) {
            f(&mut entry);
        }
    }

    /// Sets the lifecycle state of the named entry.
    pub fn set_state(&self, name: &str, state: LifecycleState) {
        self.update(name, |s| s.state = state);
    }

    /// Current status of one process.
    pub fn status(&self, name: &str) -> Option<ProcessStatus> {
        self.entries.get(name).map(|e| e.clone())
    }

    /// Status of every known process, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, ProcessStatus)> {
        let mut all: Vec<(String, ProcessStatus)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_entries_start_pending() {
        let table = StateTable::seed(["db", "api"]);
        assert_eq!(table.status("db").unwrap().state, LifecycleState::Pending);
        assert_eq!(table.status("api").unwrap().state, LifecycleState::Pending);
        assert!(table.status("ghost").is_none());
    }

    #[test]
    fn updates_are_visible_in_snapshots() {
        let table = StateTable::seed(["db"]);
        table.set_state("db", LifecycleState::Running);
        table.update("db", |s| {
            s.pid = Some(42);
            s.restarts = 2;
        });

        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].0, "db");
        assert_eq!(snap[0].1.state, LifecycleState::Running);
        assert_eq!(snap[0].1.pid, Some(42));
        assert_eq!(snap[0].1.restarts, 2);
    }

    #[test]
    fn updates_to_unknown_names_are_ignored() {
        let table = StateTable::seed(["db"]);
        table.set_state("ghost", LifecycleState::Running);
        assert!(table.status("ghost").is_none());
    }
}
