//! # Dependency planning: topological start batches.
//!
//! [`StartPlan`] turns a manifest's dependency edges into an executable
//! launch schedule before any child is spawned.
//!
//! ## Architecture
//! ```text
//! ProcessManifest ──► StartPlan::build()
//!                          │
//!                          ├──► name → index map (UnknownDependency here)
//!                          ├──► Kahn's algorithm over dependency → dependent
//!                          │       └──► batches: Vec<Vec<usize>>
//!                          └──► leftover nodes ──► CycleDetected (with path)
//! ```
//!
//! ## Rules
//! - Batches are emitted in topological order; every spec's dependencies sit
//!   in strictly earlier batches.
//! - Within a batch, specs keep the manifest's declaration order (stable
//!   tiebreak for logging and determinism).
//! - The flattened order, reversed, is the teardown order.

use std::collections::HashMap;

use crate::error::ManifestError;

use super::load::ProcessManifest;

/// Topologically ordered launch schedule derived from one manifest.
#[derive(Debug, Clone)]
pub struct StartPlan {
    /// Batches of spec indices; all of a batch's dependencies live in
    /// earlier batches.
    batches: Vec<Vec<usize>>,
    /// The flattened start order.
    order: Vec<usize>,
}

impl StartPlan {
    /// Builds the plan, rejecting unknown dependencies and cycles.
    pub fn build(manifest: &ProcessManifest) -> Result<Self, ManifestError> {
        let specs = &manifest.processes;
        let index: HashMap<&str, usize> = specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        // dependency → dependents adjacency, plus indegrees.
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
        let mut indegree: Vec<usize> = vec![0; specs.len()];
        for (i, spec) in specs.iter().enumerate() {
            let mut seen_deps: Vec<usize> = Vec::with_capacity(spec.dependencies.len());
            for dep in &spec.dependencies {
                let &d = index
                    .get(dep.as_str())
                    .ok_or_else(|| ManifestError::UnknownDependency {
                        process: spec.name.clone(),
                        dependency: dep.clone(),
                    })?;
                // A dependency listed twice counts once.
                if seen_deps.contains(&d) {
                    continue;
                }
                seen_deps.push(d);
                dependents[d].push(i);
                indegree[i] += 1;
            }
        }

        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut order: Vec<usize> = Vec::with_capacity(specs.len());
        let mut frontier: Vec<usize> = (0..specs.len()).filter(|&i| indegree[i] == 0).collect();

        while !frontier.is_empty() {
            frontier.sort_unstable(); // declaration-order tiebreak
            let batch = frontier.clone();
            frontier.clear();
            for &i in &batch {
                order.push(i);
                for &dep in &dependents[i] {
                    indegree[dep] -= 1;
                    if indegree[dep] == 0 {
                        frontier.push(dep);
                    }
                }
            }
            batches.push(batch);
        }

        if order.len() != specs.len() {
            return Err(ManifestError::CycleDetected {
                cycle: Self::find_cycle(specs, &index, &indegree),
            });
        }

        Ok(Self { batches, order })
    }

    /// Walks dependency edges among the unresolved nodes until a node
    /// repeats, yielding a concrete cycle path for the error message.
    fn find_cycle(
        specs: &[super::spec::ProcessSpec],
        index: &HashMap<&str, usize>,
        indegree: &[usize],
    ) -> Vec<String> {
        let start = indegree
            .iter()
            .position(|&d| d > 0)
            .expect("cycle implies an unresolved node");

        let mut path: Vec<usize> = Vec::new();
        let mut cur = start;
        loop {
            if let Some(pos) = path.iter().position(|&p| p == cur) {
                let mut cycle: Vec<String> =
                    path[pos..].iter().map(|&i| specs[i].name.clone()).collect();
                cycle.push(specs[cur].name.clone());
                return cycle;
            }
            path.push(cur);
            // Follow any dependency that is itself unresolved.
            cur = specs[cur]
                .dependencies
                .iter()
                .filter_map(|d| index.get(d.as_str()).copied())
                .find(|&d| indegree[d] > 0)
                .expect("unresolved node must have an unresolved dependency");
        }
    }

    /// Batches of spec indices, in start order.
    pub fn batches(&self) -> &[Vec<usize>] {
        &self.batches
    }

    /// Flattened start order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &[&str])]) -> ProcessManifest {
        let processes = entries
            .iter()
            .map(|(name, deps)| {
                serde_json::from_value(serde_json::json!({
                    "name": name,
                    "path": "/bin/true",
                    "dependencies": deps,
                }))
                .unwrap()
            })
            .collect();
        ProcessManifest { processes }
    }

    fn names(m: &ProcessManifest, batch: &[usize]) -> Vec<String> {
        batch.iter().map(|&i| m.processes[i].name.clone()).collect()
    }

    #[test]
    fn independent_specs_share_one_batch_in_declaration_order() {
        let m = manifest(&[("b", &[]), ("a", &[]), ("c", &[])]);
        let plan = StartPlan::build(&m).unwrap();
        assert_eq!(plan.batches().len(), 1);
        assert_eq!(names(&m, &plan.batches()[0]), ["b", "a", "c"]);
    }

    #[test]
    fn chain_produces_one_batch_per_rank() {
        let m = manifest(&[("worker", &["api", "db"]), ("api", &["db"]), ("db", &[])]);
        let plan = StartPlan::build(&m).unwrap();
        let got: Vec<Vec<String>> = plan.batches().iter().map(|b| names(&m, b)).collect();
        assert_eq!(got, [vec!["db"], vec!["api"], vec!["worker"]]);
        assert_eq!(
            names(&m, plan.order()),
            ["db", "api", "worker"]
        );
    }

    #[test]
    fn diamond_keeps_declaration_order_within_rank() {
        let m = manifest(&[
            ("top", &[]),
            ("left", &["top"]),
            ("right", &["top"]),
            ("bottom", &["left", "right"]),
        ]);
        let plan = StartPlan::build(&m).unwrap();
        let got: Vec<Vec<String>> = plan.batches().iter().map(|b| names(&m, b)).collect();
        assert_eq!(
            got,
            [vec!["top"], vec!["left", "right"], vec!["bottom"]]
        );
    }

    #[test]
    fn two_cycle_is_rejected() {
        let m = manifest(&[("a", &["b"]), ("b", &["a"])]);
        let err = StartPlan::build(&m).unwrap_err();
        match err {
            ManifestError::CycleDetected { cycle } => {
                assert!(cycle.len() >= 3);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let m = manifest(&[("a", &["a"])]);
        assert!(matches!(
            StartPlan::build(&m).unwrap_err(),
            ManifestError::CycleDetected { .. }
        ));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let m = manifest(&[("a", &["ghost"])]);
        let err = StartPlan::build(&m).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::UnknownDependency { ref dependency, .. } if dependency == "ghost"
        ));
    }

    #[test]
    fn duplicate_dependency_entries_count_once() {
        let m = manifest(&[("db", &[]), ("api", &["db", "db"])]);
        let plan = StartPlan::build(&m).unwrap();
        assert_eq!(plan.batches().len(), 2);
    }
}
