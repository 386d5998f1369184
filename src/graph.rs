//! Dependency graph validation.
//!
//! Satisfaction checks stay O(|deps|): each declared dependency must resolve
//! (active or archived) to a completed record. Cycle detection is a pure DFS
//! over the existing graph plus the candidate edges, run only when edges are
//! declared, never during normal satisfaction checks.

use crate::store::TaskStore;
use crate::task::{Task, TaskId, TaskStatus};
use std::collections::HashSet;

/// Dependencies of `task` that are not satisfied.
///
/// A dependency is satisfied iff it resolves to a record whose effective
/// status is `completed`; for archived records that is the status held at
/// archival time, so an archived-failed dependency stays unsatisfied
/// permanently. Unresolvable ids are unmet as well.
pub fn unmet_dependencies(store: &TaskStore, task: &Task) -> Vec<TaskId> {
    task.dependencies
        .iter()
        .copied()
        .filter(|&dep| store.status_of(dep) != Some(TaskStatus::Completed))
        .collect()
}

/// Check whether declaring `candidates` as dependencies of `id` would close
/// a cycle. Returns a witness path `id -> ... -> id` when it would.
///
/// Traverses the dependency edges already persisted in the store plus the
/// proposed edges; O(V + E) in the reachable subgraph.
pub fn would_cycle(store: &TaskStore, id: TaskId, candidates: &[TaskId]) -> Option<Vec<TaskId>> {
    for &start in candidates {
        if start == id {
            return Some(vec![id, id]);
        }
        let mut visited: HashSet<TaskId> = HashSet::new();
        let mut stack: Vec<(TaskId, Vec<TaskId>)> = vec![(start, vec![id, start])];
        while let Some((node, path)) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            for dep in store.dependencies_of(node).unwrap_or_default() {
                if dep == id {
                    let mut witness = path.clone();
                    witness.push(dep);
                    return Some(witness);
                }
                let mut next = path.clone();
                next.push(dep);
                stack.push((dep, next));
            }
        }
    }
    None
}
