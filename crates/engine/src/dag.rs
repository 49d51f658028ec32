// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generic DAG bookkeeping over a set of [`PackageTask`]s: cycle
//! detection at submission time, and the ready-set evaluation the
//! pipeline's scheduler re-runs every time a task finishes.
//!
//! This has no teacher analogue — the queue/worker-pool split in the
//! teacher's `listener::queues` informed the stage-advance shape in
//! [`crate::pipeline`], but dependency-graph scheduling itself is new.

use std::collections::{HashMap, HashSet, VecDeque};

use anvil_core::{PackageTask, PackageTaskId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("dependency cycle detected among tasks: {}", .0.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" -> "))]
    Cycle(Vec<PackageTaskId>),
    #[error("task {0} depends on unknown task {1}")]
    UnknownDependency(PackageTaskId, PackageTaskId),
}

/// An immutable view of the dependency edges submitted for one install
/// run. Built once at submission time; [`TaskGraph::ready`] is then
/// called repeatedly as tasks complete.
pub struct TaskGraph {
    deps: HashMap<PackageTaskId, Vec<PackageTaskId>>,
    /// Reverse edges: for each task, the tasks that depend on it.
    dependents: HashMap<PackageTaskId, Vec<PackageTaskId>>,
}

impl TaskGraph {
    /// Validate and build a graph from the submitted tasks. Verifies
    /// every dependency refers to a task in the same submission and that
    /// the graph has no cycles — both are hard failures before any stage
    /// runs (spec §4.6, §8 "DAG cycle in submitted tasks fails fast").
    pub fn build(tasks: &[PackageTask]) -> Result<Self, DagError> {
        let ids: HashSet<PackageTaskId> = tasks.iter().map(|t| t.id).collect();
        let mut deps = HashMap::new();
        let mut dependents: HashMap<PackageTaskId, Vec<PackageTaskId>> = HashMap::new();

        for task in tasks {
            for dep in &task.deps {
                if !ids.contains(dep) {
                    return Err(DagError::UnknownDependency(task.id, *dep));
                }
                dependents.entry(*dep).or_default().push(task.id);
            }
            deps.insert(task.id, task.deps.clone());
        }

        let graph = Self { deps, dependents };
        graph.check_acyclic(tasks)?;
        Ok(graph)
    }

    /// Kahn's algorithm: repeatedly remove nodes with no remaining
    /// unresolved dependency. Anything left over after that process
    /// terminates participates in a cycle.
    fn check_acyclic(&self, tasks: &[PackageTask]) -> Result<(), DagError> {
        let mut indegree: HashMap<PackageTaskId, usize> =
            tasks.iter().map(|t| (t.id, t.deps.len())).collect();
        let mut queue: VecDeque<PackageTaskId> =
            indegree.iter().filter(|(_, &deg)| deg == 0).map(|(id, _)| *id).collect();
        let mut resolved = 0usize;

        while let Some(id) = queue.pop_front() {
            resolved += 1;
            if let Some(dependents) = self.dependents.get(&id) {
                for dependent in dependents {
                    let Some(deg) = indegree.get_mut(dependent) else {
                        unreachable!("dependent listed in graph");
                    };
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }

        if resolved != tasks.len() {
            let cyclic: Vec<PackageTaskId> =
                indegree.into_iter().filter(|(_, deg)| *deg > 0).map(|(id, _)| id).collect();
            return Err(DagError::Cycle(cyclic));
        }
        Ok(())
    }

    pub fn deps_of(&self, id: &PackageTaskId) -> &[PackageTaskId] {
        self.deps.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &PackageTaskId) -> &[PackageTaskId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every transitive dependent of `id`, used to poison a subtree when
    /// `id` fails (spec §4.6: "every transitive dependent is marked
    /// failed ... and never dispatched").
    pub fn transitive_dependents(&self, id: &PackageTaskId) -> HashSet<PackageTaskId> {
        let mut out = HashSet::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            for dependent in self.dependents_of(&current) {
                if out.insert(*dependent) {
                    stack.push(*dependent);
                }
            }
        }
        out
    }

    /// Tasks among `pending` whose dependencies are all in `done` — the
    /// scheduler's ready set, re-evaluated after every stage completion.
    pub fn ready<'a>(
        &self,
        pending: impl Iterator<Item = &'a PackageTask>,
        done: &HashSet<PackageTaskId>,
    ) -> Vec<PackageTaskId> {
        pending
            .filter(|task| task.deps.iter().all(|d| done.contains(d)))
            .map(|task| task.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::test_support::sample_task;

    #[test]
    fn acyclic_graph_builds_successfully() {
        let a = sample_task("platform", vec![]);
        let b = sample_task("toolchain", vec![a.id]);
        let graph = TaskGraph::build(&[a, b]).unwrap();
        assert_eq!(graph.deps_of(&graph.deps.keys().next().copied().unwrap()).len(), 0);
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let a_id = anvil_core::PackageTaskId::new();
        let b_id = anvil_core::PackageTaskId::new();
        let mut a = sample_task("a", vec![b_id]);
        a.id = a_id;
        let mut b = sample_task("b", vec![a_id]);
        b.id = b_id;

        let err = TaskGraph::build(&[a, b]).unwrap_err();
        assert!(matches!(err, DagError::Cycle(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let phantom = anvil_core::PackageTaskId::new();
        let task = sample_task("lib", vec![phantom]);
        let err = TaskGraph::build(&[task]).unwrap_err();
        assert!(matches!(err, DagError::UnknownDependency(_, _)));
    }

    #[test]
    fn ready_set_only_includes_tasks_with_satisfied_deps() {
        let platform = sample_task("platform", vec![]);
        let toolchain = sample_task("toolchain", vec![platform.id]);
        let framework = sample_task("framework", vec![toolchain.id]);
        let tasks = vec![platform.clone(), toolchain.clone(), framework.clone()];
        let graph = TaskGraph::build(&tasks).unwrap();

        let done = HashSet::new();
        let ready = graph.ready(tasks.iter(), &done);
        assert_eq!(ready, vec![platform.id]);

        let mut done = HashSet::new();
        done.insert(platform.id);
        let ready = graph.ready(tasks.iter().filter(|t| t.id != platform.id), &done);
        assert_eq!(ready, vec![toolchain.id]);
    }

    #[test]
    fn transitive_dependents_includes_the_whole_downstream_chain() {
        let platform = sample_task("platform", vec![]);
        let toolchain = sample_task("toolchain", vec![platform.id]);
        let lib = sample_task("lib", vec![toolchain.id]);
        let graph = TaskGraph::build(&[platform.clone(), toolchain.clone(), lib.clone()]).unwrap();

        let affected = graph.transitive_dependents(&platform.id);
        assert!(affected.contains(&toolchain.id));
        assert!(affected.contains(&lib.id));
    }
}
