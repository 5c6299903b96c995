// src/dag/graph.rs

//! Cycle diagnostics over declared task dependencies.
//!
//! The scheduler never rejects a cyclic dependency: tasks caught in a cycle
//! stay blocked. These helpers only exist so the cycle can be reported.

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::errors::{DevdagError, Result};
use crate::types::TaskId;

/// Build a graph with an edge `dep -> task` for every declared dependency.
///
/// Edge direction: for `B.dependencies = ["A"]` we add edge A -> B.
fn build_graph<'a, I>(tasks: I) -> DiGraphMap<&'a str, ()>
where
    I: IntoIterator<Item = (&'a str, &'a [TaskId])>,
{
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for (id, deps) in tasks {
        graph.add_node(id);
        for dep in deps {
            graph.add_edge(dep.as_str(), id, ());
        }
    }

    graph
}

/// Return the members of a dependency cycle passing through `task_id`, sorted
/// by id, or `None` if `task_id` is not part of any cycle.
///
/// A task that depends on itself is reported as a one-element cycle.
pub fn find_cycle_through<'a, I>(task_id: &str, tasks: I) -> Option<Vec<TaskId>>
where
    I: IntoIterator<Item = (&'a str, &'a [TaskId])>,
{
    let graph = build_graph(tasks);

    if graph.contains_edge(task_id, task_id) {
        return Some(vec![task_id.to_string()]);
    }

    tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.len() > 1 && scc.contains(&task_id))
        .map(|scc| {
            let mut members: Vec<TaskId> = scc.into_iter().map(str::to_string).collect();
            members.sort();
            members
        })
}

/// Fail with [`DevdagError::CyclicDependency`] if the tasks contain a cycle.
pub fn ensure_acyclic<'a, I>(tasks: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a [TaskId])>,
{
    let graph = build_graph(tasks);

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DevdagError::CyclicDependency(format!(
            "cycle detected in task dependencies involving task '{}'",
            cycle.node_id()
        ))),
    }
}
