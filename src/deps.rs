//! Dependency validation.
//!
//! [`check`] is pure: it asks a resolver for the status of each dependency
//! and classifies the answers. Structural rules (no self-reference, no
//! cycles) are enforced separately when dependencies are written.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::{Status, Task};

/// Outcome for a single dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DependencyState {
    /// The dependency is done.
    Satisfied,
    /// The dependency exists and is still `todo` or `doing`.
    Unmet { status: Status },
    /// The dependency no longer exists or has been trashed.
    Dangling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub id: String,
    #[serde(flatten)]
    pub state: DependencyState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Blocked,
}

impl Readiness {
    pub const fn as_str(self) -> &'static str {
        match self {
            Readiness::Ready => "ready",
            Readiness::Blocked => "blocked",
        }
    }
}

/// Aggregate result of [`check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub task_id: String,
    pub readiness: Readiness,
    pub dependencies: Vec<DependencyStatus>,
}

impl DependencyReport {
    pub fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }

    pub fn unmet_ids(&self) -> Vec<String> {
        self.ids_where(|state| matches!(state, DependencyState::Unmet { .. }))
    }

    pub fn dangling_ids(&self) -> Vec<String> {
        self.ids_where(|state| matches!(state, DependencyState::Dangling))
    }

    /// Ids that keep the task from being ready, unmet first.
    pub fn blocking_ids(&self) -> Vec<String> {
        let mut ids = self.unmet_ids();
        ids.extend(self.dangling_ids());
        ids
    }

    /// The error a gated transition should fail with, if any.
    pub fn to_error(&self) -> Option<Error> {
        if self.is_ready() {
            return None;
        }
        Some(Error::DependenciesUnmet {
            id: self.task_id.clone(),
            unmet: self.unmet_ids(),
            dangling: self.dangling_ids(),
        })
    }

    fn ids_where(&self, pred: impl Fn(&DependencyState) -> bool) -> Vec<String> {
        self.dependencies
            .iter()
            .filter(|dep| pred(&dep.state))
            .map(|dep| dep.id.clone())
            .collect()
    }
}

/// Classify every dependency of `task`.
///
/// `resolve` maps an id to the current status of that task, or `None` when
/// no task with that id exists. Trashed dependencies count as dangling.
pub fn check<F>(task: &Task, mut resolve: F) -> DependencyReport
where
    F: FnMut(&str) -> Option<Status>,
{
    let dependencies: Vec<DependencyStatus> = task
        .depends_on
        .iter()
        .map(|id| {
            let state = match resolve(id) {
                Some(Status::Done) => DependencyState::Satisfied,
                Some(status @ (Status::Todo | Status::Doing)) => DependencyState::Unmet { status },
                Some(Status::Trashed) | None => DependencyState::Dangling,
            };
            DependencyStatus {
                id: id.clone(),
                state,
            }
        })
        .collect();

    let readiness = if dependencies
        .iter()
        .all(|dep| dep.state == DependencyState::Satisfied)
    {
        Readiness::Ready
    } else {
        Readiness::Blocked
    };

    DependencyReport {
        task_id: task.id.clone(),
        readiness,
        dependencies,
    }
}

/// Fail when a task lists itself as a dependency.
pub fn reject_self_reference(task_id: &str, depends_on: &[String]) -> Result<()> {
    if depends_on.iter().any(|dep| dep == task_id) {
        return Err(Error::validation(
            "depends_on",
            format!("task {task_id} cannot depend on itself"),
        ));
    }
    Ok(())
}

fn visit<'a>(
    graph: &'a BTreeMap<String, Vec<String>>,
    node: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut BTreeSet<&'a str>,
) -> Option<Vec<String>> {
    if done.contains(node) {
        return None;
    }
    if let Some(start) = path.iter().position(|on_path| *on_path == node) {
        let mut cycle: Vec<String> = path[start..].iter().map(|id| id.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    path.push(node);
    if let Some(edges) = graph.get(node) {
        for next in edges {
            if let Some(cycle) = visit(graph, next, path, done) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    done.insert(node);
    None
}

/// Find a cycle reachable from `start`, returned as the path of ids that
/// closes it (first and last element are equal).
///
/// Cycles elsewhere in the graph are not reported. Edges to ids that are not
/// keys of the graph are treated as leaves.
pub fn find_cycle_from<'a>(
    graph: &'a BTreeMap<String, Vec<String>>,
    start: &'a str,
) -> Option<Vec<String>> {
    visit(graph, start, &mut Vec::new(), &mut BTreeSet::new())
}

/// Fail with a `depends_on` validation error when following dependencies
/// from `start` runs into a cycle.
pub fn ensure_acyclic_from(graph: &BTreeMap<String, Vec<String>>, start: &str) -> Result<()> {
    match find_cycle_from(graph, start) {
        Some(cycle) => Err(Error::validation(
            "depends_on",
            format!("dependency cycle detected: {}", cycle.join(" -> ")),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn task_with_deps(deps: &[&str]) -> Task {
        let date = NaiveDate::from_ymd_opt(2026, 1, 1).expect("date");
        let mut task = Task::new("t-20260101-009", "a", date);
        task.depends_on = deps.iter().map(|dep| dep.to_string()).collect();
        task
    }

    fn graph(edges: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(node, deps)| {
                (
                    node.to_string(),
                    deps.iter().map(|dep| dep.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn no_dependencies_is_ready() {
        let report = check(&task_with_deps(&[]), |_| None);
        assert!(report.is_ready());
        assert!(report.to_error().is_none());
    }

    #[test]
    fn classifies_each_dependency() {
        let task = task_with_deps(&["done", "doing", "todo", "trashed", "gone"]);
        let report = check(&task, |id| match id {
            "done" => Some(Status::Done),
            "doing" => Some(Status::Doing),
            "todo" => Some(Status::Todo),
            "trashed" => Some(Status::Trashed),
            _ => None,
        });
        assert_eq!(report.readiness, Readiness::Blocked);
        assert_eq!(report.unmet_ids(), vec!["doing", "todo"]);
        assert_eq!(report.dangling_ids(), vec!["trashed", "gone"]);
        assert_eq!(report.dependencies[0].state, DependencyState::Satisfied);
        assert_eq!(
            report.dependencies[1].state,
            DependencyState::Unmet {
                status: Status::Doing
            }
        );
    }

    #[test]
    fn blocked_report_maps_to_dependencies_unmet() {
        let report = check(&task_with_deps(&["x"]), |_| Some(Status::Todo));
        match report.to_error() {
            Some(Error::DependenciesUnmet { id, unmet, dangling }) => {
                assert_eq!(id, "t-20260101-009");
                assert_eq!(unmet, vec!["x"]);
                assert!(dangling.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn state_serializes_flat() {
        let status = DependencyStatus {
            id: "t-1".to_string(),
            state: DependencyState::Unmet {
                status: Status::Todo,
            },
        };
        let value = serde_json::to_value(&status).expect("json");
        assert_eq!(
            value,
            serde_json::json!({ "id": "t-1", "state": "unmet", "status": "todo" })
        );
    }

    #[test]
    fn self_reference_is_rejected() {
        let deps = vec!["t-2".to_string(), "t-1".to_string()];
        assert!(reject_self_reference("t-1", &deps).is_err());
        assert!(reject_self_reference("t-3", &deps).is_ok());
    }

    #[test]
    fn detects_cycles() {
        let acyclic = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[]), ("d", &["b", "c"])]);
        assert_eq!(find_cycle_from(&acyclic, "a"), None);
        assert!(ensure_acyclic_from(&acyclic, "d").is_ok());

        let cyclic = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        assert_eq!(
            find_cycle_from(&cyclic, "a"),
            Some(vec!["a", "b", "c", "a"].into_iter().map(String::from).collect())
        );
        assert!(ensure_acyclic_from(&cyclic, "b").is_err());
    }

    #[test]
    fn unreachable_cycles_are_ignored_from_a_start_node() {
        let g = graph(&[("a", &["b"]), ("b", &["a"]), ("c", &["d"]), ("d", &[])]);
        assert_eq!(find_cycle_from(&g, "c"), None);
        assert!(find_cycle_from(&g, "a").is_some());
    }

    #[test]
    fn edges_to_unknown_nodes_are_leaves() {
        let g = graph(&[("a", &["missing"])]);
        assert_eq!(find_cycle_from(&g, "a"), None);
    }
}
