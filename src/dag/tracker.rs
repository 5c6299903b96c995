// src/dag/tracker.rs

//! Dependency bookkeeping for the current plan.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::types::TaskId;

/// Result of evaluating a task's dependencies against the completed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Every declared dependency has completed (or none were declared).
    Ready,
    /// These dependencies are still outstanding, in declaration order.
    Waiting(Vec<TaskId>),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Tracks, per task, which dependencies have not completed yet.
///
/// `waiting` only ever holds non-empty sets: a task whose last outstanding
/// dependency completes is removed and reported as unblocked. Dependencies on
/// ids the tracker has never seen simply stay outstanding.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    waiting: BTreeMap<TaskId, BTreeSet<TaskId>>,
    completed: HashSet<TaskId>,
    /// Completion order, oldest first. Used for "recently completed" lookups.
    completion_order: Vec<TaskId>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task's declared dependencies.
    pub fn register(&mut self, task_id: &str, dependencies: &[TaskId]) -> Readiness {
        self.waiting.remove(task_id);

        let mut outstanding = Vec::new();
        for dep in dependencies {
            if !self.completed.contains(dep) && !outstanding.contains(dep) {
                outstanding.push(dep.clone());
            }
        }

        if outstanding.is_empty() {
            debug!(task = %task_id, "all dependencies satisfied");
            return Readiness::Ready;
        }

        debug!(task = %task_id, waiting_for = ?outstanding, "task blocked on dependencies");
        self.waiting
            .insert(task_id.to_string(), outstanding.iter().cloned().collect());
        Readiness::Waiting(outstanding)
    }

    /// Overwrite a task's dependencies and re-evaluate them.
    pub fn replace_dependencies(&mut self, task_id: &str, dependencies: &[TaskId]) -> Readiness {
        self.register(task_id, dependencies)
    }

    /// Mark `task_id` as completed and return the tasks this unblocked,
    /// sorted by id.
    ///
    /// Completing an id that is already completed is a no-op and returns
    /// nothing.
    pub fn complete(&mut self, task_id: &str) -> Vec<TaskId> {
        if !self.completed.insert(task_id.to_string()) {
            debug!(task = %task_id, "task already completed; ignoring");
            return Vec::new();
        }
        self.completion_order.push(task_id.to_string());

        // A completed task is never waiting itself.
        self.waiting.remove(task_id);

        let mut unblocked = Vec::new();
        for (other, deps) in self.waiting.iter_mut() {
            if deps.remove(task_id) && deps.is_empty() {
                unblocked.push(other.clone());
            }
        }

        for id in &unblocked {
            self.waiting.remove(id);
        }

        if !unblocked.is_empty() {
            debug!(task = %task_id, ?unblocked, "completion unblocked dependents");
        }
        unblocked
    }

    /// Remove `task_id` from the completed set. Returns whether it was there.
    pub fn uncomplete(&mut self, task_id: &str) -> bool {
        let removed = self.completed.remove(task_id);
        if removed {
            self.completion_order.retain(|id| id != task_id);
        }
        removed
    }

    /// Drop any outstanding-dependency entry for `task_id`.
    pub fn forget(&mut self, task_id: &str) -> bool {
        self.waiting.remove(task_id).is_some()
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed.contains(task_id)
    }

    pub fn is_waiting(&self, task_id: &str) -> bool {
        self.waiting.contains_key(task_id)
    }

    /// Outstanding dependencies of a blocked task.
    pub fn outstanding(&self, task_id: &str) -> Option<&BTreeSet<TaskId>> {
        self.waiting.get(task_id)
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Up to `n` most recently completed ids, oldest first.
    pub fn recently_completed(&self, n: usize) -> &[TaskId] {
        let start = self.completion_order.len().saturating_sub(n);
        &self.completion_order[start..]
    }

    pub fn completed_ids(&self) -> &[TaskId] {
        &self.completion_order
    }

    pub fn waiting_map(&self) -> &BTreeMap<TaskId, BTreeSet<TaskId>> {
        &self.waiting
    }

    pub fn clear(&mut self) {
        self.waiting.clear();
        self.completed.clear();
        self.completion_order.clear();
    }
}
