// src/exec/backend.rs

//! Pluggable task runner abstraction.
//!
//! The coordinator talks to a `TaskRunner` instead of a concrete executor.
//! This makes it easy to swap in a scripted runner in tests while keeping the
//! production implementation ([`GenerationExecutor`]) in [`task_runner`].
//!
//! [`GenerationExecutor`]: super::task_runner::GenerationExecutor
//! [`task_runner`]: super::task_runner

use serde::Serialize;

use crate::types::{BoxFuture, PlanContext, Task, TaskId};

/// A task referenced from another task's context: its id and, when the task
/// is known to the scheduler, its title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRef {
    pub id: TaskId,
    pub title: Option<String>,
}

/// Snapshot of scheduler knowledge handed to the runner with each task.
///
/// Built by the scheduler at admission time so the runner never needs access
/// to shared scheduler state.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ExecutionContext {
    pub plan: Option<PlanContext>,
    /// 1-based position of this task in the plan (completed count + 1).
    pub position: usize,
    /// Number of tasks known for the plan.
    pub total: usize,
    /// Declared dependencies, in declaration order.
    pub dependencies: Vec<TaskRef>,
    /// Up to three most recently completed tasks, oldest first.
    pub recently_completed: Vec<TaskRef>,
}

/// Trait abstracting how a single admitted task is executed.
///
/// Implementations must always resolve to the task with a terminal status
/// (`Completed` or `Failed`); failures are reported through notifications,
/// not returned as errors. A panic inside `execute` is caught by the
/// coordinator and turned into a failed task.
pub trait TaskRunner: Send + Sync + 'static {
    fn execute(&self, task: Task, context: ExecutionContext) -> BoxFuture<'_, Task>;
}
