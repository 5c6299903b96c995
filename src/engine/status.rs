// src/engine/status.rs

//! Read-only snapshots of scheduler state for monitoring.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{PlanContext, TaskId};

/// Counters describing the current plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TaskStatistics {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub queued_tasks: usize,
    pub waiting_tasks: usize,
    pub failed_tasks: usize,
    pub skipped_tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionStatus {
    pub agent_id: String,
    pub plan_id: Option<String>,
    pub plan_title: Option<String>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub in_progress_tasks: usize,
    pub queued_tasks: usize,
    pub waiting_tasks: usize,
    pub is_plan_complete: bool,
    pub is_processing_active: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub id: TaskId,
    pub title: String,
    pub priority: i64,
}

/// Full picture of the scheduler, including the dependency bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedStatus {
    pub agent_id: String,
    pub plan_context: Option<PlanContext>,
    pub statistics: TaskStatistics,
    pub execution_status: ExecutionStatus,
    /// Ready queue in admission order.
    pub task_queue: Vec<QueueEntry>,
    pub in_progress: Vec<TaskId>,
    /// Completed ids in completion order.
    pub completed: Vec<TaskId>,
    /// Declared dependencies of every known task that has any.
    pub dependency_graph: BTreeMap<TaskId, Vec<TaskId>>,
    /// Outstanding dependencies of every blocked task.
    pub waiting_for_dependencies: BTreeMap<TaskId, Vec<TaskId>>,
    pub timestamp: DateTime<Utc>,
}
