// src/types.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical task identifier type used throughout the crate.
pub type TaskId = String;

/// Boxed, sendable future returned by the pluggable seams (runner, generator, sink).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle status of a task.
///
/// `Pending -> InProgress -> {Completed, Failed}` is the normal path;
/// `Pending -> Skipped` is taken for unsupported agent types and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "PENDING" => Ok(TaskStatus::Pending),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "FAILED" => Ok(TaskStatus::Failed),
            "SKIPPED" => Ok(TaskStatus::Skipped),
            other => Err(format!("invalid task status: {other}")),
        }
    }
}

/// A unit of work emitted by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Ids this task waits on, in declaration order.
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Higher is more urgent. Only affects queue ordering.
    #[serde(default)]
    pub priority: i64,
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
}

impl Task {
    pub fn new(
        id: impl Into<TaskId>,
        title: impl Into<String>,
        agent_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            priority: 0,
            agent_type: agent_type.into(),
            estimated_hours: None,
            complexity: None,
        }
    }
}

/// A single typed field update for a stored task.
///
/// Status changes are not written blindly: the scheduler maps them onto its
/// operator transitions so its bookkeeping stays consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum TaskPatch {
    Title(String),
    Description(String),
    Priority(i64),
    Dependencies(Vec<TaskId>),
    Status(TaskStatus),
}

impl TaskPatch {
    pub fn field_name(&self) -> &'static str {
        match self {
            TaskPatch::Title(_) => "title",
            TaskPatch::Description(_) => "description",
            TaskPatch::Priority(_) => "priority",
            TaskPatch::Dependencies(_) => "dependencies",
            TaskPatch::Status(_) => "status",
        }
    }
}

/// Metadata describing the batch of tasks currently being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanContext {
    pub id: String,
    pub title: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

impl PlanContext {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            started_at: Utc::now(),
        }
    }
}

/// Plan file consumed by the CLI driver.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}
