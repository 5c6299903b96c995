// src/notify/mod.rs

//! Structured notifications and the sink abstraction they are delivered to.
//!
//! The scheduler and executor only ever talk to a [`NotificationSink`]; how
//! events reach observers (websocket, stdout, test recorder) is up to the
//! implementation. [`ChannelSink`] is the in-process implementation used by
//! the binary.

pub mod channel;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::status::DetailedStatus;
use crate::errors::{ErrorKind, TaskError};
use crate::types::{BoxFuture, TaskId, TaskStatus};

pub use channel::ChannelSink;

/// Handle identifying one observer of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Kind of a persisted artifact, as reported in `file_generated` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Source,
    Json,
    Text,
}

/// Event payloads. Serialized with a `type` tag, e.g. `{"type": "task_queued", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    PlanAcknowledgment {
        plan_id: String,
    },
    PlanCompleteAck {
        plan_id: String,
        total_tasks: usize,
        pending_tasks: usize,
        ready_tasks: usize,
    },
    TaskReceived {
        task_id: TaskId,
        title: String,
        dependencies: Vec<TaskId>,
    },
    TaskWaiting {
        task_id: TaskId,
        title: String,
        waiting_for: Vec<TaskId>,
    },
    TaskCycleDetected {
        task_id: TaskId,
        cycle: Vec<TaskId>,
    },
    TaskQueued {
        task_id: TaskId,
        title: String,
        queue_position: usize,
    },
    TaskUnblocked {
        task_id: TaskId,
        title: String,
        unblocked_by: TaskId,
    },
    TaskStatusUpdate {
        task_id: TaskId,
        status: TaskStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_kind: Option<ErrorKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_directory: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        main_file: Option<String>,
    },
    TaskFailed {
        task_id: TaskId,
        error_kind: ErrorKind,
        error: String,
    },
    LlmRequest {
        task_id: TaskId,
    },
    LlmStreamingChunk {
        task_id: TaskId,
        content: String,
    },
    LlmResponseComplete {
        task_id: TaskId,
    },
    /// `content` is the full text written to `file_name`.
    FileGenerated {
        task_id: TaskId,
        file_name: String,
        file_type: FileType,
        content: String,
    },
    Error {
        task_id: TaskId,
        error_kind: ErrorKind,
    },
    ProcessingPaused,
    ProcessingResumed,
    EmergencyStop {
        in_progress_tasks: Vec<TaskId>,
    },
    TaskPriorityChanged {
        task_id: TaskId,
        old_priority: i64,
        new_priority: i64,
    },
    TaskForceCompleted {
        task_id: TaskId,
    },
    TaskReset {
        task_id: TaskId,
    },
    TaskUpdated {
        task_id: TaskId,
        fields: Vec<String>,
    },
    StatusSnapshot {
        status: Box<DetailedStatus>,
    },
    AgentShutdown {
        still_in_flight: Vec<TaskId>,
    },
}

impl EventKind {
    /// Plain status transition without error or output details.
    pub fn status_update(task_id: &str, status: TaskStatus) -> Self {
        EventKind::TaskStatusUpdate {
            task_id: task_id.to_string(),
            status,
            error: None,
            error_kind: None,
            output_directory: None,
            main_file: None,
        }
    }

    /// `FAILED` (or `SKIPPED`) transition carrying the classified error.
    pub fn status_error(task_id: &str, status: TaskStatus, err: &TaskError) -> Self {
        EventKind::TaskStatusUpdate {
            task_id: task_id.to_string(),
            status,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            output_directory: None,
            main_file: None,
        }
    }

    /// The serialized `type` tag.
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::PlanAcknowledgment { .. } => "plan_acknowledgment",
            EventKind::PlanCompleteAck { .. } => "plan_complete_ack",
            EventKind::TaskReceived { .. } => "task_received",
            EventKind::TaskWaiting { .. } => "task_waiting",
            EventKind::TaskCycleDetected { .. } => "task_cycle_detected",
            EventKind::TaskQueued { .. } => "task_queued",
            EventKind::TaskUnblocked { .. } => "task_unblocked",
            EventKind::TaskStatusUpdate { .. } => "task_status_update",
            EventKind::TaskFailed { .. } => "task_failed",
            EventKind::LlmRequest { .. } => "llm_request",
            EventKind::LlmStreamingChunk { .. } => "llm_streaming_chunk",
            EventKind::LlmResponseComplete { .. } => "llm_response_complete",
            EventKind::FileGenerated { .. } => "file_generated",
            EventKind::Error { .. } => "error",
            EventKind::ProcessingPaused => "processing_paused",
            EventKind::ProcessingResumed => "processing_resumed",
            EventKind::EmergencyStop { .. } => "emergency_stop",
            EventKind::TaskPriorityChanged { .. } => "task_priority_changed",
            EventKind::TaskForceCompleted { .. } => "task_force_completed",
            EventKind::TaskReset { .. } => "task_reset",
            EventKind::TaskUpdated { .. } => "task_updated",
            EventKind::StatusSnapshot { .. } => "status_snapshot",
            EventKind::AgentShutdown { .. } => "agent_shutdown",
        }
    }

    /// Task the event is about, if any.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            EventKind::TaskReceived { task_id, .. }
            | EventKind::TaskWaiting { task_id, .. }
            | EventKind::TaskCycleDetected { task_id, .. }
            | EventKind::TaskQueued { task_id, .. }
            | EventKind::TaskUnblocked { task_id, .. }
            | EventKind::TaskStatusUpdate { task_id, .. }
            | EventKind::TaskFailed { task_id, .. }
            | EventKind::LlmRequest { task_id }
            | EventKind::LlmStreamingChunk { task_id, .. }
            | EventKind::LlmResponseComplete { task_id }
            | EventKind::FileGenerated { task_id, .. }
            | EventKind::Error { task_id, .. }
            | EventKind::TaskPriorityChanged { task_id, .. }
            | EventKind::TaskForceCompleted { task_id }
            | EventKind::TaskReset { task_id }
            | EventKind::TaskUpdated { task_id, .. } => Some(task_id),
            EventKind::PlanAcknowledgment { .. }
            | EventKind::PlanCompleteAck { .. }
            | EventKind::ProcessingPaused
            | EventKind::ProcessingResumed
            | EventKind::EmergencyStop { .. }
            | EventKind::StatusSnapshot { .. }
            | EventKind::AgentShutdown { .. } => None,
        }
    }
}

/// A notification as delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub agent_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Human-readable summary.
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(agent_id: impl Into<String>, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Delivery of events to observers. Delivery is best-effort: implementations
/// log and drop what they cannot deliver instead of failing the caller.
pub trait NotificationSink: Send + Sync {
    /// Deliver to every observer.
    fn broadcast(&self, event: Event) -> BoxFuture<'_, ()>;

    /// Deliver to one observer.
    fn send_to(&self, observer: ObserverId, event: Event) -> BoxFuture<'_, ()>;
}
