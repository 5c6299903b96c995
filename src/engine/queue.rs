// src/engine/queue.rs

use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, warn};

use crate::types::TaskId;

/// A ready task waiting for a concurrency slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: TaskId,
    pub priority: i64,
}

/// Ready queue plus the bounded set of in-flight task ids.
///
/// Semantics:
/// - `enqueue` appends (FIFO) unless the id is already queued or in flight.
/// - `admit_ready` moves tasks from the front of the queue into `in_flight`
///   while the queue is active and below `max_concurrency`.
/// - `release` frees a slot; the caller is expected to admit again.
/// - Pausing only stops admissions; in-flight tasks are unaffected.
#[derive(Debug)]
pub struct ExecutionQueue {
    ready: VecDeque<QueuedTask>,
    in_flight: BTreeSet<TaskId>,
    max_concurrency: usize,
    active: bool,
}

impl ExecutionQueue {
    /// Create an (inactive) queue with the given concurrency limit.
    ///
    /// `max_concurrency` is clamped to at least 1; a zero limit would never
    /// admit anything.
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            ready: VecDeque::new(),
            in_flight: BTreeSet::new(),
            max_concurrency: max_concurrency.max(1),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_queued(&self, task_id: &str) -> bool {
        self.ready.iter().any(|t| t.id == task_id)
    }

    pub fn is_in_flight(&self, task_id: &str) -> bool {
        self.in_flight.contains(task_id)
    }

    /// 1-based position of a queued task.
    pub fn position_of(&self, task_id: &str) -> Option<usize> {
        self.ready.iter().position(|t| t.id == task_id).map(|i| i + 1)
    }

    pub fn queued_ids(&self) -> impl Iterator<Item = &str> {
        self.ready.iter().map(|t| t.id.as_str())
    }

    pub fn in_flight_ids(&self) -> impl Iterator<Item = &str> {
        self.in_flight.iter().map(|id| id.as_str())
    }

    /// Append a ready task. Returns its 1-based queue position, or `None` if
    /// it was already queued or in flight.
    pub fn enqueue(&mut self, task_id: &str, priority: i64) -> Option<usize> {
        if self.is_queued(task_id) || self.in_flight.contains(task_id) {
            debug!(task = %task_id, "task already queued or in flight; not enqueuing again");
            return None;
        }

        self.ready.push_back(QueuedTask {
            id: task_id.to_string(),
            priority,
        });
        Some(self.ready.len())
    }

    /// Pop tasks from the front while active and below the concurrency limit,
    /// marking each as in flight.
    pub fn admit_ready(&mut self) -> Vec<TaskId> {
        self.admit_ready_where(|_| true)
    }

    /// Like [`admit_ready`](Self::admit_ready), but tasks for which
    /// `can_start` returns `false` stay queued in place and are passed over.
    pub fn admit_ready_where(&mut self, can_start: impl Fn(&str) -> bool) -> Vec<TaskId> {
        let mut admitted = Vec::new();
        let mut index = 0;

        while self.active && self.in_flight.len() < self.max_concurrency {
            let Some(candidate) = self.ready.get(index) else {
                break;
            };
            if !can_start(&candidate.id) {
                debug!(
                    task = %candidate.id,
                    "previous execution still running; holding task in queue"
                );
                index += 1;
                continue;
            }
            let Some(next) = self.ready.remove(index) else {
                break;
            };
            debug!(
                task = %next.id,
                in_flight = self.in_flight.len() + 1,
                max = self.max_concurrency,
                "admitting task"
            );
            self.in_flight.insert(next.id.clone());
            admitted.push(next.id);
        }

        admitted
    }

    /// Free the slot held by `task_id`.
    pub fn release(&mut self, task_id: &str) -> bool {
        let released = self.in_flight.remove(task_id);
        if !released {
            debug!(task = %task_id, "release for task that was not in flight");
        }
        released
    }

    /// Remove a task from the ready queue (not from in flight).
    pub fn remove(&mut self, task_id: &str) -> bool {
        let before = self.ready.len();
        self.ready.retain(|t| t.id != task_id);
        before != self.ready.len()
    }

    /// Move a queued task to reflect a new priority.
    ///
    /// The task is placed before the first queued task with a strictly lower
    /// priority, or at the back if there is none. Returns `false` if the task
    /// is not queued.
    pub fn reorder_by_priority(&mut self, task_id: &str, new_priority: i64) -> bool {
        let Some(index) = self.ready.iter().position(|t| t.id == task_id) else {
            return false;
        };

        let Some(mut entry) = self.ready.remove(index) else {
            return false;
        };
        entry.priority = new_priority;

        let insert_at = self
            .ready
            .iter()
            .position(|t| new_priority > t.priority)
            .unwrap_or(self.ready.len());
        self.ready.insert(insert_at, entry);

        debug!(task = %task_id, new_priority, position = insert_at + 1, "reordered queued task");
        true
    }

    /// Drop every queued task. In-flight tasks are untouched.
    pub fn clear(&mut self) -> Vec<TaskId> {
        let dropped: Vec<TaskId> = self.ready.drain(..).map(|t| t.id).collect();
        if !dropped.is_empty() {
            warn!(?dropped, "cleared ready queue");
        }
        dropped
    }

    /// Reset to an empty queue and no in-flight tasks.
    pub fn reset(&mut self) {
        self.ready.clear();
        self.in_flight.clear();
    }
}
