// src/engine/core.rs

//! Pure scheduler state machine.
//!
//! [`SchedulerState`] owns the pending-task table, the dependency tracker and
//! the execution queue. Every operation mutates that state synchronously and
//! returns a [`CoreStep`]: the notifications to emit and the admissions to
//! launch, in order. The async shell (`engine::coordinator::Coordinator`) is
//! responsible for:
//! - delivering notifications to the sink
//! - spawning the runner for each admission
//! - feeding execution results back via [`SchedulerState::finish_execution`]
//!
//! The core has no Tokio types, performs no IO and is unit tested directly.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::dag::{find_cycle_through, DependencyTracker, Readiness};
use crate::engine::queue::ExecutionQueue;
use crate::engine::status::{DetailedStatus, ExecutionStatus, QueueEntry, TaskStatistics};
use crate::errors::{DevdagError, TaskError};
use crate::exec::{ExecutionContext, TaskRef};
use crate::notify::EventKind;
use crate::types::{PlanContext, Task, TaskId, TaskPatch, TaskStatus};

/// Number of recently completed tasks handed to the runner as context.
const RECENT_CONTEXT: usize = 3;

/// A task admitted for execution, with everything the runner needs.
#[derive(Debug, Clone)]
pub struct Admission {
    pub task: Task,
    pub context: ExecutionContext,
    /// Run token; the result is only accepted while it is still current.
    pub token: u64,
}

/// How an execution ended, as observed by the shell.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// The runner returned the task (normally `Completed` or `Failed`).
    Finished(Task),
    /// The runner panicked or was aborted.
    Crashed(String),
}

/// Command produced by the core, to be executed by the shell in order.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Broadcast an event to all observers.
    Notify { kind: EventKind, message: String },
    /// Launch these admissions concurrently.
    Dispatch(Vec<Admission>),
}

/// Commands returned by the core after handling a single operation.
#[derive(Debug, Clone, Default)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
}

impl CoreStep {
    fn notify(&mut self, kind: EventKind, message: impl Into<String>) {
        self.commands.push(CoreCommand::Notify {
            kind,
            message: message.into(),
        });
    }

    fn dispatch(&mut self, admissions: Vec<Admission>) {
        if !admissions.is_empty() {
            self.commands.push(CoreCommand::Dispatch(admissions));
        }
    }

    /// Notification kinds in emission order (for tests and logging).
    pub fn event_tags(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Notify { kind, .. } => Some(kind.tag()),
                CoreCommand::Dispatch(_) => None,
            })
            .collect()
    }

    /// Ids of every task admitted in this step.
    pub fn admitted(&self) -> Vec<TaskId> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::Dispatch(admissions) => Some(admissions),
                CoreCommand::Notify { .. } => None,
            })
            .flatten()
            .map(|a| a.task.id.clone())
            .collect()
    }
}

/// Scheduler state for the current plan.
#[derive(Debug)]
pub struct SchedulerState {
    tasks: BTreeMap<TaskId, Task>,
    tracker: DependencyTracker,
    queue: ExecutionQueue,
    plan: Option<PlanContext>,
    plan_complete: bool,
    supported_agent_types: Vec<String>,
    /// Token whose result will be accepted, per admitted task.
    accepted: HashMap<TaskId, u64>,
    /// Executions still physically running, by token. Outlives `accepted`
    /// when an execution is superseded.
    running: HashMap<TaskId, u64>,
    next_token: u64,
}

impl SchedulerState {
    /// Create an idle scheduler. Nothing is admitted until a plan starts.
    pub fn new(max_concurrency: usize, supported_agent_types: Vec<String>) -> Self {
        Self {
            tasks: BTreeMap::new(),
            tracker: DependencyTracker::new(),
            queue: ExecutionQueue::new(max_concurrency),
            plan: None,
            plan_complete: false,
            supported_agent_types,
            accepted: HashMap::new(),
            running: HashMap::new(),
            next_token: 0,
        }
    }

    // ----- accessors -------------------------------------------------------

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn plan(&self) -> Option<&PlanContext> {
        self.plan.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.queue.is_active()
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    pub fn tracker(&self) -> &DependencyTracker {
        &self.tracker
    }

    /// Nothing queued, nothing in flight and no superseded execution running.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.queue.in_flight_count() == 0 && self.running.is_empty()
    }

    /// Whether each declared dependency of `task_id` has completed, or `None`
    /// for an unknown task.
    pub fn dependency_status(&self, task_id: &str) -> Option<BTreeMap<TaskId, bool>> {
        let task = self.tasks.get(task_id)?;
        Some(
            task.dependencies
                .iter()
                .map(|dep| (dep.clone(), self.tracker.is_completed(dep)))
                .collect(),
        )
    }

    fn supports(&self, agent_type: &str) -> bool {
        self.supported_agent_types.iter().any(|t| t == agent_type)
    }

    fn title_of(&self, task_id: &str) -> String {
        self.tasks
            .get(task_id)
            .map(|t| t.title.clone())
            .unwrap_or_else(|| task_id.to_string())
    }

    // ----- plan lifecycle --------------------------------------------------

    /// Reset all per-plan state and start accepting tasks for `plan`.
    ///
    /// Results of executions from a previous plan are ignored when they
    /// arrive, since their tokens are no longer accepted.
    pub fn start_plan(&mut self, plan: PlanContext) -> CoreStep {
        let mut step = CoreStep::default();

        if !self.accepted.is_empty() {
            warn!(
                superseded = ?self.accepted.keys().collect::<Vec<_>>(),
                "new plan started while tasks were in flight; their results will be ignored"
            );
        }

        self.tasks.clear();
        self.tracker.clear();
        self.queue.reset();
        self.accepted.clear();
        self.plan_complete = false;
        self.queue.set_active(true);

        info!(plan = %plan.id, title = %plan.title, "plan started");
        step.notify(
            EventKind::PlanAcknowledgment {
                plan_id: plan.id.clone(),
            },
            format!("Acknowledged plan '{}'", plan.title),
        );
        self.plan = Some(plan);
        step
    }

    /// The planner has emitted every task of the current plan.
    pub fn complete_plan(&mut self, plan_id: &str, total_tasks: usize) -> CoreStep {
        let mut step = CoreStep::default();
        self.plan_complete = true;

        info!(plan = %plan_id, total_tasks, known = self.tasks.len(), "plan complete");
        step.notify(
            EventKind::PlanCompleteAck {
                plan_id: plan_id.to_string(),
                total_tasks,
                pending_tasks: self.tasks.len(),
                ready_tasks: self.queue.len(),
            },
            format!(
                "Plan received: {} tasks, {} ready to run",
                self.tasks.len(),
                self.queue.len()
            ),
        );

        self.admit_and_dispatch(&mut step);
        step
    }

    // ----- task arrival ----------------------------------------------------

    /// Upsert a task from the planner and evaluate its readiness.
    ///
    /// A task that is already running or completed only has its descriptive
    /// fields refreshed. Anything else is replaced and evaluated from scratch.
    pub fn receive_task(&mut self, mut task: Task) -> CoreStep {
        let mut step = CoreStep::default();
        let id = task.id.clone();

        step.notify(
            EventKind::TaskReceived {
                task_id: id.clone(),
                title: task.title.clone(),
                dependencies: task.dependencies.clone(),
            },
            format!("Received task '{}'", task.title),
        );

        if let Some(existing) = self.tasks.get_mut(&id) {
            if matches!(existing.status, TaskStatus::InProgress | TaskStatus::Completed) {
                debug!(
                    task = %id,
                    status = %existing.status,
                    "task resubmitted; refreshing metadata only"
                );
                existing.title = task.title;
                existing.description = task.description;
                existing.estimated_hours = task.estimated_hours;
                existing.complexity = task.complexity;
                return step;
            }
        }

        if !self.supports(&task.agent_type) {
            self.queue.remove(&id);
            self.tracker.forget(&id);

            let err = TaskError::UnknownAgentType(task.agent_type.clone());
            warn!(
                task = %id,
                agent_type = %task.agent_type,
                "skipping task with unsupported agent type"
            );
            step.notify(
                EventKind::status_error(&id, TaskStatus::Skipped, &err),
                format!("Task '{}' skipped: {err}", task.title),
            );
            task.status = TaskStatus::Skipped;
            self.tasks.insert(id, task);
            return step;
        }

        task.status = TaskStatus::Pending;
        self.tasks.insert(id.clone(), task);
        self.evaluate_readiness(&id, &mut step);
        step
    }

    /// Register the task's dependencies; enqueue and admit it if they are all
    /// met, otherwise park it as waiting.
    fn evaluate_readiness(&mut self, task_id: &str, step: &mut CoreStep) {
        let Some(task) = self.tasks.get(task_id) else {
            return;
        };
        let readiness = self.tracker.register(task_id, &task.dependencies);
        self.apply_readiness(task_id, readiness, step);
    }

    /// Queue a ready task, or report what a blocked one is waiting for.
    fn apply_readiness(&mut self, task_id: &str, readiness: Readiness, step: &mut CoreStep) {
        let title = self.title_of(task_id);

        match readiness {
            Readiness::Ready => {
                self.enqueue(task_id, step);
                self.admit_and_dispatch(step);
            }
            Readiness::Waiting(outstanding) => {
                if self.queue.remove(task_id) {
                    debug!(task = %task_id, "task no longer ready; removed from queue");
                }
                step.notify(
                    EventKind::TaskWaiting {
                        task_id: task_id.to_string(),
                        title: title.clone(),
                        waiting_for: outstanding.clone(),
                    },
                    format!("Task '{title}' waiting for: {}", outstanding.join(", ")),
                );
                self.report_cycle(task_id, step);
            }
        }
    }

    fn report_cycle(&self, task_id: &str, step: &mut CoreStep) {
        let pending = self
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| (t.id.as_str(), t.dependencies.as_slice()));

        let Some(cycle) = find_cycle_through(task_id, pending) else {
            return;
        };

        let err = DevdagError::CyclicDependency(cycle.join(" -> "));
        warn!(task = %task_id, error = %err, "task is blocked by a dependency cycle");
        step.notify(
            EventKind::TaskCycleDetected {
                task_id: task_id.to_string(),
                cycle,
            },
            format!("Task '{}' can never run: {err}", self.title_of(task_id)),
        );
    }

    fn enqueue(&mut self, task_id: &str, step: &mut CoreStep) {
        let Some(task) = self.tasks.get(task_id) else {
            return;
        };

        if let Some(position) = self.queue.enqueue(task_id, task.priority) {
            debug!(task = %task_id, position, "task queued");
            step.notify(
                EventKind::TaskQueued {
                    task_id: task_id.to_string(),
                    title: task.title.clone(),
                    queue_position: position,
                },
                format!("Task '{}' queued at position {position}", task.title),
            );
        }
    }

    // ----- admission -------------------------------------------------------

    /// Admit as many queued tasks as the concurrency limit allows and emit a
    /// dispatch command for them.
    fn admit_and_dispatch(&mut self, step: &mut CoreStep) {
        let running = &self.running;
        let admitted = self.queue.admit_ready_where(|id| !running.contains_key(id));

        let mut admissions = Vec::with_capacity(admitted.len());
        for id in admitted {
            let context = self.execution_context(&id);
            let Some(task) = self.tasks.get_mut(&id) else {
                warn!(task = %id, "admitted task missing from task table; releasing slot");
                self.queue.release(&id);
                continue;
            };

            task.status = TaskStatus::InProgress;
            self.next_token += 1;
            let token = self.next_token;
            self.accepted.insert(id.clone(), token);
            self.running.insert(id.clone(), token);

            info!(task = %id, token, "dispatching task");
            admissions.push(Admission {
                task: task.clone(),
                context,
                token,
            });
        }

        step.dispatch(admissions);
    }

    fn task_ref(&self, task_id: &str) -> TaskRef {
        TaskRef {
            id: task_id.to_string(),
            title: self.tasks.get(task_id).map(|t| t.title.clone()),
        }
    }

    fn execution_context(&self, task_id: &str) -> ExecutionContext {
        let dependencies = self
            .tasks
            .get(task_id)
            .map(|t| t.dependencies.iter().map(|d| self.task_ref(d)).collect())
            .unwrap_or_default();

        ExecutionContext {
            plan: self.plan.clone(),
            position: self.tracker.completed_count() + 1,
            total: self.tasks.len(),
            dependencies,
            recently_completed: self
                .tracker
                .recently_completed(RECENT_CONTEXT)
                .iter()
                .map(|id| self.task_ref(id))
                .collect(),
        }
    }

    /// Apply the result of an execution launched with `token`.
    ///
    /// Results of superseded executions are dropped. Only `Completed`
    /// unblocks dependents; dependents of a failed task stay waiting.
    pub fn finish_execution(
        &mut self,
        task_id: &str,
        token: u64,
        outcome: ExecutionOutcome,
    ) -> CoreStep {
        let mut step = CoreStep::default();

        if self.running.get(task_id) == Some(&token) {
            self.running.remove(task_id);
        }

        if self.accepted.get(task_id) != Some(&token) {
            debug!(task = %task_id, token, "ignoring result of superseded execution");
            // A resubmission of this id may have been held back while the old
            // execution was still running.
            self.admit_and_dispatch(&mut step);
            return step;
        }
        self.accepted.remove(task_id);
        self.queue.release(task_id);

        match outcome {
            ExecutionOutcome::Finished(result) => match result.status {
                TaskStatus::Completed => {
                    info!(task = %task_id, token, "task completed");
                    self.set_status(task_id, TaskStatus::Completed);
                    self.complete_and_unblock(task_id, &mut step);
                }
                TaskStatus::Failed => {
                    warn!(task = %task_id, token, "task failed; dependents stay blocked");
                    self.set_status(task_id, TaskStatus::Failed);
                }
                other => {
                    let err = TaskError::Unexpected(format!(
                        "runner returned non-terminal status {other}"
                    ));
                    warn!(task = %task_id, token, error = %err, "treating task as failed");
                    self.fail(task_id, &err, &mut step);
                }
            },
            ExecutionOutcome::Crashed(reason) => {
                let err = TaskError::Unexpected(reason);
                error!(task = %task_id, token, error = %err, "task execution crashed");
                self.fail(task_id, &err, &mut step);
            }
        }

        self.admit_and_dispatch(&mut step);
        step
    }

    fn set_status(&mut self, task_id: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.status = status;
        }
    }

    fn fail(&mut self, task_id: &str, err: &TaskError, step: &mut CoreStep) {
        self.set_status(task_id, TaskStatus::Failed);
        step.notify(
            EventKind::TaskFailed {
                task_id: task_id.to_string(),
                error_kind: err.kind(),
                error: err.to_string(),
            },
            format!("Task '{}' failed: {err}", self.title_of(task_id)),
        );
    }

    /// Mark completed in the tracker and enqueue every task this unblocks.
    fn complete_and_unblock(&mut self, task_id: &str, step: &mut CoreStep) {
        for other in self.tracker.complete(task_id) {
            let Some(task) = self.tasks.get(&other) else {
                continue;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            info!(task = %other, unblocked_by = %task_id, "task unblocked");
            step.notify(
                EventKind::TaskUnblocked {
                    task_id: other.clone(),
                    title: task.title.clone(),
                    unblocked_by: task_id.to_string(),
                },
                format!("Task '{}' unblocked by '{task_id}'", task.title),
            );
            self.enqueue(&other, step);
        }
    }

    /// Stop admitting and list what is still in flight.
    pub fn begin_shutdown(&mut self) -> Vec<TaskId> {
        self.queue.set_active(false);
        self.queue.in_flight_ids().map(str::to_string).collect()
    }

    // ----- operator controls -----------------------------------------------

    pub fn pause(&mut self) -> CoreStep {
        let mut step = CoreStep::default();
        self.queue.set_active(false);
        info!(in_flight = self.queue.in_flight_count(), "processing paused");
        step.notify(EventKind::ProcessingPaused, "Task processing paused");
        step
    }

    pub fn resume(&mut self) -> CoreStep {
        let mut step = CoreStep::default();
        self.queue.set_active(true);
        info!(queued = self.queue.len(), "processing resumed");
        step.notify(EventKind::ProcessingResumed, "Task processing resumed");
        self.admit_and_dispatch(&mut step);
        step
    }

    /// Stop admitting and drop the ready queue. In-flight tasks keep running.
    pub fn emergency_stop(&mut self) -> CoreStep {
        let mut step = CoreStep::default();
        self.queue.set_active(false);
        let dropped = self.queue.clear();
        let in_progress: Vec<TaskId> = self.queue.in_flight_ids().map(str::to_string).collect();

        warn!(?dropped, ?in_progress, "emergency stop");
        step.notify(
            EventKind::EmergencyStop {
                in_progress_tasks: in_progress.clone(),
            },
            format!(
                "Emergency stop: {} queued tasks dropped, {} still running",
                dropped.len(),
                in_progress.len()
            ),
        );
        step
    }

    /// Returns `None` for an unknown task.
    pub fn change_priority(&mut self, task_id: &str, new_priority: i64) -> Option<CoreStep> {
        let mut step = CoreStep::default();
        let old_priority = self.apply_priority(task_id, new_priority)?;
        step.notify(
            EventKind::TaskPriorityChanged {
                task_id: task_id.to_string(),
                old_priority,
                new_priority,
            },
            format!(
                "Priority of '{}' changed from {old_priority} to {new_priority}",
                self.title_of(task_id)
            ),
        );
        Some(step)
    }

    fn apply_priority(&mut self, task_id: &str, new_priority: i64) -> Option<i64> {
        let task = self.tasks.get_mut(task_id)?;
        let old = std::mem::replace(&mut task.priority, new_priority);
        self.queue.reorder_by_priority(task_id, new_priority);
        debug!(task = %task_id, old, new = new_priority, "priority updated");
        Some(old)
    }

    /// Returns `None` for an unknown task.
    pub fn force_complete(&mut self, task_id: &str) -> Option<CoreStep> {
        if !self.tasks.contains_key(task_id) {
            warn!(task = %task_id, "force complete requested for unknown task");
            return None;
        }
        let mut step = CoreStep::default();
        self.force_complete_in(task_id, &mut step);
        self.admit_and_dispatch(&mut step);
        Some(step)
    }

    fn force_complete_in(&mut self, task_id: &str, step: &mut CoreStep) {
        self.supersede(task_id);
        self.tracker.forget(task_id);
        self.set_status(task_id, TaskStatus::Completed);

        info!(task = %task_id, "task force completed");
        step.notify(
            EventKind::TaskForceCompleted {
                task_id: task_id.to_string(),
            },
            format!("Task '{}' force completed", self.title_of(task_id)),
        );
        self.complete_and_unblock(task_id, step);
    }

    /// Returns `None` for an unknown task or one that cannot be reset.
    pub fn reset_task(&mut self, task_id: &str) -> Option<CoreStep> {
        let mut step = CoreStep::default();
        self.reset_in(task_id, &mut step).then_some(step)
    }

    fn reset_in(&mut self, task_id: &str, step: &mut CoreStep) -> bool {
        let Some(task) = self.tasks.get(task_id) else {
            warn!(task = %task_id, "reset requested for unknown task");
            return false;
        };
        if task.status == TaskStatus::Skipped {
            warn!(task = %task_id, "skipped tasks cannot be reset");
            return false;
        }

        self.tracker.uncomplete(task_id);
        self.supersede(task_id);
        self.set_status(task_id, TaskStatus::Pending);

        info!(task = %task_id, "task reset to pending");
        step.notify(
            EventKind::TaskReset {
                task_id: task_id.to_string(),
            },
            format!("Task '{}' reset to pending", self.title_of(task_id)),
        );
        self.evaluate_readiness(task_id, step);
        true
    }

    /// Drop the task from the queue and its slot, and stop accepting the
    /// result of any execution currently running for it.
    fn supersede(&mut self, task_id: &str) {
        self.queue.remove(task_id);
        if self.queue.release(task_id) {
            debug!(task = %task_id, "in-flight execution superseded");
        }
        self.accepted.remove(task_id);
    }

    /// Apply typed field updates. Returns `None` for an unknown task.
    ///
    /// Status patches are mapped onto operator transitions; a patch that is
    /// not a valid transition is logged and skipped.
    pub fn update_task(&mut self, task_id: &str, patches: Vec<TaskPatch>) -> Option<CoreStep> {
        if !self.tasks.contains_key(task_id) {
            warn!(task = %task_id, "update requested for unknown task");
            return None;
        }

        let mut step = CoreStep::default();
        let fields: Vec<String> = patches.iter().map(|p| p.field_name().to_string()).collect();
        let mut dependencies_changed = false;
        let mut status_changes = Vec::new();

        for patch in patches {
            match patch {
                TaskPatch::Priority(priority) => {
                    self.apply_priority(task_id, priority);
                }
                TaskPatch::Status(status) => status_changes.push(status),
                other => {
                    let Some(task) = self.tasks.get_mut(task_id) else {
                        continue;
                    };
                    match other {
                        TaskPatch::Title(title) => task.title = title,
                        TaskPatch::Description(description) => task.description = description,
                        TaskPatch::Dependencies(dependencies) => {
                            task.dependencies = dependencies;
                            dependencies_changed = true;
                        }
                        TaskPatch::Priority(_) | TaskPatch::Status(_) => {}
                    }
                }
            }
        }

        step.notify(
            EventKind::TaskUpdated {
                task_id: task_id.to_string(),
                fields: fields.clone(),
            },
            format!("Task '{}' updated: {}", self.title_of(task_id), fields.join(", ")),
        );

        if dependencies_changed {
            match self.tasks.get(task_id) {
                Some(task) if task.status == TaskStatus::Pending => {
                    let readiness = self
                        .tracker
                        .replace_dependencies(task_id, &task.dependencies);
                    self.apply_readiness(task_id, readiness, &mut step);
                }
                _ => debug!(task = %task_id, "dependencies changed on a non-pending task"),
            }
        }

        for status in status_changes {
            self.apply_status(task_id, status, &mut step);
        }

        Some(step)
    }

    fn apply_status(&mut self, task_id: &str, status: TaskStatus, step: &mut CoreStep) {
        let Some(current) = self.tasks.get(task_id).map(|t| t.status) else {
            return;
        };
        if current == status {
            return;
        }

        match status {
            TaskStatus::Pending => {
                self.reset_in(task_id, step);
            }
            TaskStatus::Completed => {
                self.force_complete_in(task_id, step);
                self.admit_and_dispatch(step);
            }
            TaskStatus::Failed => {
                self.supersede(task_id);
                self.tracker.forget(task_id);
                self.tracker.uncomplete(task_id);
                self.set_status(task_id, TaskStatus::Failed);
                info!(task = %task_id, "task marked failed by operator");
                step.notify(
                    EventKind::status_update(task_id, TaskStatus::Failed),
                    format!("Task '{}' marked failed", self.title_of(task_id)),
                );
                self.admit_and_dispatch(step);
            }
            TaskStatus::Skipped if current == TaskStatus::Pending => {
                self.queue.remove(task_id);
                self.tracker.forget(task_id);
                self.set_status(task_id, TaskStatus::Skipped);
                info!(task = %task_id, "task skipped by operator");
                step.notify(
                    EventKind::status_update(task_id, TaskStatus::Skipped),
                    format!("Task '{}' skipped", self.title_of(task_id)),
                );
            }
            TaskStatus::Skipped | TaskStatus::InProgress => {
                warn!(task = %task_id, from = %current, to = %status, "rejected status transition");
            }
        }
    }

    // ----- snapshots -------------------------------------------------------

    pub fn statistics(&self) -> TaskStatistics {
        let count = |status| self.tasks.values().filter(|t| t.status == status).count();
        TaskStatistics {
            total_tasks: self.tasks.len(),
            completed_tasks: self.tracker.completed_count(),
            in_progress_tasks: self.queue.in_flight_count(),
            queued_tasks: self.queue.len(),
            waiting_tasks: self.tracker.waiting_count(),
            failed_tasks: count(TaskStatus::Failed),
            skipped_tasks: count(TaskStatus::Skipped),
        }
    }

    pub fn execution_status(&self, agent_id: &str) -> ExecutionStatus {
        let stats = self.statistics();
        ExecutionStatus {
            agent_id: agent_id.to_string(),
            plan_id: self.plan.as_ref().map(|p| p.id.clone()),
            plan_title: self.plan.as_ref().map(|p| p.title.clone()),
            total_tasks: stats.total_tasks,
            completed_tasks: stats.completed_tasks,
            in_progress_tasks: stats.in_progress_tasks,
            queued_tasks: stats.queued_tasks,
            waiting_tasks: stats.waiting_tasks,
            is_plan_complete: self.plan_complete,
            is_processing_active: self.queue.is_active(),
            timestamp: Utc::now(),
        }
    }

    pub fn detailed_status(&self, agent_id: &str) -> DetailedStatus {
        let task_queue = self
            .queue
            .queued_ids()
            .filter_map(|id| self.tasks.get(id))
            .map(|t| QueueEntry {
                id: t.id.clone(),
                title: t.title.clone(),
                priority: t.priority,
            })
            .collect();

        let dependency_graph = self
            .tasks
            .values()
            .filter(|t| !t.dependencies.is_empty())
            .map(|t| (t.id.clone(), t.dependencies.clone()))
            .collect();

        let waiting_for_dependencies = self
            .tracker
            .waiting_map()
            .iter()
            .map(|(id, deps)| (id.clone(), deps.iter().cloned().collect()))
            .collect();

        DetailedStatus {
            agent_id: agent_id.to_string(),
            plan_context: self.plan.clone(),
            statistics: self.statistics(),
            execution_status: self.execution_status(agent_id),
            task_queue,
            in_progress: self.queue.in_flight_ids().map(str::to_string).collect(),
            completed: self.tracker.completed_ids().to_vec(),
            dependency_graph,
            waiting_for_dependencies,
            timestamp: Utc::now(),
        }
    }
}
