// src/engine/coordinator.rs

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::config::SchedulerSection;
use crate::exec::TaskRunner;
use crate::notify::{Event, EventKind, NotificationSink, ObserverId};
use crate::types::{BoxFuture, PlanContext, Task, TaskId, TaskPatch};

use super::core::{Admission, CoreCommand, CoreStep, ExecutionOutcome, SchedulerState};
use super::status::{DetailedStatus, ExecutionStatus, TaskStatistics};

/// Async shell around [`SchedulerState`].
///
/// Every public operation locks the scheduler state, applies the pure core
/// operation and carries out the returned commands (sink broadcasts and
/// runner launches) before releasing the lock, so notifications are emitted
/// in the order the core produced them. Runners execute outside the lock;
/// their results are fed back through the same path.
///
/// The handle is cheap to clone and safe to call from many tasks at once.
pub struct Coordinator<R: TaskRunner> {
    inner: Arc<Inner<R>>,
}

struct Inner<R> {
    agent_id: String,
    shutdown_timeout: Duration,
    state: Mutex<SchedulerState>,
    runner: Arc<R>,
    sink: Arc<dyn NotificationSink>,
    /// Supervised executions. Each child reports its own outcome.
    children: Mutex<JoinSet<()>>,
    idle: Notify,
}

impl<R: TaskRunner> Clone for Coordinator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TaskRunner> fmt::Debug for Coordinator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("agent_id", &self.inner.agent_id)
            .field("shutdown_timeout", &self.inner.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

/// Aborts the wrapped task when dropped, so aborting a supervised child also
/// stops the runner it launched.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("runner panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("runner panicked: {msg}")
    } else {
        "runner panicked".to_string()
    }
}

impl<R: TaskRunner> Coordinator<R> {
    pub fn new(config: &SchedulerSection, runner: R, sink: Arc<dyn NotificationSink>) -> Self {
        let state = SchedulerState::new(
            config.max_concurrency,
            config.supported_agent_types.clone(),
        );

        Self {
            inner: Arc::new(Inner {
                agent_id: config.agent_id.clone(),
                shutdown_timeout: config.shutdown_timeout(),
                state: Mutex::new(state),
                runner: Arc::new(runner),
                sink,
                children: Mutex::new(JoinSet::new()),
                idle: Notify::new(),
            }),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.inner.agent_id
    }

    // ----- plan lifecycle --------------------------------------------------

    /// Reset scheduler state for a new plan and start admitting.
    pub async fn handle_plan_start(&self, plan: PlanContext) {
        let mut state = self.inner.state.lock().await;
        let step = state.start_plan(plan);
        self.commit(state, step).await;
    }

    /// Accept one task from the planner.
    pub async fn handle_task_from_pm(&self, task: Task) {
        debug!(task = %task.id, "task received from planner");
        let mut state = self.inner.state.lock().await;
        let step = state.receive_task(task);
        self.commit(state, step).await;
    }

    pub async fn handle_plan_complete(&self, plan_id: &str, total_tasks: usize) {
        let mut state = self.inner.state.lock().await;
        let step = state.complete_plan(plan_id, total_tasks);
        self.commit(state, step).await;
    }

    // ----- operator controls -----------------------------------------------

    pub async fn pause_processing(&self) {
        let mut state = self.inner.state.lock().await;
        let step = state.pause();
        self.commit(state, step).await;
    }

    pub async fn resume_processing(&self) {
        let mut state = self.inner.state.lock().await;
        let step = state.resume();
        self.commit(state, step).await;
    }

    pub async fn handle_emergency_stop(&self) {
        let mut state = self.inner.state.lock().await;
        let step = state.emergency_stop();
        self.commit(state, step).await;
    }

    /// Returns `false` if the task is unknown.
    pub async fn handle_priority_change(&self, task_id: &str, new_priority: i64) -> bool {
        let mut state = self.inner.state.lock().await;
        let step = state.change_priority(task_id, new_priority);
        self.commit_if_found(state, step).await
    }

    /// Returns `false` if the task is unknown.
    pub async fn force_complete_task(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let step = state.force_complete(task_id);
        self.commit_if_found(state, step).await
    }

    /// Returns `false` if the task is unknown or skipped.
    pub async fn reset_task_status(&self, task_id: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let step = state.reset_task(task_id);
        self.commit_if_found(state, step).await
    }

    /// Returns `false` if the task is unknown.
    pub async fn handle_task_update(&self, task_id: &str, patches: Vec<TaskPatch>) -> bool {
        let mut state = self.inner.state.lock().await;
        let step = state.update_task(task_id, patches);
        self.commit_if_found(state, step).await
    }

    // ----- queries ---------------------------------------------------------

    pub async fn get_execution_status(&self) -> ExecutionStatus {
        self.inner.state.lock().await.execution_status(&self.inner.agent_id)
    }

    pub async fn get_task_statistics(&self) -> TaskStatistics {
        self.inner.state.lock().await.statistics()
    }

    pub async fn get_detailed_status(&self) -> DetailedStatus {
        self.inner.state.lock().await.detailed_status(&self.inner.agent_id)
    }

    pub async fn get_task(&self, task_id: &str) -> Option<Task> {
        self.inner.state.lock().await.task(task_id).cloned()
    }

    /// Every known task of the current plan, ordered by id.
    pub async fn all_tasks(&self) -> Vec<Task> {
        self.inner.state.lock().await.tasks().cloned().collect()
    }

    /// Completion state of each declared dependency, or `None` for an
    /// unknown task.
    pub async fn dependency_status(&self, task_id: &str) -> Option<BTreeMap<TaskId, bool>> {
        self.inner.state.lock().await.dependency_status(task_id)
    }

    /// Deliver a detailed status snapshot to a single observer.
    pub async fn send_status_to(&self, observer: ObserverId) {
        let status = self.get_detailed_status().await;
        let message = format!(
            "{} of {} tasks completed",
            status.statistics.completed_tasks, status.statistics.total_tasks
        );
        let event = Event::new(
            self.inner.agent_id.as_str(),
            EventKind::StatusSnapshot {
                status: Box::new(status),
            },
            message,
        );
        self.inner.sink.send_to(observer, event).await;
    }

    /// Resolve once nothing is queued or executing.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.state.lock().await.is_idle() {
                return;
            }
            notified.await;
        }
    }

    // ----- shutdown --------------------------------------------------------

    /// Stop admitting, wait up to the configured timeout for in-flight tasks
    /// to finish, then abort whatever is left.
    pub async fn shutdown(&self) {
        let in_flight = self.inner.state.lock().await.begin_shutdown();
        info!(
            in_flight = ?in_flight,
            timeout = ?self.inner.shutdown_timeout,
            "shutting down; waiting for in-flight tasks"
        );

        let mut children = std::mem::take(&mut *self.inner.children.lock().await);
        let drained = tokio::time::timeout(self.inner.shutdown_timeout, async {
            while children.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        let still_in_flight = if drained {
            Vec::new()
        } else {
            let still = self.inner.state.lock().await.begin_shutdown();
            warn!(still_in_flight = ?still, "shutdown timeout elapsed; aborting remaining tasks");
            children.abort_all();
            still
        };

        let message = if still_in_flight.is_empty() {
            "Agent shut down".to_string()
        } else {
            format!("Agent shut down with {} tasks still running", still_in_flight.len())
        };
        self.broadcast(EventKind::AgentShutdown { still_in_flight }, message)
            .await;
        self.inner.idle.notify_waiters();
    }

    // ----- command execution -----------------------------------------------

    async fn commit(&self, state: MutexGuard<'_, SchedulerState>, step: CoreStep) {
        self.execute(step).await;
        let idle = state.is_idle();
        drop(state);

        if idle {
            self.inner.idle.notify_waiters();
        }
    }

    async fn commit_if_found(
        &self,
        state: MutexGuard<'_, SchedulerState>,
        step: Option<CoreStep>,
    ) -> bool {
        match step {
            Some(step) => {
                self.commit(state, step).await;
                true
            }
            None => false,
        }
    }

    async fn execute(&self, step: CoreStep) {
        for command in step.commands {
            match command {
                CoreCommand::Notify { kind, message } => self.broadcast(kind, message).await,
                CoreCommand::Dispatch(admissions) => self.spawn_admissions(admissions).await,
            }
        }
    }

    async fn broadcast(&self, kind: EventKind, message: String) {
        let event = Event::new(self.inner.agent_id.as_str(), kind, message);
        self.inner.sink.broadcast(event).await;
    }

    async fn spawn_admissions(&self, admissions: Vec<Admission>) {
        let mut children = self.inner.children.lock().await;
        while children.try_join_next().is_some() {}

        for admission in admissions {
            debug!(task = %admission.task.id, token = admission.token, "spawning runner");
            let this = self.clone();
            children.spawn(this.run_admission(admission));
        }
    }

    /// Run one admission and feed its outcome back to the core.
    ///
    /// Boxed because finishing an execution may dispatch further admissions.
    fn run_admission(self, admission: Admission) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let Admission {
                task,
                context,
                token,
            } = admission;
            let task_id = task.id.clone();

            let runner = Arc::clone(&self.inner.runner);
            let mut handle = AbortOnDrop(tokio::spawn(async move {
                runner.execute(task, context).await
            }));

            let outcome = match (&mut handle.0).await {
                Ok(task) => ExecutionOutcome::Finished(task),
                Err(err) if err.is_panic() => {
                    ExecutionOutcome::Crashed(panic_message(err.into_panic()))
                }
                Err(err) => ExecutionOutcome::Crashed(err.to_string()),
            };

            let mut state = self.inner.state.lock().await;
            let step = state.finish_execution(&task_id, token, outcome);
            self.commit(state, step).await;
        })
    }
}
