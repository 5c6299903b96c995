//! Scripted stand-ins for the runner, the sink and the text generator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::debug;

use devdag::errors::GenerationError;
use devdag::exec::{ExecutionContext, GenerationRequest, TaskRunner, TextGenerator};
use devdag::notify::{Event, NotificationSink, ObserverId};
use devdag::types::{BoxFuture, Task, TaskId, TaskStatus};

/// What a scripted execution does once released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Script {
    #[default]
    Complete,
    Fail,
    Panic,
    /// Return the task still marked `IN_PROGRESS`.
    NonTerminal,
}

#[derive(Default)]
struct RunnerState {
    scripts: Mutex<HashMap<TaskId, Script>>,
    gates: Mutex<HashMap<TaskId, Arc<Semaphore>>>,
    started: Mutex<Vec<TaskId>>,
    finished: Mutex<Vec<TaskId>>,
    contexts: Mutex<HashMap<TaskId, ExecutionContext>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    progress: Notify,
}

/// A fake runner that:
/// - records which tasks were started and finished, and with what context
/// - holds gated tasks until the test releases them
/// - tracks the highest number of concurrently running executions
/// - completes, fails or panics per task as scripted (default: complete)
///
/// Clones share state, so a test keeps one clone after handing the other to
/// the coordinator.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    state: Arc<RunnerState>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, task_id: &str, script: Script) -> &Self {
        self.state
            .scripts
            .lock()
            .unwrap()
            .insert(task_id.to_string(), script);
        self
    }

    /// Hold every execution of `task_id` until [`release`](Self::release).
    pub fn gate(&self, task_id: &str) -> &Self {
        self.state
            .gates
            .lock()
            .unwrap()
            .insert(task_id.to_string(), Arc::new(Semaphore::new(0)));
        self
    }

    /// Let one held (or future) execution of `task_id` proceed.
    pub fn release(&self, task_id: &str) {
        let gate = self.state.gates.lock().unwrap().get(task_id).cloned();
        match gate {
            Some(gate) => gate.add_permits(1),
            None => panic!("task {task_id} is not gated"),
        }
    }

    pub fn started(&self) -> Vec<TaskId> {
        self.state.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<TaskId> {
        self.state.finished.lock().unwrap().clone()
    }

    pub fn start_count(&self, task_id: &str) -> usize {
        self.started().iter().filter(|id| *id == task_id).count()
    }

    pub fn context_of(&self, task_id: &str) -> Option<ExecutionContext> {
        self.state.contexts.lock().unwrap().get(task_id).cloned()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.max_running.load(Ordering::SeqCst)
    }

    /// Wait until `task_id` has been started `times` times in total.
    pub async fn wait_started(&self, task_id: &str, times: usize) {
        self.wait_for(|| self.start_count(task_id) >= times).await;
    }

    /// Wait until `task_id` has finished at least once.
    pub async fn wait_finished(&self, task_id: &str) {
        self.wait_for(|| self.finished().iter().any(|id| id == task_id))
            .await;
    }

    async fn wait_for(&self, done: impl Fn() -> bool) {
        loop {
            let notified = self.state.progress.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if done() {
                return;
            }
            notified.await;
        }
    }
}

impl TaskRunner for ScriptedRunner {
    fn execute(&self, mut task: Task, context: ExecutionContext) -> BoxFuture<'_, Task> {
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let id = task.id.clone();
            state.started.lock().unwrap().push(id.clone());
            state.contexts.lock().unwrap().insert(id.clone(), context);
            let now = state.running.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_running.fetch_max(now, Ordering::SeqCst);
            state.progress.notify_waiters();

            debug!(task = %id, running = now, "scripted execution started");

            let gate = state.gates.lock().unwrap().get(&id).cloned();
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
                debug!(task = %id, "gate released");
            }

            state.running.fetch_sub(1, Ordering::SeqCst);
            let script = state
                .scripts
                .lock()
                .unwrap()
                .get(&id)
                .copied()
                .unwrap_or_default();

            debug!(task = %id, ?script, "scripted execution finishing");
            task.status = match script {
                Script::Complete => TaskStatus::Completed,
                Script::Fail => TaskStatus::Failed,
                Script::NonTerminal => TaskStatus::InProgress,
                Script::Panic => {
                    state.progress.notify_waiters();
                    panic!("scripted panic in {id}");
                }
            };

            state.finished.lock().unwrap().push(id);
            state.progress.notify_waiters();
            task
        })
    }
}

/// A sink that records every event it is handed.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    targeted: Mutex<Vec<(ObserverId, Event)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn targeted(&self) -> Vec<(ObserverId, Event)> {
        self.targeted.lock().unwrap().clone()
    }

    /// Event type tags in broadcast order.
    pub fn tags(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind.tag()).collect()
    }

    /// Event type tags about one task, in broadcast order.
    pub fn tags_for(&self, task_id: &str) -> Vec<&'static str> {
        self.events()
            .iter()
            .filter(|e| e.kind.task_id() == Some(task_id))
            .map(|e| e.kind.tag())
            .collect()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.tags().iter().filter(|t| **t == tag).count()
    }

    /// Events of one tag, in broadcast order.
    pub fn of(&self, tag: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind.tag() == tag)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
        self.targeted.lock().unwrap().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn broadcast(&self, event: Event) -> BoxFuture<'_, ()> {
        self.events.lock().unwrap().push(event);
        Box::pin(async {})
    }

    fn send_to(&self, observer: ObserverId, event: Event) -> BoxFuture<'_, ()> {
        self.targeted.lock().unwrap().push((observer, event));
        Box::pin(async {})
    }
}

/// What a scripted generation produces.
#[derive(Debug, Clone)]
pub enum GeneratorScript {
    /// Stream these chunks and succeed.
    Chunks(Vec<String>),
    /// Stream these chunks, then fail as an upstream error.
    FailAfter {
        chunks: Vec<String>,
        code: i32,
        stderr: String,
    },
}

/// A text generator replaying a fixed script and recording requests.
#[derive(Clone)]
pub struct ScriptedGenerator {
    script: GeneratorScript,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedGenerator {
    pub fn chunks(chunks: &[&str]) -> Self {
        Self::new(GeneratorScript::Chunks(
            chunks.iter().map(|c| c.to_string()).collect(),
        ))
    }

    pub fn new(script: GeneratorScript) -> Self {
        Self {
            script,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn stream(
        &self,
        request: GenerationRequest,
        chunks: mpsc::Sender<String>,
    ) -> BoxFuture<'_, Result<(), GenerationError>> {
        self.requests.lock().unwrap().push(request);
        let script = self.script.clone();

        Box::pin(async move {
            let (to_send, failure) = match script {
                GeneratorScript::Chunks(c) => (c, None),
                GeneratorScript::FailAfter {
                    chunks,
                    code,
                    stderr,
                } => (chunks, Some(GenerationError::Upstream { code, stderr })),
            };

            for chunk in to_send {
                chunks
                    .send(chunk)
                    .await
                    .map_err(|e| GenerationError::Stream(e.to_string()))?;
            }

            match failure {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}
