// src/exec/task_runner.rs

//! Executes a single development task: prompt, stream, persist.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::GeneratorSection;
use crate::errors::TaskError;
use crate::notify::{Event, EventKind, FileType, NotificationSink};
use crate::types::{BoxFuture, Task, TaskStatus};

use super::artifacts::ArtifactStore;
use super::backend::{ExecutionContext, TaskRunner};
use super::generator::{GenerationRequest, ModelConfig, TextGenerator};
use super::prompt::{self, SYSTEM_PROMPT};

/// Chunks buffered between the generator and the notification relay.
const CHUNK_BUFFER: usize = 64;

/// Production [`TaskRunner`]: asks a [`TextGenerator`] for the task's code,
/// relays the stream to the sink and persists the result.
///
/// Always resolves to a terminal task. Generation failures and empty output
/// fail the task; persistence failures are reported but do not.
pub struct GenerationExecutor<G> {
    generator: G,
    artifacts: ArtifactStore,
    sink: Arc<dyn NotificationSink>,
    agent_id: String,
    model: ModelConfig,
    system_prompt: String,
}

/// Where a completed task's output ended up.
struct Persisted {
    output_dir: PathBuf,
    main_file: PathBuf,
}

impl<G: TextGenerator> GenerationExecutor<G> {
    pub fn new(
        generator: G,
        artifacts: ArtifactStore,
        sink: Arc<dyn NotificationSink>,
        agent_id: impl Into<String>,
        config: &GeneratorSection,
    ) -> Self {
        Self {
            generator,
            artifacts,
            sink,
            agent_id: agent_id.into(),
            model: ModelConfig {
                model: config.model.clone(),
                temperature: config.temperature,
            },
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
        }
    }

    async fn notify(&self, kind: EventKind, message: impl Into<String>) {
        let event = Event::new(self.agent_id.as_str(), kind, message);
        self.sink.broadcast(event).await;
    }

    async fn run(&self, mut task: Task, context: ExecutionContext) -> Task {
        info!(task = %task.id, title = %task.title, "starting task");
        task.status = TaskStatus::InProgress;
        self.notify(
            EventKind::status_update(&task.id, TaskStatus::InProgress),
            format!("Started task '{}'", task.title),
        )
        .await;

        match self.artifacts.clear_task_output(&task.id) {
            Ok(0) => {}
            Ok(removed) => debug!(task = %task.id, removed, "cleared previous outputs"),
            Err(err) => warn!(task = %task.id, error = %err, "failed to clear previous outputs"),
        }

        match self.generate_and_persist(&task, &context).await {
            Ok(persisted) => {
                task.status = TaskStatus::Completed;
                info!(task = %task.id, output = ?persisted.output_dir, "task completed");
                self.notify(
                    EventKind::TaskStatusUpdate {
                        task_id: task.id.clone(),
                        status: TaskStatus::Completed,
                        error: None,
                        error_kind: None,
                        output_directory: Some(persisted.output_dir.display().to_string()),
                        main_file: Some(persisted.main_file.display().to_string()),
                    },
                    format!("Completed task '{}'", task.title),
                )
                .await;
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                error!(task = %task.id, kind = ?err.kind(), error = %err, "task failed");
                self.notify(
                    EventKind::status_error(&task.id, TaskStatus::Failed, &err),
                    format!("Failed task '{}': {err}", task.title),
                )
                .await;
            }
        }

        task
    }

    async fn generate_and_persist(
        &self,
        task: &Task,
        context: &ExecutionContext,
    ) -> Result<Persisted, TaskError> {
        let enriched = prompt::enrich(task, context);
        let content = self.generate(&enriched).await?;

        if content.trim().is_empty() {
            return Err(TaskError::Content("generator produced no output".to_string()));
        }

        let task_dir = self.artifacts.task_dir(task);
        if let Err(source) = self.artifacts.create_task_dir(task) {
            self.report_persistence(task, task_dir.clone(), source).await;
        }

        let main_file = self.persist_primary(task, &content).await;

        match self.artifacts.write_metadata(task, std::slice::from_ref(&main_file)) {
            Ok((path, json)) => {
                self.announce_file(task, &path, FileType::Json, json).await;
            }
            Err(source) => {
                let path = self.artifacts.metadata_path(task);
                self.report_persistence(task, path, source).await;
            }
        }

        Ok(Persisted {
            output_dir: self.artifacts.relative(&task_dir),
            main_file: self.artifacts.relative(&main_file),
        })
    }

    /// Write the primary artifact, falling back to an error-annotated file.
    /// Returns the path that now holds the generated content.
    async fn persist_primary(&self, task: &Task, content: &str) -> PathBuf {
        let primary = self.artifacts.primary_path(task);

        let source = match self.artifacts.write_primary(task, content) {
            Ok(path) => {
                self.announce_file(task, &path, FileType::Source, content.to_string())
                    .await;
                return path;
            }
            Err(source) => source,
        };

        let reason = format!("{source:#}");
        self.report_persistence(task, primary.clone(), source).await;

        match self.artifacts.write_fallback(task, &reason, content) {
            Ok((path, body)) => {
                self.announce_file(task, &path, FileType::Text, body).await;
                path
            }
            Err(err) => {
                error!(task = %task.id, error = %err, "failed to write fallback artifact");
                primary
            }
        }
    }

    async fn announce_file(
        &self,
        task: &Task,
        path: &std::path::Path,
        file_type: FileType,
        content: String,
    ) {
        let file_name = self.artifacts.relative(path).display().to_string();
        info!(task = %task.id, file = %file_name, bytes = content.len(), "saved artifact");
        self.notify(
            EventKind::FileGenerated {
                task_id: task.id.clone(),
                file_name: file_name.clone(),
                file_type,
                content,
            },
            format!("Generated {file_name}"),
        )
        .await;
    }

    async fn report_persistence(&self, task: &Task, path: PathBuf, source: anyhow::Error) {
        let err = TaskError::Persistence { path, source };
        error!(task = %task.id, error = %err, "failed to persist artifact");
        self.notify(
            EventKind::Error {
                task_id: task.id.clone(),
                error_kind: err.kind(),
            },
            format!("Failed to save output for '{}': {err}", task.title),
        )
        .await;
    }

    /// Stream the generation, relaying each chunk, and return the full text.
    async fn generate(&self, task: &Task) -> Result<String, TaskError> {
        let request = GenerationRequest {
            user_prompt: prompt::construct_user_prompt(task),
            system_prompt: self.system_prompt.clone(),
            model: self.model.clone(),
        };

        self.notify(
            EventKind::LlmRequest {
                task_id: task.id.clone(),
            },
            format!("Requesting code for '{}'", task.title),
        )
        .await;

        let (tx, mut rx) = mpsc::channel::<String>(CHUNK_BUFFER);
        let producer = self.generator.stream(request, tx);
        let relay = async {
            let mut content = String::new();
            while let Some(chunk) = rx.recv().await {
                content.push_str(&chunk);
                self.notify(
                    EventKind::LlmStreamingChunk {
                        task_id: task.id.clone(),
                        content: chunk,
                    },
                    String::new(),
                )
                .await;
            }
            content
        };

        let (result, content) = tokio::join!(producer, relay);

        if let Err(err) = result {
            let err = TaskError::from(err);
            self.notify(
                EventKind::Error {
                    task_id: task.id.clone(),
                    error_kind: err.kind(),
                },
                format!("Generation failed for '{}': {err}", task.title),
            )
            .await;
            return Err(err);
        }

        debug!(task = %task.id, bytes = content.len(), "generation finished");
        self.notify(
            EventKind::LlmResponseComplete {
                task_id: task.id.clone(),
            },
            format!("Response complete for '{}'", task.title),
        )
        .await;
        Ok(content)
    }
}

impl<G: TextGenerator> TaskRunner for GenerationExecutor<G> {
    fn execute(&self, task: Task, context: ExecutionContext) -> BoxFuture<'_, Task> {
        Box::pin(self.run(task, context))
    }
}
