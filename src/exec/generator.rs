// src/exec/generator.rs

//! Text generation collaborator.
//!
//! The executor only needs "stream text for this prompt"; [`TextGenerator`]
//! is that capability. [`CommandGenerator`] implements it by running an
//! external shell command that reads the user prompt on stdin and writes the
//! generated text to stdout.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::GeneratorSection;
use crate::errors::GenerationError;
use crate::types::BoxFuture;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub user_prompt: String,
    pub system_prompt: String,
    pub model: ModelConfig,
}

/// Streams generated text as chunks over `chunks`.
///
/// Implementations resolve once the stream has ended. Chunks that were sent
/// before a failure are still delivered.
pub trait TextGenerator: Send + Sync + 'static {
    fn stream(
        &self,
        request: GenerationRequest,
        chunks: mpsc::Sender<String>,
    ) -> BoxFuture<'_, Result<(), GenerationError>>;
}

/// Runs `sh -c <cmd>` per request.
///
/// The user prompt is written to stdin; model settings and the system prompt
/// are passed as `DEVDAG_MODEL`, `DEVDAG_TEMPERATURE` and
/// `DEVDAG_SYSTEM_PROMPT`. Every stdout line is one chunk. A non-zero exit is
/// an upstream failure carrying the captured stderr.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    cmd: String,
}

impl CommandGenerator {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    pub fn from_config(config: &GeneratorSection) -> Self {
        Self::new(config.cmd.clone())
    }

    fn command(&self, request: &GenerationRequest) -> Command {
        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env("DEVDAG_MODEL", &request.model.model)
            .env("DEVDAG_TEMPERATURE", request.model.temperature.to_string())
            .env("DEVDAG_SYSTEM_PROMPT", &request.system_prompt)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl TextGenerator for CommandGenerator {
    fn stream(
        &self,
        request: GenerationRequest,
        chunks: mpsc::Sender<String>,
    ) -> BoxFuture<'_, Result<(), GenerationError>> {
        Box::pin(async move {
            info!(cmd = %self.cmd, model = %request.model.model, "starting generator");

            let mut child = self
                .command(&request)
                .spawn()
                .map_err(GenerationError::Spawn)?;

            // Feed the prompt concurrently so a chatty generator cannot
            // deadlock against a full stdin pipe.
            if let Some(mut stdin) = child.stdin.take() {
                let prompt = request.user_prompt;
                tokio::spawn(async move {
                    if let Err(err) = stdin.write_all(prompt.as_bytes()).await {
                        debug!(error = %err, "generator did not consume the full prompt");
                    }
                    let _ = stdin.shutdown().await;
                });
            }

            let stderr_task = child.stderr.take().map(|mut stderr| {
                tokio::spawn(async move {
                    let mut buf = String::new();
                    if let Err(err) = stderr.read_to_string(&mut buf).await {
                        debug!(error = %err, "failed to read generator stderr");
                    }
                    buf
                })
            });

            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| GenerationError::Stream("generator stdout not captured".into()))?;
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                let read = reader
                    .read_line(&mut line)
                    .await
                    .map_err(|e| GenerationError::Stream(e.to_string()))?;
                if read == 0 {
                    break;
                }
                if chunks.send(line.clone()).await.is_err() {
                    warn!("chunk receiver dropped; abandoning generation");
                    return Err(GenerationError::Stream("chunk receiver dropped".into()));
                }
            }

            let status = child
                .wait()
                .await
                .map_err(|e| GenerationError::Stream(e.to_string()))?;

            let stderr = match stderr_task {
                Some(handle) => handle.await.unwrap_or_default(),
                None => String::new(),
            };
            for line in stderr.lines() {
                debug!("generator stderr: {}", line);
            }

            if !status.success() {
                let code = status.code().unwrap_or(-1);
                return Err(GenerationError::Upstream {
                    code,
                    stderr: stderr.trim().to_string(),
                });
            }

            debug!("generator finished");
            Ok(())
        })
    }
}
