// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`backend`] provides the `TaskRunner` trait the coordinator launches
//!   admitted tasks through, plus the `ExecutionContext` handed to it.
//! - [`task_runner`] holds `GenerationExecutor`, the production runner.
//! - [`generator`] abstracts the external text generation service and
//!   implements it with a shell command.
//! - [`prompt`] builds the system and user prompts.
//! - [`artifacts`] lays out and writes per-task output directories.

pub mod artifacts;
pub mod backend;
pub mod generator;
pub mod prompt;
pub mod task_runner;

pub use artifacts::ArtifactStore;
pub use backend::{ExecutionContext, TaskRef, TaskRunner};
pub use generator::{CommandGenerator, GenerationRequest, ModelConfig, TextGenerator};
pub use task_runner::GenerationExecutor;
