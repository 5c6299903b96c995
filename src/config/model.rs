// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [scheduler]
/// agent_id = "dev_agent"
/// max_concurrency = 2
/// shutdown_timeout_secs = 30
/// supported_agent_types = ["dev_agent"]
///
/// [executor]
/// output_dir = "generated_code/dev_outputs"
///
/// [generator]
/// cmd = "llm -m gemini-2.5-pro"
/// temperature = 0.3
/// ```
///
/// Only `generator.cmd` is required; everything else has a default.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub executor: ExecutorSection,

    pub generator: GeneratorSection,
}

/// Validated configuration. Only obtainable through `ConfigFile::try_from`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSection,
    pub executor: ExecutorSection,
    pub generator: GeneratorSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerSection,
        executor: ExecutorSection,
        generator: GeneratorSection,
    ) -> Self {
        Self {
            scheduler,
            executor,
            generator,
        }
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// Identifier stamped on every outgoing event.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// Upper bound on concurrently executing tasks.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// How long `shutdown` waits for in-flight tasks before giving up.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Agent-type tags this scheduler admits. Anything else is skipped.
    #[serde(default = "default_supported_agent_types")]
    pub supported_agent_types: Vec<String>,
}

impl SchedulerSection {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn supports(&self, agent_type: &str) -> bool {
        self.supported_agent_types.iter().any(|t| t == agent_type)
    }
}

fn default_agent_id() -> String {
    "dev_agent".to_string()
}

fn default_max_concurrency() -> usize {
    2
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_supported_agent_types() -> Vec<String> {
    vec!["dev_agent".to_string()]
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            max_concurrency: default_max_concurrency(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            supported_agent_types: default_supported_agent_types(),
        }
    }
}

/// `[executor]` section: where and how artifacts are written.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// File name of the generated content inside each task directory.
    #[serde(default = "default_primary_file")]
    pub primary_file: String,

    /// File name of the metadata document inside each task directory.
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,

    /// Maximum length (in chars) of the title slug in task directory names.
    #[serde(default = "default_slug_max_len")]
    pub slug_max_len: usize,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_code/dev_outputs")
}

fn default_primary_file() -> String {
    "implementation.py".to_string()
}

fn default_metadata_file() -> String {
    "task_metadata.json".to_string()
}

fn default_slug_max_len() -> usize {
    50
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            primary_file: default_primary_file(),
            metadata_file: default_metadata_file(),
            slug_max_len: default_slug_max_len(),
        }
    }
}

/// `[generator]` section: the external text generation command.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorSection {
    /// Shell command that reads the user prompt on stdin and streams the
    /// generated text on stdout.
    pub cmd: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Overrides the built-in system prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

impl GeneratorSection {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            model: default_model(),
            temperature: default_temperature(),
            system_prompt: None,
        }
    }
}
