// src/exec/artifacts.rs

//! Per-task output directories and the files written into them.
//!
//! Layout under `executor.output_dir`:
//!
//! ```text
//! <task id>_<slug>/
//!     <primary_file>        generated content
//!     <metadata_file>       JSON record of the task
//!     generation_error.txt  only when the primary file could not be written
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ExecutorSection;
use crate::fs::FileSystem;
use crate::types::{Task, TaskId};

/// Name of the file written when the primary artifact cannot be persisted.
pub const FALLBACK_FILE: &str = "generation_error.txt";

/// Directory-name slug of a task title: every non-alphanumeric character
/// becomes `_`, the result is lowercased, cut to `max_len` characters and
/// trimmed of `_`.
pub fn slug(title: &str, max_len: usize) -> String {
    let replaced: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();

    replaced
        .chars()
        .take(max_len)
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Task id as used in directory names. Path separators become `_` so an id
/// can never point outside the output directory.
pub fn path_safe_id(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| if std::path::is_separator(c) { '_' } else { c })
        .collect()
}

/// JSON record persisted next to the generated content.
#[derive(Debug, Clone, Serialize)]
pub struct TaskMetadata {
    pub task_id: TaskId,
    pub title: String,
    pub description: String,
    pub complexity: Option<String>,
    pub estimated_hours: Option<f64>,
    pub dependencies: Vec<TaskId>,
    pub completed_at: DateTime<Utc>,
    /// Paths relative to the output directory.
    pub output_files: Vec<PathBuf>,
}

/// Writes task artifacts through a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    fs: Arc<dyn FileSystem>,
    config: ExecutorSection,
}

impl ArtifactStore {
    pub fn new(fs: Arc<dyn FileSystem>, config: ExecutorSection) -> Self {
        Self { fs, config }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn task_dir_name(&self, task: &Task) -> String {
        let slug = slug(&task.title, self.config.slug_max_len);
        format!("{}_{slug}", path_safe_id(&task.id))
    }

    pub fn task_dir(&self, task: &Task) -> PathBuf {
        self.config.output_dir.join(self.task_dir_name(task))
    }

    pub fn primary_path(&self, task: &Task) -> PathBuf {
        self.task_dir(task).join(&self.config.primary_file)
    }

    pub fn metadata_path(&self, task: &Task) -> PathBuf {
        self.task_dir(task).join(&self.config.metadata_file)
    }

    /// `path` relative to the output directory, for notifications.
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.config.output_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Remove every output entry belonging to `task_id` (name starts with
    /// `<task_id>_`). Returns how many entries were removed.
    ///
    /// Entries that cannot be removed are logged and skipped.
    pub fn clear_task_output(&self, task_id: &str) -> Result<usize> {
        let dir = &self.config.output_dir;
        if !self.fs.is_dir(dir) {
            return Ok(0);
        }

        let prefix = format!("{}_", path_safe_id(task_id));
        let mut removed = 0;
        for entry in self.fs.read_dir(dir)? {
            let matches = entry
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with(&prefix));
            if !matches {
                continue;
            }

            match self.fs.remove_all(&entry) {
                Ok(()) => {
                    debug!(task = %task_id, path = ?entry, "removed previous output");
                    removed += 1;
                }
                Err(err) => warn!(
                    task = %task_id,
                    path = ?entry,
                    error = %err,
                    "failed to remove previous output"
                ),
            }
        }
        Ok(removed)
    }

    /// Wipe the whole output directory and recreate it empty.
    pub fn cleanup_all_outputs(&self) -> Result<()> {
        let dir = &self.config.output_dir;
        if self.fs.exists(dir) {
            self.fs
                .remove_all(dir)
                .with_context(|| format!("cleaning output directory {:?}", dir))?;
        }
        self.fs.create_dir_all(dir)?;
        info!(dir = ?dir, "output directory cleaned");
        Ok(())
    }

    pub fn create_task_dir(&self, task: &Task) -> Result<PathBuf> {
        let dir = self.task_dir(task);
        self.fs.create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Write the generated content. Returns the absolute path written.
    pub fn write_primary(&self, task: &Task, content: &str) -> Result<PathBuf> {
        let path = self.primary_path(task);
        self.fs.write(&path, content.as_bytes())?;
        Ok(path)
    }

    /// Write an error-annotated copy of the generated content. Returns the
    /// path and the text written.
    pub fn write_fallback(
        &self,
        task: &Task,
        error: &str,
        content: &str,
    ) -> Result<(PathBuf, String)> {
        let path = self.task_dir(task).join(FALLBACK_FILE);
        let body = format!("Error writing file: {error}\n\nOriginal output:\n{content}");
        self.fs.write(&path, body.as_bytes())?;
        Ok((path, body))
    }

    /// Write the metadata record. Returns the path and the JSON written.
    pub fn write_metadata(
        &self,
        task: &Task,
        output_files: &[PathBuf],
    ) -> Result<(PathBuf, String)> {
        let metadata = TaskMetadata {
            task_id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            complexity: task.complexity.clone(),
            estimated_hours: task.estimated_hours,
            dependencies: task.dependencies.clone(),
            completed_at: Utc::now(),
            output_files: output_files.iter().map(|p| self.relative(p)).collect(),
        };

        let json = serde_json::to_string_pretty(&metadata).context("serializing task metadata")?;
        let path = self.metadata_path(task);
        self.fs.write(&path, json.as_bytes())?;
        Ok((path, json))
    }
}
