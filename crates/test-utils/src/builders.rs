#![allow(dead_code)]

use std::path::PathBuf;

use devdag::config::{
    ConfigFile, ExecutorSection, GeneratorSection, RawConfigFile, SchedulerSection,
};
use devdag::types::{Task, TaskId};

/// Agent type accepted by the default scheduler config.
pub const DEV_AGENT: &str = "dev_agent";

/// Builder for `Task` to simplify test setup.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    /// A supported `dev_agent` task titled "Task <id>".
    pub fn new(id: &str) -> Self {
        Self {
            task: Task::new(id, format!("Task {id}"), DEV_AGENT),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.task.description = description.to_string();
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.dependencies.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn agent_type(mut self, agent_type: &str) -> Self {
        self.task.agent_type = agent_type.to_string();
        self
    }

    pub fn estimated_hours(mut self, hours: f64) -> Self {
        self.task.estimated_hours = Some(hours);
        self
    }

    pub fn complexity(mut self, complexity: &str) -> Self {
        self.task.complexity = Some(complexity.to_string());
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Shorthand for a task with the given dependencies.
pub fn task(id: &str, deps: &[&str]) -> Task {
    deps.iter()
        .fold(TaskBuilder::new(id), |b, dep| b.after(dep))
        .build()
}

/// Ids as owned strings.
pub fn ids(ids: &[&str]) -> Vec<TaskId> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                scheduler: SchedulerSection::default(),
                executor: ExecutorSection::default(),
                generator: GeneratorSection::new("cat"),
            },
        }
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.scheduler.max_concurrency = n;
        self
    }

    pub fn shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.shutdown_timeout_secs = secs;
        self
    }

    pub fn supported_agent_types(mut self, types: &[&str]) -> Self {
        self.config.scheduler.supported_agent_types = types.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.executor.output_dir = dir.into();
        self
    }

    pub fn generator_cmd(mut self, cmd: &str) -> Self {
        self.config.generator.cmd = cmd.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
