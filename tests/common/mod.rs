#![allow(dead_code)]

pub use devdag_test_utils::builders;
pub use devdag_test_utils::{
    init_tracing, with_timeout, GeneratorScript, RecordingSink, Script, ScriptedGenerator,
    ScriptedRunner,
};

use std::sync::Arc;
use std::time::Duration;

use devdag::engine::Coordinator;
use devdag::types::{PlanContext, Task, TaskStatus};

use self::builders::ConfigFileBuilder;

/// A coordinator wired to a scripted runner and a recording sink.
pub struct Harness {
    pub coordinator: Coordinator<ScriptedRunner>,
    pub runner: ScriptedRunner,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(max_concurrency: usize) -> Self {
        Self::with_config(ConfigFileBuilder::new().max_concurrency(max_concurrency))
    }

    pub fn with_config(builder: ConfigFileBuilder) -> Self {
        init_tracing();
        let cfg = builder.build();
        let runner = ScriptedRunner::new();
        let sink = RecordingSink::new();
        let coordinator = Coordinator::new(&cfg.scheduler, runner.clone(), sink.clone());

        Self {
            coordinator,
            runner,
            sink,
        }
    }

    pub async fn start_plan(&self) {
        self.coordinator
            .handle_plan_start(PlanContext::new("plan-1", "Test plan", "A plan used in tests"))
            .await;
    }

    /// Start a plan, feed `tasks` in order and mark the plan complete.
    pub async fn run_plan(&self, tasks: Vec<Task>) {
        self.start_plan().await;
        let total = tasks.len();
        for task in tasks {
            self.coordinator.handle_task_from_pm(task).await;
        }
        self.coordinator.handle_plan_complete("plan-1", total).await;
    }

    pub async fn wait_idle(&self) {
        with_timeout(self.coordinator.wait_until_idle()).await;
    }

    pub async fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.coordinator.get_task(task_id).await.map(|t| t.status)
    }

    /// Poll until the coordinator reports `status` for `task_id`.
    pub async fn wait_for_status(&self, task_id: &str, status: TaskStatus) {
        with_timeout(async {
            while self.status_of(task_id).await != Some(status) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
    }
}
