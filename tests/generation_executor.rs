// tests/generation_executor.rs

mod common;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::common::builders::{task, ConfigFileBuilder, TaskBuilder};
use crate::common::{init_tracing, with_timeout, GeneratorScript, RecordingSink, ScriptedGenerator};

use devdag::config::{ExecutorSection, GeneratorSection};
use devdag::engine::Coordinator;
use devdag::errors::ErrorKind;
use devdag::exec::artifacts::{path_safe_id, slug, FALLBACK_FILE};
use devdag::exec::prompt::{self, SYSTEM_PROMPT};
use devdag::exec::{ArtifactStore, ExecutionContext, GenerationExecutor, TaskRef, TaskRunner};
use devdag::fs::{FileSystem, MockFileSystem};
use devdag::notify::{EventKind, FileType};
use devdag::types::{PlanContext, Task, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

struct Fixture {
    fs: MockFileSystem,
    generator: ScriptedGenerator,
    sink: Arc<RecordingSink>,
    executor: GenerationExecutor<ScriptedGenerator>,
}

fn fixture(generator: ScriptedGenerator) -> Fixture {
    init_tracing();
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let executor_cfg = ExecutorSection {
        output_dir: PathBuf::from("out"),
        ..ExecutorSection::default()
    };
    let artifacts = ArtifactStore::new(Arc::new(fs.clone()), executor_cfg);
    let executor = GenerationExecutor::new(
        generator.clone(),
        artifacts,
        sink.clone(),
        "dev_agent",
        &GeneratorSection::new("unused"),
    );

    Fixture {
        fs,
        generator,
        sink,
        executor,
    }
}

fn api_task() -> Task {
    TaskBuilder::new("t1")
        .title("Build API: v2!")
        .description("Expose the v2 endpoints")
        .estimated_hours(3.0)
        .complexity("medium")
        .build()
}

fn final_status(sink: &RecordingSink, task_id: &str) -> Option<EventKind> {
    sink.events()
        .into_iter()
        .rev()
        .map(|e| e.kind)
        .find(|k| matches!(k, EventKind::TaskStatusUpdate { task_id: id, .. } if id == task_id))
}

#[test]
fn slug_normalises_titles() {
    assert_eq!(slug("Build API: v2!", 50), "build_api__v2");
    assert_eq!(slug("  Hello  ", 50), "hello");
    assert_eq!(slug("abcdefgh", 3), "abc");
    assert_eq!(slug("ab_cdef", 3), "ab");
}

#[tokio::test]
async fn successful_generation_persists_artifacts() -> TestResult {
    let f = fixture(ScriptedGenerator::chunks(&["print(", "'hi')\n"]));

    let done = f.executor.execute(api_task(), ExecutionContext::default()).await;
    assert_eq!(done.status, TaskStatus::Completed);

    let dir = Path::new("out/t1_build_api__v2");
    assert_eq!(
        f.fs.contents(dir.join("implementation.py")).as_deref(),
        Some("print('hi')\n")
    );

    let metadata: serde_json::Value =
        serde_json::from_str(&f.fs.contents(dir.join("task_metadata.json")).ok_or("no metadata")?)?;
    assert_eq!(metadata["task_id"], "t1");
    assert_eq!(metadata["title"], "Build API: v2!");
    assert_eq!(metadata["complexity"], "medium");
    assert_eq!(
        metadata["output_files"],
        serde_json::json!(["t1_build_api__v2/implementation.py"])
    );
    assert!(metadata["completed_at"].is_string());

    assert_eq!(
        f.sink.tags_for("t1"),
        vec![
            "task_status_update",
            "llm_request",
            "llm_streaming_chunk",
            "llm_streaming_chunk",
            "llm_response_complete",
            "file_generated",
            "file_generated",
            "task_status_update",
        ]
    );

    match final_status(&f.sink, "t1") {
        Some(EventKind::TaskStatusUpdate {
            status,
            output_directory,
            main_file,
            error,
            ..
        }) => {
            assert_eq!(status, TaskStatus::Completed);
            assert_eq!(output_directory.as_deref(), Some("t1_build_api__v2"));
            assert_eq!(main_file.as_deref(), Some("t1_build_api__v2/implementation.py"));
            assert!(error.is_none());
        }
        other => panic!("unexpected final status {other:?}"),
    }

    let files: Vec<(FileType, String, String)> = f
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::FileGenerated {
                file_type,
                file_name,
                content,
                ..
            } => Some((file_type, file_name, content)),
            _ => None,
        })
        .collect();
    assert_eq!(files.len(), 2);
    assert_eq!(
        files[0],
        (
            FileType::Source,
            "t1_build_api__v2/implementation.py".to_string(),
            "print('hi')\n".to_string()
        )
    );
    assert_eq!(files[1].0, FileType::Json);
    assert_eq!(files[1].1, "t1_build_api__v2/task_metadata.json");
    assert_eq!(
        Some(files[1].2.clone()),
        f.fs.contents(dir.join("task_metadata.json"))
    );

    Ok(())
}

#[tokio::test]
async fn request_carries_prompts_and_model_settings() -> TestResult {
    let f = fixture(ScriptedGenerator::chunks(&["ok"]));
    let context = ExecutionContext {
        plan: Some(PlanContext::new("p", "Shop", "An online shop")),
        position: 2,
        total: 5,
        dependencies: vec![TaskRef {
            id: "t0".to_string(),
            title: Some("Schema".to_string()),
        }],
        recently_completed: vec![TaskRef {
            id: "t0".to_string(),
            title: Some("Schema".to_string()),
        }],
    };

    f.executor.execute(api_task(), context).await;

    let requests = f.generator.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.system_prompt, SYSTEM_PROMPT);
    assert_eq!(request.model.model, "gemini-2.5-pro");
    assert!(request.user_prompt.contains("**Title**: Build API: v2!"));
    assert!(request.user_prompt.contains("**Estimated Hours**: 3"));
    assert!(request.user_prompt.contains("=== PROJECT CONTEXT ==="));
    assert!(request.user_prompt.contains("Project: Shop"));
    assert!(request.user_prompt.contains("Current Task: 2 of 5"));
    assert!(request.user_prompt.contains("- t0: Schema"));

    Ok(())
}

#[tokio::test]
async fn empty_output_fails_without_writing() -> TestResult {
    let f = fixture(ScriptedGenerator::chunks(&["   \n", "\n"]));

    let done = f.executor.execute(api_task(), ExecutionContext::default()).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert!(f.fs.file_paths().is_empty());
    match final_status(&f.sink, "t1") {
        Some(EventKind::TaskStatusUpdate {
            status, error_kind, ..
        }) => {
            assert_eq!(status, TaskStatus::Failed);
            assert_eq!(error_kind, Some(ErrorKind::Content));
        }
        other => panic!("unexpected final status {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn generator_failure_fails_the_task() -> TestResult {
    let f = fixture(ScriptedGenerator::new(GeneratorScript::FailAfter {
        chunks: vec!["partial".to_string()],
        code: 2,
        stderr: "quota exceeded".to_string(),
    }));

    let done = f.executor.execute(api_task(), ExecutionContext::default()).await;

    assert_eq!(done.status, TaskStatus::Failed);
    assert_eq!(f.sink.count("llm_streaming_chunk"), 1);
    assert_eq!(f.sink.count("llm_response_complete"), 0);
    assert_eq!(
        f.sink.of("error")[0].kind,
        EventKind::Error {
            task_id: "t1".to_string(),
            error_kind: ErrorKind::Generation,
        }
    );
    match final_status(&f.sink, "t1") {
        Some(EventKind::TaskStatusUpdate { status, error, .. }) => {
            assert_eq!(status, TaskStatus::Failed);
            assert!(error.unwrap_or_default().contains("quota exceeded"));
        }
        other => panic!("unexpected final status {other:?}"),
    }
    assert!(f.fs.file_paths().is_empty());
    Ok(())
}

#[tokio::test]
async fn primary_write_failure_falls_back_and_still_completes() -> TestResult {
    let f = fixture(ScriptedGenerator::chunks(&["body\n"]));
    f.fs.fail_writes_to("implementation.py");

    let done = f.executor.execute(api_task(), ExecutionContext::default()).await;
    assert_eq!(done.status, TaskStatus::Completed);

    let fallback = Path::new("out/t1_build_api__v2").join(FALLBACK_FILE);
    let body = f.fs.contents(&fallback).ok_or("no fallback file")?;
    assert!(body.starts_with("Error writing file:"));
    assert!(body.ends_with("Original output:\nbody\n"));

    assert_eq!(
        f.sink.of("error")[0].kind,
        EventKind::Error {
            task_id: "t1".to_string(),
            error_kind: ErrorKind::Persistence,
        }
    );
    match final_status(&f.sink, "t1") {
        Some(EventKind::TaskStatusUpdate { main_file, .. }) => {
            assert_eq!(
                main_file.as_deref(),
                Some("t1_build_api__v2/generation_error.txt")
            );
        }
        other => panic!("unexpected final status {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn metadata_write_failure_is_reported_but_not_fatal() -> TestResult {
    let f = fixture(ScriptedGenerator::chunks(&["body\n"]));
    f.fs.fail_writes_to("task_metadata.json");

    let done = f.executor.execute(api_task(), ExecutionContext::default()).await;

    assert_eq!(done.status, TaskStatus::Completed);
    assert!(f.fs.exists(Path::new("out/t1_build_api__v2/implementation.py")));
    assert_eq!(f.sink.count("error"), 1);
    Ok(())
}

#[tokio::test]
async fn rerun_replaces_previous_outputs_of_the_same_task_only() -> TestResult {
    let f = fixture(ScriptedGenerator::chunks(&["new\n"]));
    f.fs.add_file("out/t1_old_title/implementation.py", "old");
    f.fs.add_file("out/t10_other/implementation.py", "other");

    f.executor.execute(api_task(), ExecutionContext::default()).await;

    assert!(!f.fs.exists(Path::new("out/t1_old_title")));
    assert!(f.fs.exists(Path::new("out/t10_other/implementation.py")));
    assert_eq!(
        f.fs.contents("out/t1_build_api__v2/implementation.py").as_deref(),
        Some("new\n")
    );
    Ok(())
}

#[tokio::test]
async fn task_ids_with_path_separators_stay_inside_the_output_dir() -> TestResult {
    let f = fixture(ScriptedGenerator::chunks(&["x\n"]));
    f.fs.add_file("out/.._.._escape_old/implementation.py", "old");
    let sneaky = TaskBuilder::new("../../escape").title("Escape").build();

    let done = f.executor.execute(sneaky, ExecutionContext::default()).await;
    assert_eq!(done.status, TaskStatus::Completed);

    let paths = f.fs.file_paths();
    assert!(!paths.is_empty());
    for path in &paths {
        assert!(path.starts_with("out"), "{path:?} escaped the output dir");
        assert!(
            path.components().all(|c| c != std::path::Component::ParentDir),
            "{path:?} contains '..'"
        );
    }
    assert_eq!(
        f.fs.contents("out/.._.._escape_escape/implementation.py").as_deref(),
        Some("x\n")
    );
    assert!(!f.fs.exists(Path::new("out/.._.._escape_old")));
    Ok(())
}

#[test]
fn path_safe_id_replaces_separators() {
    assert_eq!(path_safe_id("t1"), "t1");
    assert_eq!(path_safe_id("../x"), ".._x");
    assert_eq!(path_safe_id("a/b/c"), "a_b_c");
}

#[test]
fn cleanup_all_outputs_empties_the_directory() -> TestResult {
    let fs = MockFileSystem::new();
    fs.add_file("out/t1_a/implementation.py", "x");
    let store = ArtifactStore::new(
        Arc::new(fs.clone()),
        ExecutorSection {
            output_dir: PathBuf::from("out"),
            ..ExecutorSection::default()
        },
    );

    store.cleanup_all_outputs()?;

    assert!(fs.is_dir(Path::new("out")));
    assert!(fs.read_dir(Path::new("out"))?.is_empty());
    assert_eq!(store.clear_task_output("t1")?, 0);
    Ok(())
}

#[test]
fn enrich_without_plan_leaves_task_untouched() {
    let t = api_task();
    assert_eq!(prompt::enrich(&t, &ExecutionContext::default()), t);
}

#[test]
fn enrich_lists_dependencies_and_completed_tasks() {
    let t = task("t3", &["t1", "t2"]);
    let context = ExecutionContext {
        plan: Some(PlanContext::new("p", "Shop", "An online shop")),
        position: 3,
        total: 4,
        dependencies: vec![
            TaskRef {
                id: "t1".to_string(),
                title: Some("Schema".to_string()),
            },
            TaskRef {
                id: "t2".to_string(),
                title: None,
            },
        ],
        recently_completed: Vec::new(),
    };

    let enriched = prompt::enrich(&t, &context);

    assert!(enriched.description.contains("This task depends on: t1, t2"));
    assert!(enriched.description.contains("- t1: Schema"));
    assert!(!enriched.description.contains("=== COMPLETED TASKS ==="));

    let root_context = ExecutionContext {
        dependencies: Vec::new(),
        ..context.clone()
    };
    let no_deps = prompt::enrich(&task("t0", &[]), &root_context);
    assert!(no_deps.description.contains("This task has no dependencies."));
}

#[tokio::test]
async fn coordinator_drives_generation_end_to_end() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let sink = RecordingSink::new();
    let cfg = ConfigFileBuilder::new().output_dir("out").build();
    let generator = ScriptedGenerator::chunks(&["code\n"]);

    let executor = GenerationExecutor::new(
        generator.clone(),
        ArtifactStore::new(Arc::new(fs.clone()), cfg.executor.clone()),
        sink.clone(),
        cfg.scheduler.agent_id.as_str(),
        &cfg.generator,
    );
    let coordinator = Coordinator::new(&cfg.scheduler, executor, sink.clone());

    coordinator
        .handle_plan_start(PlanContext::new("p", "Shop", "An online shop"))
        .await;
    coordinator.handle_task_from_pm(task("A", &[])).await;
    coordinator.handle_task_from_pm(task("B", &["A"])).await;
    coordinator.handle_plan_complete("p", 2).await;
    with_timeout(coordinator.wait_until_idle()).await;

    for id in ["A", "B"] {
        let t = coordinator.get_task(id).await.ok_or("task missing")?;
        assert_eq!(t.status, TaskStatus::Completed, "{id}");
    }
    assert!(fs.exists(Path::new("out/A_task_a/implementation.py")));
    assert!(fs.exists(Path::new("out/B_task_b/task_metadata.json")));

    let requests = generator.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].user_prompt.contains("Current Task: 2 of 2"));
    assert!(requests[1].user_prompt.contains("- A: Task A"));

    assert_eq!(sink.count("llm_response_complete"), 2);
    Ok(())
}
