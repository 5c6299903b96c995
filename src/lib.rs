// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod notify;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::ensure_acyclic;
use crate::engine::Coordinator;
use crate::exec::{ArtifactStore, CommandGenerator, GenerationExecutor};
use crate::fs::{FileSystem, RealFileSystem};
use crate::notify::{ChannelSink, Event, NotificationSink};
use crate::types::{PlanContext, PlanFile};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config and plan loading
/// - artifact store / generator / executor
/// - the coordinator and an observer printing events as JSON lines
/// - Ctrl-C handling and graceful shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config {:?}", args.config))?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let plan = load_plan(fs.as_ref(), &args.plan)
        .with_context(|| format!("loading plan {:?}", args.plan))?;

    if args.dry_run {
        print_dry_run(&cfg, &plan);
        return Ok(());
    }

    let artifacts = ArtifactStore::new(Arc::clone(&fs), cfg.executor.clone());
    if args.clean {
        artifacts.cleanup_all_outputs()?;
    }

    let channel = Arc::new(ChannelSink::default());
    let (observer, events) = channel.subscribe();
    let printer = tokio::spawn(print_events(events));
    let sink: Arc<dyn NotificationSink> = channel.clone();

    let executor = GenerationExecutor::new(
        CommandGenerator::from_config(&cfg.generator),
        artifacts,
        Arc::clone(&sink),
        cfg.scheduler.agent_id.as_str(),
        &cfg.generator,
    );
    let coordinator = Coordinator::new(&cfg.scheduler, executor, sink);

    let PlanFile {
        id,
        title,
        description,
        tasks,
    } = plan;
    let total = tasks.len();
    info!(plan = %id, total, "starting plan");

    coordinator
        .handle_plan_start(PlanContext::new(id.as_str(), title, description))
        .await;
    for task in tasks {
        coordinator.handle_task_from_pm(task).await;
    }
    coordinator.handle_plan_complete(&id, total).await;

    // Run until nothing is left to do, or Ctrl-C.
    tokio::select! {
        _ = coordinator.wait_until_idle() => {
            info!("no runnable tasks left");
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => warn!("Ctrl-C received; shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C; shutting down"),
            }
        }
    }

    coordinator.shutdown().await;
    let stats = coordinator.get_task_statistics().await;

    channel.unsubscribe(observer);
    if let Err(e) = printer.await {
        warn!(error = %e, "event printer stopped abnormally");
    }

    info!(
        total = stats.total_tasks,
        completed = stats.completed_tasks,
        failed = stats.failed_tasks,
        skipped = stats.skipped_tasks,
        blocked = stats.waiting_tasks,
        "plan finished"
    );

    if stats.failed_tasks > 0 {
        bail!("{} of {} tasks failed", stats.failed_tasks, stats.total_tasks);
    }
    Ok(())
}

/// Read and parse a JSON plan file.
///
/// Read failures surface as [`errors::DevdagError::Other`], malformed JSON
/// as [`errors::DevdagError::JsonError`].
pub fn load_plan(fs: &dyn FileSystem, path: &Path) -> errors::Result<PlanFile> {
    let contents = fs.read_to_string(path)?;
    let plan: PlanFile = serde_json::from_str(&contents)?;
    debug!(plan = %plan.id, tasks = plan.tasks.len(), "plan loaded");
    Ok(plan)
}

/// Print every event as one JSON line on stdout. Streaming chunks are
/// included, so the output can be replayed into a UI.
async fn print_events(mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(kind = event.kind.tag(), error = %e, "failed to serialize event"),
        }
    }
}

/// Simple dry-run output: print settings, tasks and dependencies.
fn print_dry_run(cfg: &ConfigFile, plan: &PlanFile) {
    println!("devdag dry-run");
    println!("  plan = {} ({})", plan.id, plan.title);
    println!("  scheduler.agent_id = {}", cfg.scheduler.agent_id);
    println!("  scheduler.max_concurrency = {}", cfg.scheduler.max_concurrency);
    println!(
        "  scheduler.supported_agent_types = {:?}",
        cfg.scheduler.supported_agent_types
    );
    println!("  executor.output_dir = {}", cfg.executor.output_dir.display());
    println!("  generator.cmd = {}", cfg.generator.cmd);
    println!("  generator.model = {}", cfg.generator.model);
    println!();

    println!("tasks ({}):", plan.tasks.len());
    for task in &plan.tasks {
        println!("  - {}: {}", task.id, task.title);
        if cfg.scheduler.supports(&task.agent_type) {
            println!("      agent_type: {}", task.agent_type);
        } else {
            println!("      agent_type: {} (unsupported; will be skipped)", task.agent_type);
        }
        if task.priority != 0 {
            println!("      priority: {}", task.priority);
        }
        if !task.dependencies.is_empty() {
            println!("      dependencies: {:?}", task.dependencies);
        }
        let missing: Vec<&str> = task
            .dependencies
            .iter()
            .filter(|dep| !plan.tasks.iter().any(|t| &t.id == *dep))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            println!("      not in plan (will block): {:?}", missing);
        }
    }

    let graph = plan
        .tasks
        .iter()
        .map(|t| (t.id.as_str(), t.dependencies.as_slice()));
    if let Err(err) = ensure_acyclic(graph) {
        println!();
        println!("warning: {err}; the tasks involved will never run");
    }

    debug!("dry-run complete (no execution)");
}
