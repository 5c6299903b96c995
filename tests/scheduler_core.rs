// tests/scheduler_core.rs

use devdag::dag::{ensure_acyclic, find_cycle_through, DependencyTracker, Readiness};
use devdag::engine::{
    Admission, CoreCommand, CoreStep, ExecutionOutcome, ExecutionQueue, SchedulerState,
};
use devdag::errors::DevdagError;
use devdag::types::{PlanContext, TaskPatch, TaskStatus};
use devdag_test_utils::builders::{ids, task, TaskBuilder, DEV_AGENT};

fn started_state(max_concurrency: usize) -> SchedulerState {
    let mut state = SchedulerState::new(max_concurrency, vec![DEV_AGENT.to_string()]);
    state.start_plan(PlanContext::new("p", "Plan", "Core tests"));
    state
}

fn admissions(step: &CoreStep) -> Vec<Admission> {
    step.commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::Dispatch(admissions) => Some(admissions.clone()),
            CoreCommand::Notify { .. } => None,
        })
        .flatten()
        .collect()
}

fn finish(state: &mut SchedulerState, admission: &Admission, status: TaskStatus) -> CoreStep {
    let mut result = admission.task.clone();
    result.status = status;
    state.finish_execution(&result.id.clone(), admission.token, ExecutionOutcome::Finished(result))
}

// ----- scheduler state ---------------------------------------------------

#[test]
fn nothing_is_admitted_before_a_plan_starts() {
    let mut state = SchedulerState::new(2, vec![DEV_AGENT.to_string()]);
    let step = state.receive_task(task("A", &[]));

    assert_eq!(step.event_tags(), vec!["task_received", "task_queued"]);
    assert!(step.admitted().is_empty());
    assert!(!state.is_active());
}

#[test]
fn plan_start_clears_previous_state() {
    let mut state = started_state(2);
    state.receive_task(task("A", &["X"]));

    let step = state.start_plan(PlanContext::new("p2", "Next", ""));

    assert_eq!(step.event_tags(), vec!["plan_acknowledgment"]);
    assert_eq!(state.tasks().count(), 0);
    assert_eq!(state.tracker().waiting_count(), 0);
    assert_eq!(state.plan().map(|p| p.id.as_str()), Some("p2"));
    assert!(state.is_idle());
}

#[test]
fn ready_task_is_queued_then_admitted() {
    let mut state = started_state(2);
    let step = state.receive_task(task("A", &[]));

    assert_eq!(step.event_tags(), vec!["task_received", "task_queued"]);
    assert_eq!(step.admitted(), ids(&["A"]));
    assert_eq!(state.task("A").map(|t| t.status), Some(TaskStatus::InProgress));
    assert!(state.queue().is_in_flight("A"));
}

#[test]
fn blocked_task_waits_and_is_unblocked_on_completion() {
    let mut state = started_state(2);
    let a = admissions(&state.receive_task(task("A", &[])));

    let step = state.receive_task(task("B", &["A"]));
    assert_eq!(step.event_tags(), vec!["task_received", "task_waiting"]);
    assert!(state.tracker().is_waiting("B"));

    let step = finish(&mut state, &a[0], TaskStatus::Completed);
    assert_eq!(step.event_tags(), vec!["task_unblocked", "task_queued"]);
    assert_eq!(step.admitted(), ids(&["B"]));
    assert!(state.tracker().is_completed("A"));
}

#[test]
fn completion_unblocks_dependents_in_id_order() {
    let mut state = started_state(5);
    let a = admissions(&state.receive_task(task("A", &[])));
    state.receive_task(task("C", &["A"]));
    state.receive_task(task("B", &["A"]));

    let step = finish(&mut state, &a[0], TaskStatus::Completed);
    assert_eq!(step.admitted(), ids(&["B", "C"]));
}

#[test]
fn failure_does_not_unblock() {
    let mut state = started_state(2);
    let a = admissions(&state.receive_task(task("A", &[])));
    state.receive_task(task("B", &["A"]));

    let step = finish(&mut state, &a[0], TaskStatus::Failed);

    assert!(step.admitted().is_empty());
    assert_eq!(state.task("A").map(|t| t.status), Some(TaskStatus::Failed));
    assert!(state.tracker().is_waiting("B"));
    assert_eq!(state.statistics().failed_tasks, 1);
}

#[test]
fn crashed_execution_emits_task_failed() {
    let mut state = started_state(2);
    let a = admissions(&state.receive_task(task("A", &[])));

    let step = state.finish_execution("A", a[0].token, ExecutionOutcome::Crashed("boom".into()));

    assert_eq!(step.event_tags(), vec!["task_failed"]);
    assert_eq!(state.task("A").map(|t| t.status), Some(TaskStatus::Failed));
}

#[test]
fn concurrency_limit_holds_tasks_in_queue() {
    let mut state = started_state(1);
    let a = admissions(&state.receive_task(task("A", &[])));
    let step = state.receive_task(task("B", &[]));

    assert!(step.admitted().is_empty());
    assert_eq!(state.queue().position_of("B"), Some(1));

    let step = finish(&mut state, &a[0], TaskStatus::Completed);
    assert_eq!(step.admitted(), ids(&["B"]));
}

#[test]
fn unknown_agent_type_is_skipped() {
    let mut state = started_state(2);
    let step = state.receive_task(TaskBuilder::new("Q").agent_type("qa_agent").build());

    assert_eq!(step.event_tags(), vec!["task_received", "task_status_update"]);
    assert!(step.admitted().is_empty());
    assert_eq!(state.task("Q").map(|t| t.status), Some(TaskStatus::Skipped));
    assert_eq!(state.statistics().skipped_tasks, 1);
}

#[test]
fn self_dependency_is_reported_as_cycle() {
    let mut state = started_state(2);
    let step = state.receive_task(task("S", &["S"]));

    assert_eq!(
        step.event_tags(),
        vec!["task_received", "task_waiting", "task_cycle_detected"]
    );
}

#[test]
fn resubmitting_a_running_task_only_refreshes_metadata() {
    let mut state = started_state(2);
    state.receive_task(task("A", &[]));

    let step = state.receive_task(TaskBuilder::new("A").title("New title").after("Z").build());

    assert_eq!(step.event_tags(), vec!["task_received"]);
    let a = state.task("A").expect("A known");
    assert_eq!(a.title, "New title");
    assert_eq!(a.status, TaskStatus::InProgress);
    assert!(a.dependencies.is_empty(), "dependencies of a running task are kept");
}

#[test]
fn resubmitting_a_waiting_task_re_evaluates_it() {
    let mut state = started_state(2);
    state.receive_task(task("A", &["Z"]));

    let step = state.receive_task(task("A", &[]));

    assert_eq!(step.admitted(), ids(&["A"]));
    assert_eq!(state.tracker().waiting_count(), 0);
}

#[test]
fn execution_context_carries_recent_completions() {
    let mut state = started_state(10);
    for id in ["a", "b", "c", "d"] {
        let admitted = admissions(&state.receive_task(task(id, &[])));
        finish(&mut state, &admitted[0], TaskStatus::Completed);
    }

    let e = admissions(&state.receive_task(task("e", &["d"])));
    let context = &e[0].context;

    assert_eq!(context.position, 5);
    assert_eq!(context.total, 5);
    let recent: Vec<&str> = context
        .recently_completed
        .iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(recent, vec!["b", "c", "d"]);
    assert_eq!(context.dependencies[0].title.as_deref(), Some("Task d"));
}

#[test]
fn superseded_result_is_ignored_and_rerun_is_admitted() {
    let mut state = started_state(2);
    let first = admissions(&state.receive_task(task("A", &[])));

    let step = state.reset_task("A").expect("A known");
    assert_eq!(step.event_tags(), vec!["task_reset", "task_queued"]);
    assert!(step.admitted().is_empty(), "old run still executing");
    assert!(!state.is_idle());

    let step = finish(&mut state, &first[0], TaskStatus::Completed);
    let second = admissions(&step);
    assert_eq!(second.len(), 1);
    assert!(second[0].token > first[0].token);
    assert!(!state.tracker().is_completed("A"));
    assert_eq!(state.task("A").map(|t| t.status), Some(TaskStatus::InProgress));

    finish(&mut state, &second[0], TaskStatus::Completed);
    assert!(state.tracker().is_completed("A"));
    assert!(state.is_idle());
}

#[test]
fn force_complete_unblocks_and_frees_the_slot() {
    let mut state = started_state(1);
    state.receive_task(task("A", &[]));
    state.receive_task(task("B", &["A"]));

    let step = state.force_complete("A").expect("A known");

    assert_eq!(
        step.event_tags(),
        vec!["task_force_completed", "task_unblocked", "task_queued"]
    );
    assert_eq!(step.admitted(), ids(&["B"]));
    assert!(state.force_complete("missing").is_none());
}

#[test]
fn emergency_stop_clears_queue_and_deactivates() {
    let mut state = started_state(1);
    state.receive_task(task("A", &[]));
    state.receive_task(task("B", &[]));

    let step = state.emergency_stop();

    assert_eq!(step.event_tags(), vec!["emergency_stop"]);
    assert!(state.queue().is_empty());
    assert!(!state.is_active());
    assert_eq!(state.queue().in_flight_count(), 1);
}

#[test]
fn update_of_running_task_dependencies_does_not_requeue() {
    let mut state = started_state(2);
    state.receive_task(task("A", &[]));

    let step = state
        .update_task("A", vec![TaskPatch::Dependencies(ids(&["Z"]))])
        .expect("A known");

    assert_eq!(step.event_tags(), vec!["task_updated"]);
    assert!(!state.tracker().is_waiting("A"));
    assert_eq!(state.task("A").map(|t| t.status), Some(TaskStatus::InProgress));
}

#[test]
fn dependency_patch_replaces_outstanding_set_of_queued_task() {
    let mut state = started_state(1);
    state.receive_task(task("A", &[]));
    state.receive_task(task("B", &[]));
    assert_eq!(state.queue().position_of("B"), Some(1));

    let step = state
        .update_task("B", vec![TaskPatch::Dependencies(ids(&["Z", "A"]))])
        .expect("B known");
    assert_eq!(step.event_tags(), vec!["task_updated", "task_waiting"]);
    assert_eq!(state.queue().position_of("B"), None);
    let outstanding: Vec<&str> = state
        .tracker()
        .outstanding("B")
        .map(|deps| deps.iter().map(String::as_str).collect())
        .unwrap_or_default();
    assert_eq!(outstanding, vec!["A", "Z"]);

    let step = state
        .update_task("B", vec![TaskPatch::Dependencies(Vec::new())])
        .expect("B known");
    assert_eq!(step.event_tags(), vec!["task_updated", "task_queued"]);
    assert!(!state.tracker().is_waiting("B"));
    assert_eq!(state.queue().position_of("B"), Some(1));
}

#[test]
fn update_priority_reorders_queue() {
    let mut state = started_state(1);
    state.receive_task(task("A", &[]));
    state.receive_task(task("B", &[]));
    state.receive_task(task("C", &[]));

    state
        .update_task("C", vec![TaskPatch::Priority(3)])
        .expect("C known");

    let queued: Vec<&str> = state.queue().queued_ids().collect();
    assert_eq!(queued, vec!["C", "B"]);
    assert!(state.change_priority("missing", 1).is_none());
}

#[test]
fn statistics_and_detailed_status_agree() {
    let mut state = started_state(1);
    state.receive_task(task("A", &[]));
    state.receive_task(task("B", &[]));
    state.receive_task(task("C", &["A", "B"]));
    state.complete_plan("p", 3);

    let stats = state.statistics();
    assert_eq!(stats.total_tasks, 3);
    assert_eq!(stats.in_progress_tasks, 1);
    assert_eq!(stats.queued_tasks, 1);
    assert_eq!(stats.waiting_tasks, 1);

    let detailed = state.detailed_status("dev_agent");
    assert_eq!(detailed.in_progress, ids(&["A"]));
    assert_eq!(detailed.task_queue[0].id, "B");
    assert_eq!(
        detailed.waiting_for_dependencies.get("C"),
        Some(&ids(&["A", "B"]))
    );
    assert!(detailed.execution_status.is_plan_complete);

    let deps = state.dependency_status("C").expect("C known");
    assert_eq!(deps.get("A"), Some(&false));
    assert!(state.dependency_status("missing").is_none());
}

// ----- queue -------------------------------------------------------------

#[test]
fn queue_rejects_duplicates_and_clamps_limit() {
    let mut queue = ExecutionQueue::new(0);
    assert_eq!(queue.max_concurrency(), 1);

    assert_eq!(queue.enqueue("a", 0), Some(1));
    assert_eq!(queue.enqueue("a", 0), None);

    assert!(queue.admit_ready().is_empty(), "inactive queue admits nothing");
    queue.set_active(true);
    assert_eq!(queue.admit_ready(), ids(&["a"]));
    assert_eq!(queue.enqueue("a", 0), None, "in flight");
}

#[test]
fn queue_priority_insertion_keeps_fifo_among_equals() {
    let mut queue = ExecutionQueue::new(1);
    for (id, priority) in [("a", 5), ("b", 1), ("c", 1), ("d", 0)] {
        queue.enqueue(id, priority);
    }

    assert!(queue.reorder_by_priority("d", 1));
    let order: Vec<&str> = queue.queued_ids().collect();
    assert_eq!(order, vec!["a", "b", "c", "d"]);

    assert!(queue.reorder_by_priority("c", 9));
    let order: Vec<&str> = queue.queued_ids().collect();
    assert_eq!(order, vec!["c", "a", "b", "d"]);

    assert!(!queue.reorder_by_priority("zzz", 1));
}

#[test]
fn queue_admit_where_passes_over_held_ids() {
    let mut queue = ExecutionQueue::new(2);
    queue.set_active(true);
    queue.enqueue("held", 0);
    queue.enqueue("free", 0);

    let admitted = queue.admit_ready_where(|id| id != "held");

    assert_eq!(admitted, ids(&["free"]));
    assert!(queue.is_queued("held"));
    assert_eq!(queue.position_of("held"), Some(1));
}

#[test]
fn queue_clear_and_reset() {
    let mut queue = ExecutionQueue::new(1);
    queue.set_active(true);
    queue.enqueue("a", 0);
    queue.enqueue("b", 0);
    queue.admit_ready();

    assert_eq!(queue.clear(), ids(&["b"]));
    assert_eq!(queue.in_flight_count(), 1);
    assert!(queue.release("a"));
    assert!(!queue.release("a"));

    queue.enqueue("c", 0);
    queue.reset();
    assert!(queue.is_empty());
    assert_eq!(queue.in_flight_count(), 0);
}

// ----- tracker and graph -------------------------------------------------

#[test]
fn tracker_dedups_and_ignores_completed_dependencies() {
    let mut tracker = DependencyTracker::new();
    assert!(tracker.complete("a").is_empty());

    let readiness = tracker.register("x", &ids(&["a", "b", "b", "c"]));
    assert_eq!(readiness, Readiness::Waiting(ids(&["b", "c"])));

    assert!(tracker.complete("b").is_empty());
    assert_eq!(tracker.complete("c"), ids(&["x"]));
    assert!(!tracker.is_waiting("x"));
    assert!(tracker.complete("c").is_empty(), "second completion is a no-op");
}

#[test]
fn tracker_uncomplete_and_recent_order() {
    let mut tracker = DependencyTracker::new();
    for id in ["a", "b", "c", "d"] {
        tracker.complete(id);
    }
    assert_eq!(tracker.recently_completed(3), ids(&["b", "c", "d"]).as_slice());

    assert!(tracker.uncomplete("c"));
    assert!(!tracker.uncomplete("c"));
    assert_eq!(tracker.completed_ids(), ids(&["a", "b", "d"]).as_slice());
    assert!(!tracker.register("x", &ids(&["c"])).is_ready());

    assert!(tracker.replace_dependencies("x", &ids(&["a"])).is_ready());
    assert!(!tracker.forget("x"));
}

#[test]
fn cycle_detection_reports_members() {
    let deps_a = ids(&["c"]);
    let deps_b = ids(&["a"]);
    let deps_c = ids(&["b"]);
    let deps_d = ids(&["a"]);
    let tasks = [
        ("a", deps_a.as_slice()),
        ("b", deps_b.as_slice()),
        ("c", deps_c.as_slice()),
        ("d", deps_d.as_slice()),
    ];

    assert_eq!(find_cycle_through("b", tasks), Some(ids(&["a", "b", "c"])));
    assert_eq!(find_cycle_through("d", tasks), None);

    match ensure_acyclic(tasks) {
        Err(DevdagError::CyclicDependency(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("expected cycle error, got {other:?}"),
    }

    let chain = [("a", &[][..]), ("b", deps_b.as_slice())];
    assert!(ensure_acyclic(chain).is_ok());
}
