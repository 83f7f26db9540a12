use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use stepforge::config::Config;
use stepforge::core::engine::Orchestrator;
use stepforge::core::planner::{ExecutionStatus, PlanStep, PlanningContext, StaticPlanner};
use stepforge::core::tools::{Tool, build_registry};
use stepforge::security::{AllowAll, GrantedPermissions};

use stepforge::runtime::observability::ObserverEvent;

use super::engine_harness::{
    Gauge, Journal, RecordingObserver, ScriptedPlanner, ScriptedTool, engine_config,
    orchestrator, step,
};

#[tokio::test]
async fn linear_three_step_plan_completes_with_builtin_tools() {
    let workspace = TempDir::new().unwrap();
    let config = Config::for_workspace(workspace.path());
    let observer = RecordingObserver::default();
    let planner = StaticPlanner::new(vec![
        PlanStep::new("write", "write a note", "file_write")
            .with_parameter("path", json!("notes.txt"))
            .with_parameter("content", json!("hello")),
        PlanStep::new("read", "read it back", "file_read")
            .with_parameter("path", json!("notes.txt"))
            .with_dependencies(["write"]),
        PlanStep::new("list", "list the workspace", "file_list")
            .with_parameter("path", json!("."))
            .with_dependencies(["read"]),
    ]);
    let engine = Orchestrator::new(
        Arc::new(build_registry(&config)),
        Arc::new(planner),
        Arc::new(GrantedPermissions::new(["file_read", "file_write"])),
        config.engine.clone(),
    )
    .with_observer(Arc::new(observer.clone()));

    let result = engine
        .run_task(PlanningContext::new("write then read a note"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed);
    assert_eq!(result.steps_completed, 3);
    assert_eq!(result.steps_failed, 0);
    assert!(result.error.is_none());
    assert_eq!(result.metadata["replannedCount"], 0);

    let listing = result.result.data().unwrap();
    assert_eq!(listing["entries"][0]["name"], "notes.txt");

    assert_eq!(
        observer.kinds(),
        [
            "plan.started",
            "step.started",
            "step.completed",
            "step.started",
            "step.completed",
            "step.started",
            "step.completed",
            "plan.finished",
        ]
    );
    let plan = observer.final_plan();
    assert_eq!(plan.latest_result("read").unwrap().result.data().unwrap()["content"], "hello");
    assert!(plan.started_at.is_some() && plan.completed_at.is_some());
}

#[tokio::test]
async fn unresolvable_tool_replans_once_then_fails_at_bound() {
    let journal = Arc::new(Journal::default());
    let fetch = ScriptedTool::new("fetch", &journal).shared();
    let planner = StaticPlanner::new(vec![
        step("A", "fetch"),
        step("B", "teleport").with_dependencies(["A"]),
    ]);
    let (engine, observer) = orchestrator(
        vec![fetch.clone() as Arc<dyn Tool>],
        Arc::new(planner),
        engine_config(1),
    );

    let result = engine
        .run_task(PlanningContext::new("fetch and teleport"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert_eq!(result.metadata["replannedCount"], 1);
    assert!(
        result
            .error
            .as_deref()
            .unwrap()
            .contains("replanning exhausted after 1 of 1")
    );
    assert_eq!(result.steps_completed, 1);
    assert_eq!(result.steps_failed, 1);
    assert_eq!(observer.replan_counts(), [1]);
    // completed work survives the replan and is not repeated
    assert_eq!(fetch.calls(), 1);

    let plan = observer.final_plan();
    let failures = plan
        .results
        .iter()
        .filter(|r| r.step_id == "B")
        .collect::<Vec<_>>();
    assert_eq!(failures.len(), 2);
    assert!(failures[0].error.as_deref().unwrap().contains("no eligible tool for step B"));
}

#[tokio::test(start_paused = true)]
async fn slow_tool_times_out_at_declared_ceiling() {
    let journal = Arc::new(Journal::default());
    let slow = ScriptedTool::new("slow", &journal)
        .with_timeout_ms(2_000)
        .with_delay(Duration::from_secs(5))
        .shared();
    let (engine, observer) = orchestrator(
        vec![slow as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(vec![step("S1", "slow")])),
        engine_config(0),
    );

    let result = engine
        .run_task(PlanningContext::new("wait on a slow service"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert!(
        result
            .error
            .as_deref()
            .unwrap()
            .contains("replanning exhausted after 0 of 0")
    );
    assert!((result.total_duration_seconds - 2.0).abs() < 0.1);

    let plan = observer.final_plan();
    let attempt = plan.latest_result("S1").unwrap();
    assert_eq!(attempt.status, ExecutionStatus::Failed);
    assert_eq!(attempt.error.as_deref(), Some("timeout"));
    assert_eq!(attempt.duration_milliseconds, 2_000);
    assert_eq!(journal.entries(), ["start:S1"]);
}

#[tokio::test(start_paused = true)]
async fn independent_steps_overlap() {
    let journal = Arc::new(Journal::default());
    let gauge = Arc::new(Gauge::default());
    let left = ScriptedTool::new("left", &journal)
        .with_delay(Duration::from_secs(1))
        .with_gauge(&gauge)
        .shared();
    let right = ScriptedTool::new("right", &journal)
        .with_delay(Duration::from_secs(1))
        .with_gauge(&gauge)
        .shared();
    let (engine, _observer) = orchestrator(
        vec![left as Arc<dyn Tool>, right as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(vec![step("A", "left"), step("B", "right")])),
        engine_config(0),
    );

    let result = engine
        .run_task(PlanningContext::new("two independent lookups"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed);
    assert_eq!(gauge.peak(), 2);
    let start_a = journal.position("start:A").unwrap();
    let start_b = journal.position("start:B").unwrap();
    let end_a = journal.position("end:A").unwrap();
    let end_b = journal.position("end:B").unwrap();
    assert!(start_a < end_b && start_b < end_a);
    assert!(result.total_duration_seconds < 1.5);
}

#[tokio::test]
async fn missing_permission_triggers_replanning() {
    let workspace = TempDir::new().unwrap();
    let config = Config::for_workspace(workspace.path());
    let observer = RecordingObserver::default();
    let engine = Orchestrator::new(
        Arc::new(build_registry(&config)),
        Arc::new(StaticPlanner::new(vec![
            PlanStep::new("ls", "list files", "command")
                .with_required_tools(["process_spawn"])
                .with_parameter("command", json!("ls")),
        ])),
        Arc::new(GrantedPermissions::new(["file_read"])),
        engine_config(0),
    )
    .with_observer(Arc::new(observer.clone()));

    let result = engine
        .run_task(PlanningContext::new("list the workspace"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    let plan = observer.final_plan();
    let error = plan.latest_result("ls").unwrap().error.clone().unwrap();
    assert!(error.contains("tool shell lacks granted permissions [process_spawn]"));
    assert!(observer.started_steps().is_empty());
}

#[tokio::test]
async fn command_step_without_tags_reaches_the_shell() {
    let workspace = TempDir::new().unwrap();
    let config = Config::for_workspace(workspace.path());
    let observer = RecordingObserver::default();
    let engine = Orchestrator::new(
        Arc::new(build_registry(&config)),
        Arc::new(StaticPlanner::new(vec![
            PlanStep::new("S1", "say hello", "run").with_parameter("command", json!("echo hi")),
        ])),
        Arc::new(AllowAll),
        engine_config(0),
    )
    .with_observer(Arc::new(observer.clone()));

    let result = engine
        .run_task(PlanningContext::new("greet"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed, "{:?}", result.error);
    assert_eq!(result.result.data().unwrap()["stdout"].as_str().unwrap().trim(), "hi");
    let plan = observer.final_plan();
    assert_eq!(plan.latest_result("S1").unwrap().metadata["tool"], "shell");
}

#[tokio::test]
async fn action_no_tool_handles_is_replanned_not_fatal() {
    let workspace = TempDir::new().unwrap();
    let config = Config::for_workspace(workspace.path());
    let observer = RecordingObserver::default();
    let engine = Orchestrator::new(
        Arc::new(build_registry(&config)),
        Arc::new(StaticPlanner::new(vec![PlanStep::new(
            "S1",
            "summarise notes",
            "summarise_notes",
        )])),
        Arc::new(AllowAll),
        engine_config(1),
    )
    .with_observer(Arc::new(observer.clone()));

    let result = engine
        .run_task(PlanningContext::new("summarise"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("replanning exhausted after 1 of 1"));
    assert_eq!(observer.replan_counts(), [1]);
    assert!(observer.started_steps().is_empty());
    let error = observer.final_plan().latest_result("S1").unwrap().error.clone().unwrap();
    assert!(error.contains("no eligible tool for step S1"));
}

#[tokio::test]
async fn every_unresolved_ready_step_is_reported_in_one_round() {
    let journal = Arc::new(Journal::default());
    let work = ScriptedTool::new("work", &journal).shared();
    let planner = ScriptedPlanner::new(vec![
        step("S1", "ghost"),
        step("S2", "work"),
        step("S3", "phantom"),
    ])
    .then(vec![step("S2", "work")]);
    let (engine, observer) = orchestrator(
        vec![work.clone() as Arc<dyn Tool>],
        Arc::new(planner),
        engine_config(1),
    );

    let result = engine
        .run_task(PlanningContext::new("two missing tools"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed);
    assert_eq!(observer.replan_counts(), [1]);
    // the resolvable sibling waits for the replan instead of racing it
    assert_eq!(observer.started_steps(), ["S2"]);
    assert_eq!(work.calls(), 1);

    let failure = observer
        .events()
        .into_iter()
        .find_map(|event| match event {
            ObserverEvent::PlanReplanned { failure, .. } => Some(failure),
            _ => None,
        })
        .unwrap();
    assert_eq!(failure.failed_step_ids, ["S1", "S3"]);
    assert_eq!(failure.results.len(), 2);
    assert!(failure.reasons[0].contains("no eligible tool for step S1"));
    assert!(failure.reasons[1].contains("no eligible tool for step S3"));
}
