use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};

use stepforge::core::engine::Verifier;
use stepforge::core::planner::{
    AgentPlan, ExecutionStatus, PlanningContext, StaticPlanner,
};
use stepforge::core::tools::{ExecutionContextKind, Tool};

use super::engine_harness::{
    Gauge, Journal, Outcome, ScriptedPlanner, ScriptedTool, engine_config, orchestrator, step,
};

fn before(journal: &Journal, first: &str, second: &str) -> bool {
    journal.position(first).unwrap() < journal.position(second).unwrap()
}

#[tokio::test(start_paused = true)]
async fn no_step_starts_before_its_dependencies_complete() {
    let journal = Arc::new(Journal::default());
    let work = ScriptedTool::new("work", &journal)
        .with_delay(Duration::from_millis(200))
        .shared();
    let planner = StaticPlanner::new(vec![
        step("D", "work").with_dependencies(["B", "C"]),
        step("B", "work").with_dependencies(["A"]),
        step("C", "work").with_dependencies(["A"]),
        step("A", "work"),
    ]);
    let (engine, _observer) = orchestrator(
        vec![work.clone() as Arc<dyn Tool>],
        Arc::new(planner),
        engine_config(0),
    );

    let result = engine
        .run_task(PlanningContext::new("diamond"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed);
    assert_eq!(work.calls(), 4);
    assert!(before(&journal, "end:A", "start:B"));
    assert!(before(&journal, "end:A", "start:C"));
    assert!(before(&journal, "end:B", "start:D"));
    assert!(before(&journal, "end:C", "start:D"));
}

#[tokio::test]
async fn replan_count_is_monotone_and_fails_exactly_at_bound() {
    let journal = Arc::new(Journal::default());
    let flaky = ScriptedTool::new("flaky", &journal)
        .with_outcome(Outcome::Fail("upstream returned garbage".into()))
        .shared();
    let (engine, observer) = orchestrator(
        vec![flaky.clone() as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(vec![step("S1", "flaky")])),
        engine_config(3),
    );

    let result = engine
        .run_task(PlanningContext::new("keep trying"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert_eq!(observer.replan_counts(), [1, 2, 3]);
    assert_eq!(result.metadata["replannedCount"], 3);
    assert!(result.error.unwrap().contains("3 of 3"));
    assert_eq!(flaky.calls(), 4);

    let plan = observer.final_plan();
    assert_eq!(plan.results.len(), 4);
    assert!(
        plan.results
            .iter()
            .all(|r| r.error.as_deref() == Some("upstream returned garbage"))
    );
}

#[tokio::test]
async fn finished_plan_round_trips_through_json() {
    let journal = Arc::new(Journal::default());
    let tools: Vec<Arc<dyn Tool>> = vec![
        ScriptedTool::new("good", &journal).shared(),
        ScriptedTool::new("bad", &journal)
            .with_outcome(Outcome::Error("socket closed".into()))
            .shared(),
    ];
    let (engine, observer) = orchestrator(
        tools,
        Arc::new(StaticPlanner::new(vec![
            step("A", "good").with_parameter("n", json!(1)),
            step("B", "bad").with_dependencies(["A"]).with_sequence_number(2),
        ])),
        engine_config(1),
    );

    engine
        .run_task(PlanningContext::new("round trip"))
        .await
        .unwrap();

    let plan = observer.final_plan();
    let encoded = serde_json::to_string(&plan).unwrap();
    let decoded: AgentPlan = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, plan);

    let value: Value = serde_json::from_str(&encoded).unwrap();
    assert_eq!(value["status"], "failed");
    assert_eq!(value["steps"][1]["sequenceNumber"], 2);
    assert_eq!(value["results"][0]["result"]["kind"], "success");
    assert_eq!(value["results"][1]["result"]["kind"], "error");
}

#[tokio::test]
async fn reverifying_recorded_results_is_idempotent() {
    let journal = Arc::new(Journal::default());
    let (engine, observer) = orchestrator(
        vec![
            ScriptedTool::new("good", &journal).shared() as Arc<dyn Tool>,
            ScriptedTool::new("empty", &journal)
                .with_outcome(Outcome::Succeed(Value::Null))
                .shared() as Arc<dyn Tool>,
        ],
        Arc::new(StaticPlanner::new(vec![step("A", "good"), step("B", "empty")])),
        engine_config(0),
    );
    engine
        .run_task(PlanningContext::new("verify twice"))
        .await
        .unwrap();

    let plan = observer.final_plan();
    let verifier = Verifier::default();
    for result in &plan.results {
        let step = plan.step(&result.step_id).unwrap();
        let first = verifier.verify(step, result).await;
        let second = verifier.verify(step, result).await;
        assert_eq!(first, second);
    }
    assert_eq!(verifier.verdict_count(), plan.results.len());
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_a_running_plan() {
    let journal = Arc::new(Journal::default());
    let sleepy = ScriptedTool::new("sleepy", &journal)
        .with_delay(Duration::from_secs(10))
        .shared();
    let (engine, observer) = orchestrator(
        vec![sleepy as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(Vec::new())),
        engine_config(3),
    );
    let engine = Arc::new(engine);
    let plan = AgentPlan::new(
        "long job",
        vec![step("S1", "sleepy"), step("S2", "sleepy").with_dependencies(["S1"])],
    )
    .unwrap()
    .with_id("plan-cancel");

    let runner = Arc::clone(&engine);
    let handle = tokio::spawn(async move {
        runner
            .run_plan(plan, &PlanningContext::new("long job"))
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.active_plans(), ["plan-cancel"]);
    assert!(engine.cancel("plan-cancel"));

    let result = handle.await.unwrap().unwrap();
    assert_eq!(result.final_status, ExecutionStatus::Cancelled);
    assert!(result.error.unwrap().contains("cancelled"));
    assert!(result.total_duration_seconds < 1.0);

    let plan = observer.final_plan();
    assert_eq!(plan.step("S1").unwrap().status, ExecutionStatus::Cancelled);
    assert_eq!(plan.step("S2").unwrap().status, ExecutionStatus::Cancelled);
    assert_eq!(plan.replanned_count, 0);
    assert!(engine.active_plans().is_empty());
    assert!(!engine.cancel("plan-cancel"));
}

#[tokio::test(start_paused = true)]
async fn deadline_fails_plan_at_next_boundary() {
    let journal = Arc::new(Journal::default());
    let sleepy = ScriptedTool::new("sleepy", &journal)
        .with_delay(Duration::from_secs(10))
        .shared();
    let (engine, _observer) = orchestrator(
        vec![sleepy as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(vec![step("S1", "sleepy")])),
        engine_config(3),
    );

    let context = PlanningContext::new("too slow")
        .with_deadline(Utc::now() + chrono::Duration::seconds(1));
    let result = engine.run_task(context).await.unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert!(result.error.unwrap().contains("missed its deadline"));
    assert!(result.total_duration_seconds < 2.0);
}

#[tokio::test]
async fn expired_deadline_runs_nothing() {
    let journal = Arc::new(Journal::default());
    let tool = ScriptedTool::new("work", &journal).shared();
    let (engine, _observer) = orchestrator(
        vec![tool.clone() as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(vec![step("S1", "work")])),
        engine_config(3),
    );

    let context = PlanningContext::new("already late")
        .with_deadline(Utc::now() - chrono::Duration::seconds(5));
    let result = engine.run_task(context).await.unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert_eq!(tool.calls(), 0);
}

#[tokio::test]
async fn parameter_validation_error_ends_the_run() {
    let journal = Arc::new(Journal::default());
    let strict = ScriptedTool::new("strict", &journal)
        .with_required_parameter("input")
        .shared();
    let (engine, observer) = orchestrator(
        vec![strict.clone() as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(vec![step("S1", "strict")])),
        engine_config(3),
    );

    let result = engine
        .run_task(PlanningContext::new("forgot the input"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("validation error: tool strict requires parameter 'input'")
    );
    assert_eq!(strict.calls(), 0);
    assert!(observer.replan_counts().is_empty());
}

#[tokio::test]
async fn partial_verdict_completes_with_caveat() {
    let journal = Arc::new(Journal::default());
    let quiet = ScriptedTool::new("quiet", &journal)
        .with_outcome(Outcome::Succeed(Value::Null))
        .shared();
    let (engine, _observer) = orchestrator(
        vec![quiet as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(vec![step("S1", "quiet")])),
        engine_config(0),
    );

    let result = engine
        .run_task(PlanningContext::new("say nothing"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed);
    let caveat = result.metadata["finalReasoning"].as_str().unwrap();
    assert!(caveat.starts_with("step S1: quiet succeeded without output"));
}

#[tokio::test]
async fn replan_adopts_new_steps_and_keeps_completed_work() {
    let journal = Arc::new(Journal::default());
    let good = ScriptedTool::new("good", &journal).shared();
    let bad = ScriptedTool::new("bad", &journal)
        .with_outcome(Outcome::Fail("bad tool".into()))
        .shared();
    let planner = ScriptedPlanner::new(vec![
        step("A", "good"),
        step("B", "bad").with_dependencies(["A"]),
    ])
    .then(vec![
        step("A", "good"),
        step("B", "good").with_dependencies(["A"]),
    ]);
    let (engine, observer) = orchestrator(
        vec![good.clone() as Arc<dyn Tool>, bad.clone() as Arc<dyn Tool>],
        Arc::new(planner),
        engine_config(2),
    );

    let result = engine
        .run_task(PlanningContext::new("swap the broken tool"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed);
    assert_eq!(result.metadata["replannedCount"], 1);
    assert_eq!(good.calls(), 2);
    assert_eq!(bad.calls(), 1);
    assert_eq!(
        observer.kinds().iter().filter(|k| **k == "plan.replanned").count(),
        1
    );
}

#[tokio::test]
async fn replan_that_alters_completed_step_is_rejected() {
    let journal = Arc::new(Journal::default());
    let planner = ScriptedPlanner::new(vec![
        step("A", "good"),
        step("B", "bad").with_dependencies(["A"]),
    ])
    .then(vec![
        step("A", "good").with_parameter("retry", json!(true)),
        step("B", "good").with_dependencies(["A"]),
    ]);
    let (engine, _observer) = orchestrator(
        vec![
            ScriptedTool::new("good", &journal).shared() as Arc<dyn Tool>,
            ScriptedTool::new("bad", &journal)
                .with_outcome(Outcome::Fail("bad tool".into()))
                .shared() as Arc<dyn Tool>,
        ],
        Arc::new(planner),
        engine_config(2),
    );

    let result = engine
        .run_task(PlanningContext::new("rewrite history"))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Failed);
    assert!(
        result
            .error
            .unwrap()
            .contains("replanned steps rejected: replanned plan altered completed step A")
    );
}

#[tokio::test(start_paused = true)]
async fn parallelism_respects_configured_caps() {
    let journal = Arc::new(Journal::default());
    let local_gauge = Arc::new(Gauge::default());
    let remote_gauge = Arc::new(Gauge::default());
    let local = ScriptedTool::new("local", &journal)
        .with_delay(Duration::from_millis(500))
        .with_gauge(&local_gauge)
        .shared();
    let remote = ScriptedTool::new("remote", &journal)
        .with_context(ExecutionContextKind::Remote)
        .with_delay(Duration::from_millis(500))
        .with_gauge(&remote_gauge)
        .shared();

    let mut steps = (1..=5)
        .map(|n| step(&format!("L{n}"), "local"))
        .collect::<Vec<_>>();
    steps.extend((1..=3).map(|n| step(&format!("R{n}"), "remote")));

    let mut config = engine_config(0);
    config.max_parallel_steps = 3;
    config.max_remote_in_flight = 1;
    let (engine, _observer) = orchestrator(
        vec![local.clone() as Arc<dyn Tool>, remote.clone() as Arc<dyn Tool>],
        Arc::new(StaticPlanner::new(steps)),
        config,
    );

    let result = engine
        .run_task(PlanningContext::new("fan out").with_max_steps(8))
        .await
        .unwrap();

    assert_eq!(result.final_status, ExecutionStatus::Completed);
    assert_eq!(result.steps_completed, 8);
    assert_eq!(remote_gauge.peak(), 1);
    assert!(local_gauge.peak() <= 3);
    assert_eq!(local.calls() + remote.calls(), 8);
}
