use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use stepforge::config::Config;
use stepforge::core::engine::Orchestrator;
use stepforge::core::planner::{
    AgentPlan, ExecutionStatus, Planner, PlanningContext, StaticPlanner,
};
use stepforge::core::tools::{ToolMetadata, ToolRegistry, build_registry};
use stepforge::runtime::observability::create_observer;
use stepforge::security::GrantedPermissions;

fn granted(config: &Config) -> GrantedPermissions {
    GrantedPermissions::new(config.permissions.granted.iter().cloned())
}

fn task_for(planner: &StaticPlanner, task: Option<String>, path: &Path) -> String {
    task.or_else(|| planner.template().task_description().map(ToString::to_string))
        .unwrap_or_else(|| format!("run {}", path.display()))
}

/// Run a plan template to completion. Ctrl-C cancels the plan.
async fn run_plan_file(
    config: &Config,
    path: &Path,
    task: Option<String>,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let planner = Arc::new(StaticPlanner::from_path(path)?);
    let registry = Arc::new(build_registry(config));

    let mut context = PlanningContext::new(task_for(&planner, task, path))
        .with_available_tools(registry.metadata())
        .with_granted_permissions(config.permissions.granted.clone());
    if let Some(secs) = deadline_secs {
        let secs = i64::try_from(secs).context("deadline is too large")?;
        context = context.with_deadline(Utc::now() + chrono::Duration::seconds(secs));
    }

    let plan = planner.generate_plan(&context).await?;
    let plan_id = plan.id.clone();

    let orchestrator = Arc::new(
        Orchestrator::new(
            registry,
            planner,
            Arc::new(granted(config)),
            config.engine.clone(),
        )
        .with_observer(create_observer(&config.observability, &config.audit_path())),
    );

    let canceller = Arc::clone(&orchestrator);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel(&plan_id);
        }
    });

    let result = orchestrator.run_plan(plan, &context).await;
    interrupt.abort();
    let result = result?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.final_status != ExecutionStatus::Completed {
        bail!(
            "plan {} ended {}: {}",
            result.plan_id,
            result.final_status,
            result.error.as_deref().unwrap_or("no error recorded")
        );
    }
    Ok(())
}

/// Structural validation plus tool resolution, without executing anything.
fn check_plan_file(config: &Config, path: &Path) -> Result<String> {
    let planner = StaticPlanner::from_path(path)?;
    let plan = AgentPlan::new(
        task_for(&planner, None, path),
        planner.template().steps().to_vec(),
    )
    .with_context(|| format!("invalid plan {}", path.display()))?;
    let graph = plan.validate()?;

    let registry = build_registry(config);
    let permissions = granted(config);
    let resolution = plan
        .steps
        .iter()
        .map(|step| match registry.match_step(step, &permissions) {
            Ok(matches) => json!({
                "step": step.id,
                "tools": matches.iter().map(|m| m.tool.name()).collect::<Vec<_>>(),
            }),
            Err(error) => json!({
                "step": step.id,
                "error": error.to_string(),
            }),
        })
        .collect::<Vec<_>>();

    let report = json!({
        "taskDescription": plan.task_description,
        "order": graph.topological_order(),
        "capabilities": registry.derive_capabilities(&plan.steps),
        "resolution": resolution,
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

fn render_tool_line(lines: &mut Vec<String>, metadata: &ToolMetadata) {
    let timeout = metadata
        .timeout_ms
        .map_or_else(|| "default".to_string(), |ms| format!("{ms}ms"));
    let permissions = if metadata.required_permissions.is_empty() {
        "-".to_string()
    } else {
        metadata.required_permissions.join(",")
    };
    lines.push(format!(
        "    {:<16} {:<7} {:>9}  {}",
        metadata.name, metadata.execution_context, timeout, permissions
    ));
    lines.push(format!("        {}", metadata.description));
}

/// Tool listing grouped by domain; tools without one land under `other`.
pub fn render_tools(registry: &ToolRegistry) -> String {
    let mut lines = vec![format!("◆ {} tools", registry.len())];
    for domain in registry.domains() {
        lines.push(format!("  [{domain}]"));
        for tool in registry.tools_for_domain(&domain) {
            render_tool_line(&mut lines, tool.metadata());
        }
    }

    let undomained = registry
        .metadata()
        .into_iter()
        .filter(|metadata| metadata.domain.is_none())
        .collect::<Vec<_>>();
    if !undomained.is_empty() {
        lines.push("  [other]".to_string());
        for metadata in &undomained {
            render_tool_line(&mut lines, metadata);
        }
    }
    lines.join("\n")
}

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Run {
            plan,
            task,
            deadline_secs,
        } => run_plan_file(&config, &plan, task, deadline_secs).await,
        Commands::Check { plan } => {
            println!("{}", check_plan_file(&config, &plan)?);
            Ok(())
        }
        Commands::Tools => {
            println!("{}", render_tools(&build_registry(&config)));
            Ok(())
        }
    }
}
