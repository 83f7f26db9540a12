use super::traits::{ExecutionContextKind, Tool, ToolMetadata};
use crate::core::planner::{PlanStep, ResourceEstimate, TaskCapabilities};
use crate::error::ToolResolutionError;
use crate::security::PermissionContext;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// An eligible tool for a step together with its capability overlap.
#[derive(Clone)]
pub struct ToolMatch {
    pub tool: Arc<dyn Tool>,
    pub score: usize,
}

impl fmt::Debug for ToolMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolMatch")
            .field("tool", &self.tool.name())
            .field("score", &self.score)
            .finish()
    }
}

/// Central registry of tool instances with capability and domain indexes.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    by_capability: BTreeMap<String, BTreeSet<String>>,
    by_domain: BTreeMap<String, BTreeSet<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.unregister(&name) {
            tracing::debug!(tool = %name, "replacing registered tool");
        }

        let metadata = tool.metadata();
        for capability in &metadata.capabilities {
            self.by_capability
                .entry(capability.clone())
                .or_default()
                .insert(name.clone());
        }
        if let Some(domain) = &metadata.domain {
            self.by_domain
                .entry(domain.clone())
                .or_default()
                .insert(name.clone());
        }
        self.tools.insert(name, tool);
    }

    /// Remove a tool by name. Returns whether it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        if self.tools.remove(name).is_none() {
            return false;
        }
        for index in [&mut self.by_capability, &mut self.by_domain] {
            index.retain(|_, names| {
                names.remove(name);
                !names.is_empty()
            });
        }
        true
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Return sorted list of registered tool names.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Metadata for every registered tool, sorted by name.
    pub fn metadata(&self) -> Vec<ToolMetadata> {
        self.list_names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.metadata().clone())
            .collect()
    }

    pub fn tools_for_capability(&self, capability: &str) -> Vec<Arc<dyn Tool>> {
        self.lookup_index(&self.by_capability, capability)
    }

    pub fn tools_for_domain(&self, domain: &str) -> Vec<Arc<dyn Tool>> {
        self.lookup_index(&self.by_domain, domain)
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.by_capability.keys().cloned().collect()
    }

    pub fn domains(&self) -> Vec<String> {
        self.by_domain.keys().cloned().collect()
    }

    /// Eligible tools for `step`, best first.
    ///
    /// A bound `toolName` restricts the candidates to that tool. Candidates must
    /// accept the action, provide every required tag and hold every permission
    /// they declare.
    pub fn match_step(
        &self,
        step: &PlanStep,
        permissions: &dyn PermissionContext,
    ) -> Result<Vec<ToolMatch>, ToolResolutionError> {
        let capable = self.capable_tools(step)?;

        let mut first_denied = None;
        let mut eligible = Vec::with_capacity(capable.len());
        for candidate in capable {
            let missing = permissions.missing(candidate.tool.required_permissions());
            if missing.is_empty() {
                eligible.push(candidate);
            } else if first_denied.is_none() {
                first_denied = Some((candidate.tool.name().to_string(), missing));
            }
        }

        match (eligible.is_empty(), first_denied) {
            (true, Some((tool, missing))) => Err(ToolResolutionError::PermissionsMissing {
                step_id: step.id.clone(),
                tool,
                missing,
            }),
            (true, None) => Err(ToolResolutionError::NoEligibleTool {
                step_id: step.id.clone(),
                required: step.required_tools.clone(),
            }),
            (false, _) => Ok(eligible),
        }
    }

    /// Aggregate tool, permission and resource needs of `steps`, using the best
    /// capable tool per step regardless of granted permissions.
    pub fn derive_capabilities(&self, steps: &[PlanStep]) -> TaskCapabilities {
        let mut required_tools = BTreeSet::new();
        let mut required_permissions = BTreeSet::new();
        let mut contexts = BTreeSet::new();
        let mut estimate = ResourceEstimate {
            step_count: steps.len(),
            ..ResourceEstimate::default()
        };

        for step in steps {
            required_tools.extend(step.required_tools.iter().cloned());
            estimate.total_estimated_seconds = estimate
                .total_estimated_seconds
                .saturating_add(step.estimated_duration_seconds);

            let Some(best) = self
                .capable_tools(step)
                .ok()
                .and_then(|matches| matches.into_iter().next())
            else {
                continue;
            };
            let metadata = best.tool.metadata();
            required_permissions.extend(metadata.required_permissions.iter().cloned());
            contexts.insert(metadata.execution_context);
            if metadata.execution_context.is_remote_like() {
                estimate.remote_steps += 1;
            }
        }

        let suggested_execution_context = if contexts.iter().all(|c| !c.is_remote_like()) {
            ExecutionContextKind::Local
        } else if contexts.len() == 1 {
            contexts
                .first()
                .copied()
                .unwrap_or(ExecutionContextKind::Remote)
        } else {
            ExecutionContextKind::Hybrid
        };

        TaskCapabilities {
            required_tools: required_tools.into_iter().collect(),
            required_permissions: required_permissions.into_iter().collect(),
            suggested_execution_context,
            estimated_resources: estimate,
        }
    }

    fn capable_tools(&self, step: &PlanStep) -> Result<Vec<ToolMatch>, ToolResolutionError> {
        let candidates: Vec<&Arc<dyn Tool>> = match &step.tool_name {
            Some(bound) => {
                let tool = self
                    .tools
                    .get(bound)
                    .ok_or_else(|| ToolResolutionError::UnknownTool {
                        step_id: step.id.clone(),
                        tool: bound.clone(),
                    })?;
                vec![tool]
            }
            None => self.tools.values().collect(),
        };

        let mut matches = candidates
            .into_iter()
            .filter(|tool| tool.can_handle(&step.action))
            .filter(|tool| {
                let metadata = tool.metadata();
                step.required_tools.iter().all(|tag| metadata.provides(tag))
            })
            .map(|tool| ToolMatch {
                tool: Arc::clone(tool),
                score: overlap(tool.metadata(), step),
            })
            .collect::<Vec<_>>();

        matches.sort_by(|left, right| rank_key(left).cmp(&rank_key(right)));
        Ok(matches)
    }

    fn lookup_index(
        &self,
        index: &BTreeMap<String, BTreeSet<String>>,
        key: &str,
    ) -> Vec<Arc<dyn Tool>> {
        index
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|name| self.tools.get(name).cloned())
            .collect()
    }
}

fn overlap(metadata: &ToolMetadata, step: &PlanStep) -> usize {
    let matched = step
        .required_tools
        .iter()
        .filter(|tag| metadata.provides(tag))
        .count();
    let action_bonus = usize::from(metadata.capabilities.iter().any(|c| c == &step.action));
    matched + action_bonus
}

fn rank_key(candidate: &ToolMatch) -> (Reverse<usize>, ExecutionContextKind, bool, u64, &str) {
    let metadata = candidate.tool.metadata();
    (
        Reverse(candidate.score),
        metadata.execution_context,
        metadata.timeout_ms.is_none(),
        metadata.timeout_ms.unwrap_or(u64::MAX),
        metadata.name.as_str(),
    )
}
