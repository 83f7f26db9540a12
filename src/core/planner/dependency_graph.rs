use crate::core::planner::{ExecutionStatus, PlanStep};
use crate::error::PlanValidationError;
use std::collections::{BTreeMap, BTreeSet, btree_set};

static NO_DEPENDENCIES: BTreeSet<String> = BTreeSet::new();

/// Dependency edges between the steps of one plan.
///
/// Edges point from a prerequisite to the step that waits on it. Construction
/// fails on empty or duplicate ids, unknown dependencies and cycles, so a built
/// graph is always a DAG.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    order: Vec<String>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn from_steps(steps: &[PlanStep]) -> Result<Self, PlanValidationError> {
        let mut known = BTreeSet::new();
        for step in steps {
            if step.id.trim().is_empty() {
                return Err(PlanValidationError::EmptyStepId);
            }
            if !known.insert(step.id.clone()) {
                return Err(PlanValidationError::DuplicateStep(step.id.clone()));
            }
        }

        let mut dependencies = BTreeMap::new();
        let mut dependents: BTreeMap<String, BTreeSet<String>> = known
            .iter()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();

        for step in steps {
            let mut wanted = BTreeSet::new();
            for dependency in &step.dependencies {
                if !known.contains(dependency) {
                    return Err(PlanValidationError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dependency.clone(),
                        known: known.iter().cloned().collect::<Vec<_>>().join(", "),
                    });
                }
                wanted.insert(dependency.clone());
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .insert(step.id.clone());
            }
            dependencies.insert(step.id.clone(), wanted);
        }

        let graph = Self {
            order: steps.iter().map(|step| step.id.clone()).collect(),
            dependencies,
            dependents,
        };
        graph.ensure_acyclic()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn dependencies_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Kahn ordering with lexical tie-breaks.
    pub fn topological_order(&self) -> Vec<String> {
        let mut in_degree = self
            .dependencies
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect::<BTreeMap<_, _>>();

        let mut queue = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect::<BTreeSet<_>>();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(id) = queue.pop_first() {
            sorted.push(id.to_string());
            for dependent in self.dependents_of(id) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.insert(dependent);
                    }
                }
            }
        }

        sorted
    }

    /// Pending steps whose dependencies have all completed, in dispatch order:
    /// sequence number first (unnumbered last), then plan position.
    pub fn ready_steps(&self, steps: &[PlanStep]) -> Vec<String> {
        let status = steps
            .iter()
            .map(|step| (step.id.as_str(), step.status))
            .collect::<BTreeMap<_, _>>();

        let mut ready = steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.status == ExecutionStatus::Pending)
            .filter(|(_, step)| {
                self.dependencies_of(&step.id)
                    .all(|dep| status.get(dep) == Some(&ExecutionStatus::Completed))
            })
            .map(|(position, step)| (step.sequence_number.unwrap_or(u32::MAX), position, &step.id))
            .collect::<Vec<_>>();

        ready.sort_unstable();
        ready.into_iter().map(|(_, _, id)| id.clone()).collect()
    }

    fn ensure_acyclic(&self) -> Result<(), PlanValidationError> {
        match self.find_cycle() {
            Some(path) => Err(PlanValidationError::Cycle(path)),
            None => Ok(()),
        }
    }

    /// Depth-first search with an explicit frame stack, so chain length is
    /// bounded by the heap rather than the thread stack.
    fn find_cycle(&self) -> Option<Vec<String>> {
        let mut states = BTreeMap::new();

        for root in &self.order {
            if states.contains_key(root.as_str()) {
                continue;
            }

            states.insert(root.as_str(), NodeState::Visiting);
            let mut path = vec![root.as_str()];
            let mut frames = vec![self.direct_dependencies(root)];

            while let Some(frame) = frames.last_mut() {
                let Some(next) = frame.next().map(String::as_str) else {
                    frames.pop();
                    if let Some(done) = path.pop() {
                        states.insert(done, NodeState::Visited);
                    }
                    continue;
                };

                match states.get(next) {
                    Some(NodeState::Visiting) => {
                        let start = path.iter().position(|entry| *entry == next).unwrap_or(0);
                        let mut cycle = path[start..]
                            .iter()
                            .map(|entry| (*entry).to_string())
                            .collect::<Vec<_>>();
                        cycle.push(next.to_string());
                        return Some(cycle);
                    }
                    Some(NodeState::Visited) => {}
                    None => {
                        states.insert(next, NodeState::Visiting);
                        path.push(next);
                        frames.push(self.direct_dependencies(next));
                    }
                }
            }
        }

        None
    }

    fn direct_dependencies(&self, id: &str) -> btree_set::Iter<'_, String> {
        self.dependencies.get(id).unwrap_or(&NO_DEPENDENCIES).iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Visiting,
    Visited,
}
