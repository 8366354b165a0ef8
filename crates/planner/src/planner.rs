//! # Dependency Planner
//!
//! Orders resources so that each one comes after everything it depends on,
//! using petgraph for the graph and Kahn's algorithm for the order. Among
//! resources that are ready at the same time, the one declared first wins, so
//! the same manifest always yields the same plan.
//!
//! Planning is pure: it never touches the backend, and any error it returns
//! aborts the run before a single transaction is sent.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use itertools::Itertools;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, info};

use crate::error::{PlanError, PlanResult};
use crate::spec::ResourceSpec;

/// A dependency-respecting order over the declared resources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentPlan {
    order: Vec<ResourceSpec>,
}

impl DeploymentPlan {
    /// Resources in processing order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.order.iter()
    }

    /// Resource names in processing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|spec| spec.name.as_str())
    }

    /// Position of `name` in the plan.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|spec| spec.name == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.order.iter().find(|spec| spec.name == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Builds [`DeploymentPlan`]s.
///
/// `legacy` holds names of resources that are already deployed but not
/// declared in this run; depending on them is allowed and adds no ordering
/// constraint.
#[derive(Debug, Clone, Default)]
pub struct DependencyPlanner {
    legacy: BTreeSet<String>,
}

impl DependencyPlanner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_legacy<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy.extend(names.into_iter().map(Into::into));
        self
    }

    /// Compute the processing order for `specs`.
    ///
    /// # Errors
    ///
    /// - [`PlanError::DuplicateResource`] if a name is declared twice
    /// - [`PlanError::SelfDependency`] if a resource lists itself
    /// - [`PlanError::UnknownDependency`] if a dependency is neither declared
    ///   nor a legacy resource
    /// - [`PlanError::CycleDetected`] with the members of every cycle
    pub fn plan(&self, specs: &[ResourceSpec]) -> PlanResult<DeploymentPlan> {
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(specs.len(), specs.len());
        let mut node_map: HashMap<&str, NodeIndex> = HashMap::with_capacity(specs.len());

        for (position, spec) in specs.iter().enumerate() {
            if node_map.contains_key(spec.name.as_str()) {
                return Err(PlanError::DuplicateResource(spec.name.clone()));
            }
            let node = graph.add_node(position);
            node_map.insert(spec.name.as_str(), node);
        }

        for spec in specs {
            let Some(&dependent) = node_map.get(spec.name.as_str()) else {
                continue;
            };
            for dependency in spec.all_dependencies() {
                if dependency == spec.name {
                    return Err(PlanError::SelfDependency(spec.name.clone()));
                }
                match node_map.get(dependency) {
                    Some(&prerequisite) => {
                        graph.add_edge(prerequisite, dependent, ());
                    }
                    None if self.legacy.contains(dependency) => {
                        debug!(
                            resource = %spec.name,
                            dependency,
                            "dependency satisfied by legacy resource"
                        );
                    }
                    None => {
                        return Err(PlanError::unknown_dependency(&spec.name, dependency));
                    }
                }
            }
        }

        let ordered = kahn_order(&graph);
        if ordered.len() < specs.len() {
            return Err(PlanError::cycle_detected(cycle_members(&graph, specs)));
        }

        let order = ordered
            .into_iter()
            .filter_map(|position| specs.get(position).cloned())
            .collect_vec();

        info!(
            resources = order.len(),
            legacy = self.legacy.len(),
            "deployment plan computed"
        );

        Ok(DeploymentPlan { order })
    }
}

/// Kahn's algorithm with a min-heap on declaration position.
///
/// Returns declaration positions; fewer than the node count means a cycle.
fn kahn_order(graph: &DiGraph<usize, ()>) -> Vec<usize> {
    let mut in_degree: HashMap<NodeIndex, usize> = graph
        .node_indices()
        .map(|node| {
            (
                node,
                graph.neighbors_directed(node, Direction::Incoming).count(),
            )
        })
        .collect();

    let mut ready: BinaryHeap<Reverse<(usize, NodeIndex)>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .filter_map(|(node, _)| graph.node_weight(*node).map(|pos| Reverse((*pos, *node))))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse((position, node))) = ready.pop() {
        order.push(position);
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&next) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    if let Some(pos) = graph.node_weight(next) {
                        ready.push(Reverse((*pos, next)));
                    }
                }
            }
        }
    }
    order
}

/// Names of every resource on a cycle, in declaration order.
fn cycle_members(graph: &DiGraph<usize, ()>, specs: &[ResourceSpec]) -> Vec<String> {
    tarjan_scc(graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .flatten()
        .filter_map(|node| graph.node_weight(node).copied())
        .sorted_unstable()
        .filter_map(|position| specs.get(position).map(|spec| spec.name.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::spec::ArgSpec;

    fn names(plan: &DeploymentPlan) -> Vec<&str> {
        plan.names().collect()
    }

    #[test]
    fn test_empty_manifest_plans_nothing() {
        let plan = DependencyPlanner::new().plan(&[]).expect("plan");
        assert!(plan.is_empty());
    }

    #[test]
    fn test_independent_resources_keep_declaration_order() {
        let specs = vec![
            ResourceSpec::new("C", "C"),
            ResourceSpec::new("A", "A"),
            ResourceSpec::new("B", "B"),
        ];
        let plan = DependencyPlanner::new().plan(&specs).expect("plan");
        assert_eq!(names(&plan), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_dependency_moves_before_dependent() {
        let specs = vec![
            ResourceSpec::new("Issuer", "Issuer").depends_on("Resolver"),
            ResourceSpec::new("Resolver", "AddressResolver"),
            ResourceSpec::new("Exchanger", "Exchanger").with_arg(ArgSpec::address_of("Issuer")),
        ];
        let plan = DependencyPlanner::new().plan(&specs).expect("plan");
        assert_eq!(names(&plan), vec!["Resolver", "Issuer", "Exchanger"]);
        assert_eq!(plan.position("Exchanger"), Some(2));
    }

    #[test]
    fn test_two_node_cycle_is_rejected() {
        let specs = vec![
            ResourceSpec::new("A", "A").depends_on("B"),
            ResourceSpec::new("B", "B").depends_on("A"),
            ResourceSpec::new("C", "C"),
        ];
        match DependencyPlanner::new().plan(&specs) {
            Err(PlanError::CycleDetected(members)) => {
                assert_eq!(members, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_rejected() {
        let specs = vec![ResourceSpec::new("A", "A").with_arg(ArgSpec::address_of("A"))];
        assert!(matches!(
            DependencyPlanner::new().plan(&specs),
            Err(PlanError::SelfDependency(name)) if name == "A"
        ));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let specs = vec![ResourceSpec::new("A", "A").depends_on("Ghost")];
        assert!(matches!(
            DependencyPlanner::new().plan(&specs),
            Err(PlanError::UnknownDependency { dependency, .. }) if dependency == "Ghost"
        ));
    }

    #[test]
    fn test_legacy_dependency_is_accepted() {
        let specs = vec![ResourceSpec::new("A", "A").depends_on("LegacyProxy")];
        let plan = DependencyPlanner::new()
            .with_legacy(["LegacyProxy"])
            .plan(&specs)
            .expect("plan");
        assert_eq!(names(&plan), vec!["A"]);
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let specs = vec![ResourceSpec::new("A", "A"), ResourceSpec::new("A", "Other")];
        assert!(matches!(
            DependencyPlanner::new().plan(&specs),
            Err(PlanError::DuplicateResource(name)) if name == "A"
        ));
    }
}
