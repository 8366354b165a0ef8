//! Property tests for plan ordering.
//!
//! - Every resource appears exactly once
//! - No resource appears before any of its dependencies
//! - Any dependency ring is rejected

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use ledgerline_planner::{ArgSpec, DependencyPlanner, PlanError, ResourceSpec};
use proptest::prelude::*;

/// Acyclic graph: resource `i` may only depend on resources with a smaller
/// index, then the declaration order is shuffled.
fn acyclic_specs() -> impl Strategy<Value = Vec<ResourceSpec>> {
    (1usize..16)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(any::<bool>(), n * n),
                Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            )
        })
        .prop_map(|(edges, declaration)| {
            let n = declaration.len();
            declaration
                .iter()
                .map(|&i| {
                    (0..i).fold(ResourceSpec::new(format!("r{i}"), "Artifact"), |spec, j| {
                        match edges.get(i * n + j) {
                            Some(true) if j % 2 == 0 => spec.depends_on(format!("r{j}")),
                            Some(true) => spec.with_arg(ArgSpec::address_of(format!("r{j}"))),
                            _ => spec,
                        }
                    })
                })
                .collect()
        })
}

proptest! {
    #[test]
    fn plan_places_dependencies_first(specs in acyclic_specs()) {
        let plan = DependencyPlanner::new().plan(&specs).expect("acyclic graph must plan");

        prop_assert_eq!(plan.len(), specs.len());
        for spec in &specs {
            let own = plan.position(&spec.name).expect("every resource is planned");
            for dependency in spec.all_dependencies() {
                let before = plan.position(dependency).expect("dependency is planned");
                prop_assert!(before < own, "{} planned before its dependency {}", spec.name, dependency);
            }
        }
    }

    #[test]
    fn plan_rejects_any_ring(len in 2usize..10) {
        let specs: Vec<ResourceSpec> = (0..len)
            .map(|i| ResourceSpec::new(format!("r{i}"), "Artifact").depends_on(format!("r{}", (i + 1) % len)))
            .collect();

        match DependencyPlanner::new().plan(&specs) {
            Err(PlanError::CycleDetected(members)) => prop_assert_eq!(members.len(), len),
            other => prop_assert!(false, "expected cycle, got {:?}", other),
        }
    }
}

#[test]
fn plan_is_deterministic_across_runs() {
    let specs = vec![
        ResourceSpec::new("Proxy", "Proxy"),
        ResourceSpec::new("TokenState", "TokenState"),
        ResourceSpec::new("Token", "Token")
            .with_arg(ArgSpec::address_of("Proxy"))
            .with_arg(ArgSpec::address_of("TokenState")),
        ResourceSpec::new("Feed", "Feed"),
    ];

    let first: Vec<String> = DependencyPlanner::new()
        .plan(&specs)
        .expect("plan")
        .names()
        .map(str::to_string)
        .collect();
    let second: Vec<String> = DependencyPlanner::new()
        .plan(&specs)
        .expect("plan")
        .names()
        .map(str::to_string)
        .collect();

    assert_eq!(first, second);
    assert_eq!(first, vec!["Proxy", "TokenState", "Token", "Feed"]);
}
