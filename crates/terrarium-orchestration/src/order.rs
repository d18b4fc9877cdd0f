//! Dependency-ordered rollout

use std::collections::{BTreeMap, BTreeSet};
use terrarium_config::ServiceDescriptor;
use tracing::warn;

/// Rollout order produced by [`resolve_order`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    /// Every service name exactly once, dependencies first where possible
    pub order: Vec<String>,
    /// Services that were appended because of a cycle or an unknown dependency
    pub unresolved: Vec<String>,
}

impl ResolvedOrder {
    /// Whether every service was placed after all of its dependencies
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Compute the rollout order of `services`.
///
/// Each pass takes every remaining service whose dependencies are already
/// placed, in alphabetical order. When a pass makes no progress the rest are
/// appended alphabetically and a warning is logged; this never fails.
pub fn resolve_order(services: &[ServiceDescriptor]) -> ResolvedOrder {
    let mut graph: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for service in services {
        graph
            .entry(service.name.as_str())
            .or_default()
            .extend(service.dependencies.iter().map(String::as_str));
    }

    let mut deployed: BTreeSet<&str> = BTreeSet::new();
    let mut order = Vec::with_capacity(graph.len());

    while deployed.len() < graph.len() {
        // BTreeMap iteration is already alphabetical.
        let ready: Vec<&str> = graph
            .iter()
            .filter(|(name, deps)| {
                !deployed.contains(*name) && deps.iter().all(|dep| deployed.contains(dep))
            })
            .map(|(name, _)| *name)
            .collect();

        if ready.is_empty() {
            let remaining: Vec<String> = graph
                .keys()
                .filter(|name| !deployed.contains(*name))
                .map(|name| name.to_string())
                .collect();
            warn!(
                "Possible circular or missing dependency, deploying remaining services in alphabetical order: {}",
                remaining.join(", ")
            );
            order.extend(remaining.iter().cloned());
            return ResolvedOrder {
                order,
                unresolved: remaining,
            };
        }

        for name in ready {
            deployed.insert(name);
            order.push(name.to_string());
        }
    }

    ResolvedOrder {
        order,
        unresolved: Vec::new(),
    }
}

/// Rollout order of `services`; see [`resolve_order`]
pub fn resolve(services: &[ServiceDescriptor]) -> Vec<String> {
    resolve_order(services).order
}

/// Whether any service lists `name` as a dependency
pub fn has_dependents(name: &str, services: &[ServiceDescriptor]) -> bool {
    services
        .iter()
        .any(|s| s.dependencies.iter().any(|dep| dep == name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::descriptor;

    fn names(order: &[String]) -> Vec<&str> {
        order.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_linear_chain() {
        let services = vec![
            descriptor("c", &["b"]),
            descriptor("a", &[]),
            descriptor("b", &["a"]),
        ];
        assert_eq!(names(&resolve(&services)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_independent_services_are_alphabetical() {
        let services = vec![
            descriptor("logthon", &[]),
            descriptor("file-storage", &[]),
            descriptor("custom-client", &["file-storage", "logthon"]),
            descriptor("service-sink", &[]),
        ];
        assert_eq!(
            names(&resolve(&services)),
            vec!["file-storage", "logthon", "service-sink", "custom-client"]
        );
    }

    #[test]
    fn test_two_service_cycle_falls_back() {
        let services = vec![descriptor("x", &["y"]), descriptor("y", &["x"])];
        let resolved = resolve_order(&services);

        assert_eq!(names(&resolved.order), vec!["x", "y"]);
        assert_eq!(resolved.unresolved, vec!["x", "y"]);
        assert!(!resolved.is_complete());
    }

    #[test]
    fn test_cycle_after_resolvable_prefix() {
        let services = vec![
            descriptor("base", &[]),
            descriptor("p", &["base", "q"]),
            descriptor("q", &["p"]),
            descriptor("z", &[]),
        ];
        let resolved = resolve_order(&services);
        assert_eq!(names(&resolved.order), vec!["base", "z", "p", "q"]);
        assert_eq!(resolved.unresolved, vec!["p", "q"]);
    }

    #[test]
    fn test_unknown_dependency_falls_back() {
        let services = vec![descriptor("a", &["ghost"]), descriptor("b", &[])];
        let resolved = resolve_order(&services);
        assert_eq!(names(&resolved.order), vec!["b", "a"]);
        assert_eq!(resolved.unresolved, vec!["a"]);
    }

    #[test]
    fn test_self_dependency_terminates() {
        let services = vec![descriptor("loop", &["loop"])];
        assert_eq!(names(&resolve(&services)), vec!["loop"]);
    }

    /// Every ordering of `items`
    fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut all = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let first = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, first.clone());
                all.push(tail);
            }
        }
        all
    }

    #[test]
    fn test_order_does_not_depend_on_input_order() {
        let diamond = vec![
            descriptor("a", &[]),
            descriptor("b", &["a"]),
            descriptor("c", &["a"]),
            descriptor("d", &["b", "c"]),
            descriptor("e", &[]),
        ];

        let orderings = permutations(&diamond);
        assert_eq!(orderings.len(), 120);
        for services in orderings {
            let resolved = resolve_order(&services);
            assert!(resolved.is_complete());
            assert_eq!(names(&resolved.order), vec!["a", "e", "b", "c", "d"]);

            let position = |name: &str| resolved.order.iter().position(|n| n == name).unwrap();
            for service in &services {
                for dep in &service.dependencies {
                    assert!(position(dep) < position(&service.name));
                }
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(resolve(&[]).is_empty());
    }

    #[test]
    fn test_has_dependents() {
        let services = vec![descriptor("a", &[]), descriptor("b", &["a"])];
        assert!(has_dependents("a", &services));
        assert!(!has_dependents("b", &services));
    }
}
