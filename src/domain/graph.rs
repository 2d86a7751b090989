//! Dependency graph over service names.
//!
//! Edges point from a dependent to its dependency. The graph computes a
//! layered topological order: every service in layer `k` depends only on
//! services in layers `< k`, so all members of one layer may be started
//! concurrently once the previous layers are running.
//!
//! Nodes keep their registration order, and every layer lists its members in
//! that order so startup logs and tests are reproducible.

use std::collections::HashMap;

use crate::domain::id::ServiceName;
use crate::error::OrchestrationError;

/// Directed graph of service dependencies.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Node names in registration order.
    nodes: Vec<ServiceName>,
    /// Node name to position in `nodes`.
    index: HashMap<ServiceName, usize>,
    /// `dependencies[i]` holds the positions node `i` depends on.
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::DuplicateService`] if the name is taken.
    pub fn add_node(&mut self, name: ServiceName) -> Result<(), OrchestrationError> {
        if self.index.contains_key(&name) {
            return Err(OrchestrationError::DuplicateService { name });
        }
        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(name);
        self.dependencies.push(Vec::new());
        Ok(())
    }

    /// Record that `dependent` requires `dependency` to be running first.
    ///
    /// Repeated edges are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::UnknownService`] if `dependent` is not a
    /// registered node and [`OrchestrationError::UnknownDependency`] if
    /// `dependency` is not.
    pub fn add_edge(
        &mut self,
        dependent: &ServiceName,
        dependency: &ServiceName,
    ) -> Result<(), OrchestrationError> {
        let Some(&from) = self.index.get(dependent) else {
            return Err(OrchestrationError::UnknownService {
                name: dependent.clone(),
            });
        };
        let Some(&to) = self.index.get(dependency) else {
            return Err(OrchestrationError::UnknownDependency {
                service: dependent.clone(),
                dependency: dependency.clone(),
            });
        };

        let deps = &mut self.dependencies[from];
        if !deps.contains(&to) {
            deps.push(to);
        }
        Ok(())
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of `name`, in edge insertion order.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<ServiceName> {
        self.index
            .get(name)
            .map(|&i| {
                self.dependencies[i]
                    .iter()
                    .map(|&d| self.nodes[d].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Services that directly depend on `name`, in registration order.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<ServiceName> {
        let Some(&target) = self.index.get(name) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.dependencies[*i].contains(&target))
            .map(|(_, n)| n.clone())
            .collect()
    }

    /// Compute the layered topological order.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::CyclicDependency`] carrying one offending
    /// cycle (first node repeated at the end) when the graph is not acyclic.
    pub fn topological_layers(&self) -> Result<Vec<Vec<ServiceName>>, OrchestrationError> {
        let mut placed = vec![false; self.nodes.len()];
        let mut remaining = self.nodes.len();
        let mut layers = Vec::new();

        while remaining > 0 {
            let layer: Vec<usize> = (0..self.nodes.len())
                .filter(|&i| !placed[i])
                .filter(|&i| self.dependencies[i].iter().all(|&d| placed[d]))
                .collect();

            if layer.is_empty() {
                return Err(OrchestrationError::CyclicDependency {
                    cycle: self.find_cycle(&placed),
                });
            }

            for &i in &layer {
                placed[i] = true;
            }
            remaining -= layer.len();
            layers.push(layer.into_iter().map(|i| self.nodes[i].clone()).collect());
        }

        Ok(layers)
    }

    /// Walk unplaced dependencies until a node repeats.
    ///
    /// Every unplaced node has at least one unplaced dependency once layering
    /// stalls, so the walk always closes a cycle.
    fn find_cycle(&self, placed: &[bool]) -> Vec<ServiceName> {
        let Some(start) = (0..self.nodes.len()).find(|&i| !placed[i]) else {
            return Vec::new();
        };

        let mut path: Vec<usize> = Vec::new();
        let mut position: HashMap<usize, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&at) = position.get(&current) {
                let mut cycle: Vec<ServiceName> = path[at..]
                    .iter()
                    .map(|&i| self.nodes[i].clone())
                    .collect();
                cycle.push(self.nodes[current].clone());
                return cycle;
            }
            position.insert(current, path.len());
            path.push(current);

            match self.dependencies[current].iter().find(|&&d| !placed[d]) {
                Some(&next) => current = next,
                None => return path.iter().map(|&i| self.nodes[i].clone()).collect(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(ServiceName::from(*n)).unwrap();
        }
        for (from, to) in edges {
            g.add_edge(&ServiceName::from(*from), &ServiceName::from(*to))
                .unwrap();
        }
        g
    }

    fn names(layer: &[ServiceName]) -> Vec<&str> {
        layer.iter().map(ServiceName::as_str).collect()
    }

    /// Every dependency of a node in layer k must sit in a layer < k.
    fn assert_layering_respects_edges(g: &DependencyGraph, layers: &[Vec<ServiceName>]) {
        let layer_of: HashMap<&str, usize> = layers
            .iter()
            .enumerate()
            .flat_map(|(k, layer)| layer.iter().map(move |n| (n.as_str(), k)))
            .collect();
        assert_eq!(layer_of.len(), g.len());
        for (name, &k) in &layer_of {
            for dep in g.dependencies_of(name) {
                assert!(
                    layer_of[dep.as_str()] < k,
                    "{name} (layer {k}) depends on {dep} (layer {})",
                    layer_of[dep.as_str()]
                );
            }
        }
    }

    #[test]
    fn chain_yields_one_service_per_layer() {
        let g = graph(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);
        let layers = g.topological_layers().unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(names(&layers[0]), ["a"]);
        assert_eq!(names(&layers[1]), ["b"]);
        assert_eq!(names(&layers[2]), ["c"]);
    }

    #[test]
    fn independent_services_share_a_layer_in_registration_order() {
        let g = graph(&["zeta", "alpha", "mid"], &[]);
        let layers = g.topological_layers().unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(names(&layers[0]), ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn trading_stack_layers_respect_every_edge() {
        let g = graph(
            &[
                "state_manager",
                "sierra_client",
                "market_data",
                "pattern_analyzer",
                "ai_brain",
                "risk_manager",
                "trading_engine",
                "web_api",
                "dashboard",
            ],
            &[
                ("sierra_client", "state_manager"),
                ("market_data", "sierra_client"),
                ("market_data", "state_manager"),
                ("pattern_analyzer", "market_data"),
                ("ai_brain", "market_data"),
                ("ai_brain", "pattern_analyzer"),
                ("risk_manager", "market_data"),
                ("trading_engine", "ai_brain"),
                ("trading_engine", "risk_manager"),
                ("trading_engine", "sierra_client"),
                ("web_api", "trading_engine"),
                ("dashboard", "web_api"),
            ],
        );
        let layers = g.topological_layers().unwrap();
        assert_layering_respects_edges(&g, &layers);
        assert_eq!(names(&layers[3]), ["pattern_analyzer", "risk_manager"]);
    }

    #[test]
    fn diamond_places_join_after_both_branches() {
        let g = graph(
            &["root", "left", "right", "join"],
            &[
                ("left", "root"),
                ("right", "root"),
                ("join", "left"),
                ("join", "right"),
            ],
        );
        let layers = g.topological_layers().unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(names(&layers[1]), ["left", "right"]);
        assert_eq!(names(&layers[2]), ["join"]);
    }

    #[test]
    fn cycle_is_rejected_with_path() {
        let g = graph(
            &["a", "b", "c", "d"],
            &[("b", "a"), ("c", "b"), ("a", "c"), ("d", "a")],
        );
        let err = g.topological_layers().unwrap_err();
        let OrchestrationError::CyclicDependency { cycle } = err else {
            panic!("expected cycle error, got {err:?}");
        };
        assert_eq!(cycle.first(), cycle.last());
        assert!(cycle.len() >= 4);
        assert!(!cycle.iter().any(|n| n.as_str() == "d"));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = graph(&["solo"], &[("solo", "solo")]);
        assert!(matches!(
            g.topological_layers(),
            Err(OrchestrationError::CyclicDependency { ref cycle }) if cycle.len() == 2
        ));
    }

    #[test]
    fn edge_to_unregistered_node_is_rejected() {
        let mut g = graph(&["a"], &[]);
        let err = g
            .add_edge(&ServiceName::from("a"), &ServiceName::from("ghost"))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::UnknownDependency { .. }));

        let err = g
            .add_edge(&ServiceName::from("ghost"), &ServiceName::from("a"))
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::UnknownService { .. }));
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut g = graph(&["a"], &[]);
        assert!(matches!(
            g.add_node(ServiceName::from("a")),
            Err(OrchestrationError::DuplicateService { .. })
        ));
    }

    #[test]
    fn dependents_are_reported_in_registration_order() {
        let g = graph(&["a", "c", "b"], &[("b", "a"), ("c", "a")]);
        let dependents = g.dependents_of("a");
        assert_eq!(names(&dependents), ["c", "b"]);
        assert!(g.dependents_of("missing").is_empty());
    }

    #[test]
    fn empty_graph_has_no_layers() {
        let g = DependencyGraph::new();
        assert!(g.is_empty());
        assert!(g.topological_layers().unwrap().is_empty());
    }
}
