//! Dependency graph snapshot
//!
//! A petgraph view of a registry's forward references, used for transitive
//! impact queries and cycle reports. Edges point from referrer to referenced
//! artifact. Referenced artifacts without a descriptor still get a node, so
//! the graph shows every name the materialized descriptors mention.

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::artifact::{ArtifactKind, ArtifactRef};
use crate::registry::ArtifactRegistry;

/// Node weight
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub reference: ArtifactRef,
    /// Descriptor id when the artifact is materialized (event rules carry an ordinal)
    pub id: String,
    pub materialized: bool,
}

/// Node in a closure result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosureNode {
    pub kind: ArtifactKind,
    pub id: String,
    pub depth: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub in_cycle: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unresolved: bool,
}

/// Strongly connected group of artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub members: Vec<String>,
}

pub struct DependencyGraph {
    graph: DiGraph<GraphNode, ()>,
    node_indices: HashMap<ArtifactRef, NodeIndex>,
    cyclic: HashSet<NodeIndex>,
}

impl DependencyGraph {
    /// Snapshot the materialized descriptors of `registry`
    pub fn from_registry(registry: &ArtifactRegistry) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices: HashMap<ArtifactRef, NodeIndex> = HashMap::new();

        let artifacts = registry.all_artifacts();
        for artifact in &artifacts {
            let reference = artifact.artifact_ref();
            let idx = graph.add_node(GraphNode {
                reference: reference.clone(),
                id: artifact.unique_id(),
                materialized: true,
            });
            node_indices.insert(reference, idx);
        }

        for artifact in &artifacts {
            let from = node_indices[&artifact.artifact_ref()];
            for target in artifact.references() {
                let to = *node_indices.entry(target.clone()).or_insert_with(|| {
                    graph.add_node(GraphNode {
                        reference: target.clone(),
                        id: target.id(),
                        materialized: false,
                    })
                });
                graph.add_edge(from, to, ());
            }
        }

        let mut cyclic = HashSet::new();
        for scc in kosaraju_scc(&graph) {
            let self_loop = scc.len() == 1 && graph.contains_edge(scc[0], scc[0]);
            if scc.len() > 1 || self_loop {
                cyclic.extend(scc);
            }
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph built"
        );

        Self {
            graph,
            node_indices,
            cyclic,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, target: &ArtifactRef) -> bool {
        self.node_indices.contains_key(target)
    }

    /// Everything `target` references, transitively
    pub fn dependencies(&self, target: &ArtifactRef, max_depth: Option<usize>) -> Vec<ClosureNode> {
        self.closure(target, Direction::Outgoing, max_depth)
    }

    /// Everything that references `target`, transitively
    pub fn dependents(&self, target: &ArtifactRef, max_depth: Option<usize>) -> Vec<ClosureNode> {
        self.closure(target, Direction::Incoming, max_depth)
    }

    /// Breadth-first, so each node is reported at its shortest distance
    fn closure(&self, target: &ArtifactRef, direction: Direction, max_depth: Option<usize>) -> Vec<ClosureNode> {
        let Some(&start) = self.node_indices.get(target) else {
            return Vec::new();
        };

        let mut result = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((idx, depth)) = queue.pop_front() {
            if idx != start {
                let node = &self.graph[idx];
                result.push(ClosureNode {
                    kind: node.reference.kind(),
                    id: node.id.clone(),
                    depth,
                    in_cycle: self.cyclic.contains(&idx),
                    unresolved: !node.materialized,
                });
            }

            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }

            for edge in self.graph.edges_directed(idx, direction) {
                let next = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                if visited.insert(next) {
                    queue.push_back((next, depth + 1));
                }
            }
        }

        result.sort_by(|a, b| (a.depth, a.kind, &a.id).cmp(&(b.depth, b.kind, &b.id)));
        result
    }

    /// Reference cycles: groups of two or more mutually reachable artifacts,
    /// plus artifacts that reference themselves
    pub fn cycles(&self) -> Vec<Cycle> {
        let mut cycles: Vec<Cycle> = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut members: Vec<String> = scc
                    .iter()
                    .map(|&idx| {
                        let node = &self.graph[idx];
                        format!("{}:{}", node.reference.kind(), node.id)
                    })
                    .collect();
                members.sort();
                Cycle { members }
            })
            .collect();
        cycles.sort_by(|a, b| a.members.cmp(&b.members));
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EntityMetadata, InMemoryMetadata, RelationType, ServiceEcaRule, ServiceMetadata};

    fn registry() -> ArtifactRegistry {
        let providers = InMemoryMetadata::new()
            .with_entity(EntityMetadata::new("Party").with_relation(RelationType::Many, "PartyRole"))
            .with_entity(EntityMetadata::new("PartyRole"))
            .with_service(ServiceMetadata::new("createParty").using_entity("Party"))
            .with_service(ServiceMetadata::new("A"))
            .with_service(ServiceMetadata::new("B"))
            .with_service_rule(ServiceEcaRule::new("A", "commit").with_action("B"))
            .with_service_rule(ServiceEcaRule::new("B", "commit").with_action("A"))
            .into_providers();
        ArtifactRegistry::build("test", providers).unwrap()
    }

    #[test]
    fn test_dependencies_report_shortest_depth() {
        let graph = DependencyGraph::from_registry(&registry());
        let deps = graph.dependencies(&ArtifactRef::service("createParty"), None);
        let found: Vec<(&str, usize)> = deps.iter().map(|n| (n.id.as_str(), n.depth)).collect();
        assert_eq!(found, vec![("Party", 1), ("PartyRole", 2)]);

        let shallow = graph.dependencies(&ArtifactRef::service("createParty"), Some(1));
        assert_eq!(shallow.len(), 1);
    }

    #[test]
    fn test_dependents_walk_backwards() {
        let graph = DependencyGraph::from_registry(&registry());
        let impact = graph.dependents(&ArtifactRef::entity("PartyRole"), None);
        let ids: Vec<&str> = impact.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["Party", "createParty"]);
        assert!(graph.dependents(&ArtifactRef::entity("Unknown"), None).is_empty());
    }

    #[test]
    fn test_cycles_through_event_rules() {
        let graph = DependencyGraph::from_registry(&registry());
        let cycles = graph.cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(
            cycles[0].members,
            vec![
                "service-eca:A#commit#0",
                "service-eca:B#commit#0",
                "service:A",
                "service:B",
            ]
        );

        let deps = graph.dependencies(&ArtifactRef::service("A"), None);
        assert!(deps.iter().all(|n| n.in_cycle));
    }
}
