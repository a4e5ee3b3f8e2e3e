use std::collections::{HashMap, VecDeque};

use asat_core::{Revision, normalize_hash};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::AnalysisError;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// The canonical linear history from the earliest connected origin to a tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitPath {
    pub origin: String,
    pub tip: String,
    pub revisions: Vec<Revision>,
}

impl CommitPath {
    pub fn hashes(&self) -> Vec<String> {
        self.revisions
            .iter()
            .map(|revision| revision.hash.clone())
            .collect()
    }

    pub fn chunks(&self, window_days: u32) -> Vec<Vec<Revision>> {
        chunk_by_window(&self.revisions, window_days)
    }
}

/// Commit graph with edges from parent to child.
pub struct CommitPathExtractor {
    graph: DiGraph<Revision, ()>,
    nodes: HashMap<String, NodeIndex>,
}

impl CommitPathExtractor {
    /// Parents that are not among `revisions` are logged and left out.
    pub fn new(revisions: impl IntoIterator<Item = Revision>) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for revision in revisions {
            if nodes.contains_key(&revision.hash) {
                continue;
            }
            let hash = revision.hash.clone();
            nodes.insert(hash, graph.add_node(revision));
        }

        let mut edges = Vec::new();
        for child in graph.node_indices() {
            for parent in &graph[child].parents {
                match nodes.get(parent) {
                    Some(&parent) => edges.push((parent, child)),
                    None => tracing::warn!(
                        revision = %graph[child].hash,
                        parent = %parent,
                        "parent revision missing from history"
                    ),
                }
            }
        }
        for (parent, child) in edges {
            graph.update_edge(parent, child, ());
        }

        tracing::debug!(
            revisions = graph.node_count(),
            edges = graph.edge_count(),
            "built commit graph"
        );
        Self { graph, nodes }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn revision(&self, hash: &str) -> Option<&Revision> {
        self.nodes
            .get(&normalize_hash(hash))
            .map(|&index| &self.graph[index])
    }

    /// Revisions that record no parent at all, oldest first; equal timestamps
    /// are ordered by hash. A revision whose parents are merely missing from
    /// the graph is not an origin.
    pub fn origins(&self) -> Vec<&Revision> {
        let mut origins = self
            .graph
            .node_indices()
            .map(|index| &self.graph[index])
            .filter(|revision| revision.is_origin())
            .collect::<Vec<_>>();
        origins.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.hash.cmp(&b.hash)));
        origins
    }

    /// Shortest path from the oldest origin connected to `tip`. Among equally
    /// short paths the lexicographically smallest hash sequence wins.
    pub fn extract(&self, tip: &str) -> Result<CommitPath, AnalysisError> {
        let tip_hash = normalize_hash(tip);
        let &tip_index = self
            .nodes
            .get(&tip_hash)
            .ok_or_else(|| AnalysisError::UnknownRevision(tip_hash.clone()))?;

        let distances = self.distances_to(tip_index);
        let origin = self
            .origins()
            .into_iter()
            .find_map(|origin| {
                let index = self.nodes.get(&origin.hash).copied()?;
                distances.contains_key(&index).then_some(index)
            })
            .ok_or_else(|| AnalysisError::NoPathFound {
                tip: tip_hash.clone(),
            })?;

        let mut path = vec![origin];
        let mut current = origin;
        while current != tip_index {
            let remaining = distances[&current];
            let next = self
                .graph
                .neighbors_directed(current, Direction::Outgoing)
                .filter(|child| distances.get(child) == Some(&(remaining - 1)))
                .min_by(|a, b| self.graph[*a].hash.cmp(&self.graph[*b].hash))
                .ok_or_else(|| AnalysisError::NoPathFound {
                    tip: tip_hash.clone(),
                })?;
            path.push(next);
            current = next;
        }

        let revisions = path
            .into_iter()
            .map(|index| self.graph[index].clone())
            .collect::<Vec<_>>();
        tracing::info!(
            origin = %self.graph[origin].hash,
            tip = %tip_hash,
            length = revisions.len(),
            "extracted commit path"
        );
        Ok(CommitPath {
            origin: self.graph[origin].hash.clone(),
            tip: tip_hash,
            revisions,
        })
    }

    // Edge distance from every ancestor of `tip` to `tip`.
    fn distances_to(&self, tip: NodeIndex) -> HashMap<NodeIndex, usize> {
        let mut distances = HashMap::from([(tip, 0usize)]);
        let mut queue = VecDeque::from([tip]);
        while let Some(node) = queue.pop_front() {
            let distance = distances[&node];
            for parent in self.graph.neighbors_directed(node, Direction::Incoming) {
                if !distances.contains_key(&parent) {
                    distances.insert(parent, distance + 1);
                    queue.push_back(parent);
                }
            }
        }
        distances
    }
}

/// Splits `path` into consecutive windows. A window starts at its first
/// revision and ends before the first revision later than that start plus
/// `window_days`.
pub fn chunk_by_window(path: &[Revision], window_days: u32) -> Vec<Vec<Revision>> {
    let window = i64::from(window_days) * SECONDS_PER_DAY;
    let mut chunks: Vec<Vec<Revision>> = Vec::new();
    let mut start = None;

    for revision in path {
        match start {
            Some(start_time) if revision.timestamp <= start_time + window => {
                if let Some(chunk) = chunks.last_mut() {
                    chunk.push(revision.clone());
                }
            }
            _ => {
                start = Some(revision.timestamp);
                chunks.push(vec![revision.clone()]);
            }
        }
    }
    chunks
}
