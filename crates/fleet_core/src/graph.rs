//! Immutable road graph in Compressed Sparse Row layout.
//!
//! Nodes are intersections (with a [`Location`]); directed edges are road segments
//! weighted by length in meters. The graph is built once from external map data via
//! [`RoadGraph::from_parts`] and only read afterwards, so it can be shared freely
//! between the scheduler and the path-cache precompute workers.
//!
//! Search costs are integer millimetres (`u64`), which gives `pathfinding` the `Ord`
//! cost type it needs while keeping sub-meter resolution. Reported distances are
//! always summed from the original `f64` lengths.

use std::fmt;

use crate::spatial::Location;

pub type NodeId = u32;

/// Search cost unit: millimetres.
pub type Cost = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    InvalidNodeLocation { node: NodeId, location: Location },
    UnknownNode { edge: usize, node: NodeId },
    InvalidEdgeLength { edge: usize, length_m: f64 },
    TooManyNodes(usize),
    TooManyEdges(usize),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::InvalidNodeLocation { node, location } => {
                write!(f, "node {node} has invalid location {location}")
            }
            GraphError::UnknownNode { edge, node } => {
                write!(f, "edge {edge} references unknown node {node}")
            }
            GraphError::InvalidEdgeLength { edge, length_m } => {
                write!(f, "edge {edge} has non-positive or non-finite length {length_m}")
            }
            GraphError::TooManyNodes(count) => write!(f, "graph has {count} nodes, limit is u32::MAX"),
            GraphError::TooManyEdges(count) => write!(f, "graph has {count} edges, limit is u32::MAX"),
        }
    }
}

impl std::error::Error for GraphError {}

/// One directed road segment as supplied by the map collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSpec {
    pub from: NodeId,
    pub to: NodeId,
    pub length_m: f64,
}

impl EdgeSpec {
    pub fn new(from: NodeId, to: NodeId, length_m: f64) -> Self {
        Self { from, to, length_m }
    }
}

#[derive(Debug, Clone)]
pub struct RoadGraph {
    locations: Vec<Location>,
    /// offsets[i]..offsets[i + 1] is the slice of `targets` leaving node i.
    offsets: Vec<u32>,
    targets: Vec<NodeId>,
    lengths_m: Vec<f64>,
    costs: Vec<Cost>,
}

impl RoadGraph {
    /// Build a graph from a node list and a directed edge list.
    ///
    /// Edges leaving a node are sorted by target id, so identical input always
    /// produces an identical layout (and identical shortest-path tie-breaks).
    pub fn from_parts(locations: Vec<Location>, edges: Vec<EdgeSpec>) -> Result<Self, GraphError> {
        if locations.len() >= u32::MAX as usize {
            return Err(GraphError::TooManyNodes(locations.len()));
        }
        for (i, location) in locations.iter().enumerate() {
            if !location.is_valid() {
                return Err(GraphError::InvalidNodeLocation {
                    node: i as NodeId,
                    location: *location,
                });
            }
        }

        let node_count = locations.len();
        for (i, edge) in edges.iter().enumerate() {
            for node in [edge.from, edge.to] {
                if node as usize >= node_count {
                    return Err(GraphError::UnknownNode { edge: i, node });
                }
            }
            if !(edge.length_m.is_finite() && edge.length_m > 0.0) {
                return Err(GraphError::InvalidEdgeLength {
                    edge: i,
                    length_m: edge.length_m,
                });
            }
        }

        let mut sorted = edges;
        sorted.sort_by(|a, b| {
            (a.from, a.to)
                .cmp(&(b.from, b.to))
                .then_with(|| a.length_m.total_cmp(&b.length_m))
        });

        let mut offsets = Vec::with_capacity(node_count + 1);
        let mut targets = Vec::with_capacity(sorted.len());
        let mut lengths_m = Vec::with_capacity(sorted.len());
        let mut costs = Vec::with_capacity(sorted.len());

        let mut cursor = 0usize;
        for node in 0..node_count as NodeId {
            offsets.push(edge_offset(targets.len())?);
            while cursor < sorted.len() && sorted[cursor].from == node {
                let edge = sorted[cursor];
                targets.push(edge.to);
                lengths_m.push(edge.length_m);
                costs.push(length_to_cost(edge.length_m));
                cursor += 1;
            }
        }
        offsets.push(edge_offset(targets.len())?);

        Ok(Self {
            locations,
            offsets,
            targets,
            lengths_m,
            costs,
        })
    }

    pub fn node_count(&self) -> usize {
        self.locations.len()
    }

    pub fn edge_count(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        (node as usize) < self.locations.len()
    }

    pub fn location(&self, node: NodeId) -> Option<Location> {
        self.locations.get(node as usize).copied()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    fn edge_range(&self, node: NodeId) -> std::ops::Range<usize> {
        let start = self.offsets[node as usize] as usize;
        let end = self.offsets[node as usize + 1] as usize;
        start..end
    }

    /// Outgoing `(target, cost)` pairs for search.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = (NodeId, Cost)> + '_ {
        let range = self.edge_range(node);
        self.targets[range.clone()]
            .iter()
            .copied()
            .zip(self.costs[range].iter().copied())
    }

    /// Length of the shortest directed edge `from → to`, if one exists.
    pub fn edge_length(&self, from: NodeId, to: NodeId) -> Option<f64> {
        if !self.contains(from) {
            return None;
        }
        let range = self.edge_range(from);
        self.targets[range.clone()]
            .iter()
            .zip(self.lengths_m[range].iter())
            .filter(|(target, _)| **target == to)
            .map(|(_, length)| *length)
            .min_by(f64::total_cmp)
    }

    /// Total length of a node path in meters, or `None` if two consecutive nodes are
    /// not joined by an edge.
    pub fn path_length_m(&self, path: &[NodeId]) -> Option<f64> {
        path.windows(2)
            .map(|pair| self.edge_length(pair[0], pair[1]))
            .sum()
    }
}

fn edge_offset(count: usize) -> Result<u32, GraphError> {
    u32::try_from(count).map_err(|_| GraphError::TooManyEdges(count))
}

fn length_to_cost(length_m: f64) -> Cost {
    ((length_m * 1000.0).round() as Cost).max(1)
}
