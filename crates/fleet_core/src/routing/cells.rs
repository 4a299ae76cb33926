//! Cell → node grouping, anchor selection and nearest-node resolution.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use h3o::{CellIndex, Resolution};
use lru::LruCache;

use crate::graph::{NodeId, RoadGraph};
use crate::spatial::Location;

const NEAREST_MEMO_CAPACITY: usize = 4_096;

/// Quantization for memo keys: 1e-7 degrees (~1 cm).
const COORD_QUANTUM: f64 = 1e7;

type NearestKey = (i64, i64, Option<NodeId>);

/// Groups graph nodes by H3 cell and picks one anchor per occupied cell.
///
/// Nodes are visited in id order, so the anchor of a cell is its lowest node id
/// and is stable for a given graph. Every node belongs to exactly one cell.
pub struct CellNodeIndex {
    resolution: Resolution,
    node_cells: Vec<CellIndex>,
    nodes_by_cell: HashMap<CellIndex, Vec<NodeId>>,
    anchors: HashMap<CellIndex, NodeId>,
    nearest_memo: Mutex<LruCache<NearestKey, NodeId>>,
}

impl CellNodeIndex {
    pub fn build(graph: &RoadGraph, resolution: Resolution) -> Self {
        let mut node_cells = Vec::with_capacity(graph.node_count());
        let mut nodes_by_cell: HashMap<CellIndex, Vec<NodeId>> = HashMap::new();
        let mut anchors = HashMap::new();

        for (i, location) in graph.locations().iter().enumerate() {
            let node = i as NodeId;
            // RoadGraph rejects invalid coordinates, so every node has a cell.
            let Some(cell) = location.cell(resolution) else {
                continue;
            };
            node_cells.push(cell);
            nodes_by_cell.entry(cell).or_default().push(node);
            anchors.entry(cell).or_insert(node);
        }

        Self {
            resolution,
            node_cells,
            nodes_by_cell,
            anchors,
            nearest_memo: Mutex::new(LruCache::new(
                NonZeroUsize::new(NEAREST_MEMO_CAPACITY).expect("cache size must be non-zero"),
            )),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cell_of_node(&self, node: NodeId) -> Option<CellIndex> {
        self.node_cells.get(node as usize).copied()
    }

    pub fn nodes_in(&self, cell: CellIndex) -> &[NodeId] {
        self.nodes_by_cell
            .get(&cell)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn anchor(&self, cell: CellIndex) -> Option<NodeId> {
        self.anchors.get(&cell).copied()
    }

    pub fn occupied_cells(&self) -> usize {
        self.anchors.len()
    }

    /// `(cell, anchor)` pairs sorted by cell id.
    pub fn anchors_sorted(&self) -> Vec<(CellIndex, NodeId)> {
        let mut anchors: Vec<(CellIndex, NodeId)> =
            self.anchors.iter().map(|(c, n)| (*c, *n)).collect();
        anchors.sort_unstable();
        anchors
    }

    /// Nearest graph node to `location`, optionally skipping `exclude`.
    ///
    /// Candidates from the location's own cell are checked first; the whole graph
    /// is scanned only when that cell has no (non-excluded) nodes. Ranking uses
    /// squared lat/lon distance, ties go to the lower node id.
    pub fn nearest_node(
        &self,
        graph: &RoadGraph,
        location: &Location,
        exclude: Option<NodeId>,
    ) -> Option<NodeId> {
        if !location.is_valid() || graph.is_empty() {
            return None;
        }
        let key = (
            (location.lat * COORD_QUANTUM).round() as i64,
            (location.lon * COORD_QUANTUM).round() as i64,
            exclude,
        );
        if let Ok(mut memo) = self.nearest_memo.lock() {
            if let Some(node) = memo.get(&key) {
                return Some(*node);
            }
        }

        let in_cell = location
            .cell(self.resolution)
            .and_then(|cell| nearest_among(graph, location, self.nodes_in(cell).iter().copied(), exclude));
        let found = in_cell.or_else(|| {
            nearest_among(graph, location, 0..graph.node_count() as NodeId, exclude)
        })?;

        if let Ok(mut memo) = self.nearest_memo.lock() {
            memo.put(key, found);
        }
        Some(found)
    }
}

fn nearest_among(
    graph: &RoadGraph,
    location: &Location,
    candidates: impl Iterator<Item = NodeId>,
    exclude: Option<NodeId>,
) -> Option<NodeId> {
    let mut best: Option<(NodeId, f64)> = None;
    for node in candidates {
        if Some(node) == exclude {
            continue;
        }
        let Some(node_location) = graph.location(node) else {
            continue;
        };
        let d = node_location.degree_distance_sq(location);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((node, d)),
        }
    }
    best.map(|(node, _)| node)
}
