//! Anchor-to-anchor shortest paths, precomputed once before the clock starts.
//!
//! Every occupied cell contributes its anchor node. Each source anchor runs a single
//! all-destinations Dijkstra and emits its entry to every other reachable anchor.
//! Each direction of a pair comes from its own source's search, so one-way and
//! asymmetric roads never leave a reversed path standing in for a shortest one.
//! Sources are independent, which makes the build embarrassingly parallel: above
//! the configured threshold they are split into batches and run on a rayon pool.
//! The build mode never changes the contents of the cache.

use std::collections::HashMap;
use std::time::Instant;

use h3o::CellIndex;
use log::{debug, info, warn};
use pathfinding::prelude::{build_path, dijkstra_all};
use rayon::prelude::*;

use crate::config::RoutingConfig;
use crate::graph::{NodeId, RoadGraph};
use crate::routing::cells::CellNodeIndex;

type CellPair = (CellIndex, CellIndex);
type Batch = Vec<(CellPair, CachedPath)>;

/// Node path between two anchors and its length in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPath {
    pub nodes: Vec<NodeId>,
    pub distance_m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    SingleThreaded,
    Parallel { workers: usize },
}

#[derive(Debug, Clone)]
pub struct PathCache {
    entries: HashMap<CellPair, CachedPath>,
    anchor_count: usize,
    mode: BuildMode,
}

impl PathCache {
    pub fn build(graph: &RoadGraph, cells: &CellNodeIndex, config: &RoutingConfig) -> Self {
        let anchors = cells.anchors_sorted();
        let started = Instant::now();

        let (batches, mode) = if config.use_parallel(anchors.len()) {
            match build_parallel(graph, &anchors, config) {
                Ok(result) => result,
                Err(err) => {
                    warn!("path cache worker pool unavailable ({err}), building single-threaded");
                    (build_sequential(graph, &anchors), BuildMode::SingleThreaded)
                }
            }
        } else {
            (build_sequential(graph, &anchors), BuildMode::SingleThreaded)
        };

        let pair_count = anchors.len() * anchors.len().saturating_sub(1);
        let mut entries = HashMap::with_capacity(pair_count);
        for batch in batches {
            entries.extend(batch);
        }

        info!(
            "path cache: {} anchors, {} of {} ordered pairs cached ({:?}) in {:.2?}",
            anchors.len(),
            entries.len(),
            pair_count,
            mode,
            started.elapsed()
        );

        Self {
            entries,
            anchor_count: anchors.len(),
            mode,
        }
    }

    pub fn get(&self, origin: CellIndex, destination: CellIndex) -> Option<&CachedPath> {
        self.entries.get(&(origin, destination))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchor_count
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellPair, &CachedPath)> {
        self.entries.iter()
    }
}

fn build_sequential(graph: &RoadGraph, anchors: &[(CellIndex, NodeId)]) -> Vec<Batch> {
    (0..anchors.len())
        .map(|i| paths_from_source(graph, anchors, i))
        .collect()
}

fn build_parallel(
    graph: &RoadGraph,
    anchors: &[(CellIndex, NodeId)],
    config: &RoutingConfig,
) -> Result<(Vec<Batch>, BuildMode), rayon::ThreadPoolBuildError> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if config.workers > 0 {
        builder = builder.num_threads(config.workers);
    }
    let pool = builder.build()?;
    let workers = pool.current_num_threads();
    debug!(
        "path cache: {} sources in batches of {} on {} workers",
        anchors.len(),
        config.batch_size,
        workers
    );

    let sources: Vec<usize> = (0..anchors.len()).collect();
    let batches = pool.install(|| {
        sources
            .par_chunks(config.batch_size.max(1))
            .map(|chunk| {
                chunk
                    .iter()
                    .flat_map(|&i| paths_from_source(graph, anchors, i))
                    .collect::<Batch>()
            })
            .collect()
    });
    Ok((batches, BuildMode::Parallel { workers }))
}

/// Entries `(i, j)` for every anchor `j` reachable from anchor `i`.
fn paths_from_source(graph: &RoadGraph, anchors: &[(CellIndex, NodeId)], i: usize) -> Batch {
    let (source_cell, source) = anchors[i];
    let parents = dijkstra_all(&source, |node: &NodeId| graph.successors(*node));

    let mut out = Vec::new();
    for (j, &(target_cell, target)) in anchors.iter().enumerate() {
        if j == i || !parents.contains_key(&target) {
            continue;
        }
        let nodes = build_path(&target, &parents);
        let Some(distance_m) = graph.path_length_m(&nodes) else {
            continue;
        };
        out.push(((source_cell, target_cell), CachedPath { nodes, distance_m }));
    }
    out
}
