use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::Resource;
use h3o::{CellIndex, Resolution};
use log::info;
use lru::LruCache;
use pathfinding::prelude::dijkstra;
use rand::Rng;

use crate::config::{ConfigError, RoutingConfig};
use crate::graph::{NodeId, RoadGraph};
use crate::routing::cells::CellNodeIndex;
use crate::routing::error::RoutingError;
use crate::routing::interpolate::{interpolate, interpolate_timed};
use crate::routing::path_cache::PathCache;
use crate::spatial::{haversine_miles, meters_to_miles, Location};

const LEG_MEMO_CAPACITY: usize = 8_192;

/// How a route was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStrategy {
    /// Both endpoints resolved to the same node.
    SameNode,
    /// Same cell, short enough to search directly.
    IntraCell,
    /// origin → anchor, cached anchor → anchor, anchor → destination.
    Stitched,
    /// Dijkstra between the two nodes.
    Direct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub nodes: Vec<NodeId>,
    pub distance_m: f64,
    pub strategy: RouteStrategy,
}

impl Route {
    pub fn distance_miles(&self) -> f64 {
        meters_to_miles(self.distance_m)
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn origin(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    pub fn destination(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }
}

#[derive(Debug, Clone)]
struct Leg {
    nodes: Vec<NodeId>,
    distance_m: f64,
}

/// Point-to-point routing over a [`RoadGraph`].
///
/// Owns the cell index, the precomputed anchor path cache and a bounded memo of
/// direct searches. Everything is read-only after [`RoutingService::build`]
/// except the memos, which only ever hold successful results.
pub struct RoutingService {
    graph: Arc<RoadGraph>,
    cells: CellNodeIndex,
    cache: PathCache,
    intra_cell_max_edges: usize,
    legs: Mutex<LruCache<(NodeId, NodeId), Leg>>,
}

impl RoutingService {
    /// Index the graph and run the path-cache precompute.
    pub fn build(graph: Arc<RoadGraph>, config: &RoutingConfig) -> Result<Self, ConfigError> {
        let resolution = config.resolution()?;
        let cells = CellNodeIndex::build(&graph, resolution);
        info!(
            "routing: {} nodes, {} edges, {} occupied cells at resolution {}",
            graph.node_count(),
            graph.edge_count(),
            cells.occupied_cells(),
            resolution
        );
        let cache = PathCache::build(&graph, &cells, config);
        Ok(Self {
            graph,
            cells,
            cache,
            intra_cell_max_edges: config.intra_cell_max_edges,
            legs: Mutex::new(LruCache::new(
                NonZeroUsize::new(LEG_MEMO_CAPACITY).expect("cache size must be non-zero"),
            )),
        })
    }

    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    pub fn cells(&self) -> &CellNodeIndex {
        &self.cells
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    pub fn resolution(&self) -> Resolution {
        self.cells.resolution()
    }

    pub fn node_location(&self, node: NodeId) -> Option<Location> {
        self.graph.location(node)
    }

    pub fn node_cell(&self, node: NodeId) -> Option<CellIndex> {
        self.cells.cell_of_node(node)
    }

    pub fn nearest_node(&self, location: &Location) -> Option<NodeId> {
        self.cells.nearest_node(&self.graph, location, None)
    }

    pub fn random_node<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeId> {
        if self.graph.is_empty() {
            return None;
        }
        Some(rng.gen_range(0..self.graph.node_count()) as NodeId)
    }

    pub fn random_node_in_cell<R: Rng + ?Sized>(&self, cell: CellIndex, rng: &mut R) -> Option<NodeId> {
        let nodes = self.cells.nodes_in(cell);
        if nodes.is_empty() {
            return None;
        }
        Some(nodes[rng.gen_range(0..nodes.len())])
    }

    /// Nodes within `radius_miles` great-circle distance of `center`, in id order.
    pub fn nodes_within_miles(&self, center: &Location, radius_miles: f64) -> Vec<NodeId> {
        self.graph
            .locations()
            .iter()
            .enumerate()
            .filter(|(_, location)| haversine_miles(center, location) <= radius_miles)
            .map(|(i, _)| i as NodeId)
            .collect()
    }

    /// Shortest route between two locations.
    ///
    /// Cross-cell routes are stitched through the cell anchors when the cache has
    /// the anchor pair. This is an approximation: the anchors are fixed
    /// representatives, so a stitched route can be longer than the true shortest
    /// path but never shorter.
    pub fn shortest_path(&self, from: &Location, to: &Location) -> Result<Route, RoutingError> {
        let start = self
            .cells
            .nearest_node(&self.graph, from, None)
            .ok_or(RoutingError::NodeResolutionFailure { location: *from })?;
        let end = if from == to {
            start
        } else {
            self.cells
                .nearest_node(&self.graph, to, Some(start))
                .or_else(|| self.cells.nearest_node(&self.graph, to, None))
                .ok_or(RoutingError::NodeResolutionFailure { location: *to })?
        };
        self.route_between_nodes(start, end)
    }

    pub fn route_between_nodes(&self, start: NodeId, end: NodeId) -> Result<Route, RoutingError> {
        if start == end {
            return Ok(Route {
                nodes: vec![start],
                distance_m: 0.0,
                strategy: RouteStrategy::SameNode,
            });
        }
        let no_path = RoutingError::NoPathFound {
            from: start,
            to: end,
        };
        let (Some(start_cell), Some(end_cell)) =
            (self.cells.cell_of_node(start), self.cells.cell_of_node(end))
        else {
            return Err(no_path);
        };

        if start_cell == end_cell {
            if let Some(leg) = self.bounded_leg(start, end, self.intra_cell_max_edges) {
                return Ok(Route {
                    nodes: leg.nodes,
                    distance_m: leg.distance_m,
                    strategy: RouteStrategy::IntraCell,
                });
            }
        }

        if let Some(route) = self.stitched(start, end, start_cell, end_cell) {
            return Ok(route);
        }

        let leg = self.direct_leg(start, end).ok_or(no_path)?;
        Ok(Route {
            nodes: leg.nodes,
            distance_m: leg.distance_m,
            strategy: RouteStrategy::Direct,
        })
    }

    fn stitched(
        &self,
        start: NodeId,
        end: NodeId,
        start_cell: CellIndex,
        end_cell: CellIndex,
    ) -> Option<Route> {
        let cached = self.cache.get(start_cell, end_cell)?;
        let first_anchor = *cached.nodes.first()?;
        let last_anchor = *cached.nodes.last()?;
        let head = self.direct_leg(start, first_anchor)?;
        let tail = self.direct_leg(last_anchor, end)?;

        let mut nodes = Vec::with_capacity(head.nodes.len() + cached.nodes.len() + tail.nodes.len());
        nodes.extend_from_slice(&head.nodes);
        nodes.extend_from_slice(&cached.nodes[1..]);
        nodes.extend_from_slice(&tail.nodes[1..]);
        Some(Route {
            nodes,
            distance_m: head.distance_m + cached.distance_m + tail.distance_m,
            strategy: RouteStrategy::Stitched,
        })
    }

    /// Shortest path from `from` to `to` using at most `max_edges` edges.
    ///
    /// Search states are `(node, hops)` and expansion stops at the hop limit, so the
    /// search never leaves the `max_edges` neighbourhood of `from`.
    fn bounded_leg(&self, from: NodeId, to: NodeId, max_edges: usize) -> Option<Leg> {
        let graph = &self.graph;
        let (states, _cost) = dijkstra(
            &(from, 0usize),
            |&(node, hops): &(NodeId, usize)| {
                let open = hops < max_edges;
                graph
                    .successors(node)
                    .filter(move |_| open)
                    .map(move |(next, cost)| ((next, hops + 1), cost))
            },
            |&(node, _)| node == to,
        )?;
        let nodes: Vec<NodeId> = states.into_iter().map(|(node, _)| node).collect();
        let distance_m = graph.path_length_m(&nodes)?;
        Some(Leg { nodes, distance_m })
    }

    /// Dijkstra from `from` to `to`, memoized on success.
    fn direct_leg(&self, from: NodeId, to: NodeId) -> Option<Leg> {
        if from == to {
            return Some(Leg {
                nodes: vec![from],
                distance_m: 0.0,
            });
        }
        if let Ok(mut legs) = self.legs.lock() {
            if let Some(leg) = legs.get(&(from, to)) {
                return Some(leg.clone());
            }
        }

        let graph = &self.graph;
        let (nodes, _cost) = dijkstra(&from, |node: &NodeId| graph.successors(*node), |node| *node == to)?;
        let distance_m = graph.path_length_m(&nodes)?;
        let leg = Leg { nodes, distance_m };

        if let Ok(mut legs) = self.legs.lock() {
            legs.put((from, to), leg.clone());
        }
        Some(leg)
    }

    pub fn interpolate(&self, route: &Route) -> Vec<Location> {
        interpolate(&self.graph, &route.nodes)
    }

    pub fn interpolate_timed(&self, route: &Route, start_ms: u64, end_ms: u64) -> Vec<(u64, Location)> {
        interpolate_timed(&self.graph, &route.nodes, start_ms, end_ms)
    }
}

/// Shared routing service for the simulation systems.
#[derive(Resource, Clone)]
pub struct Routing(pub Arc<RoutingService>);

impl std::ops::Deref for Routing {
    type Target = RoutingService;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
