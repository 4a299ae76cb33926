#![allow(dead_code)]

use fleet_core::graph::{EdgeSpec, RoadGraph};
use fleet_core::spatial::{haversine_km, Location};
use fleet_core::test_helpers::{grid_graph, GRID_ORIGIN};

fn meters(a: &Location, b: &Location) -> f64 {
    haversine_km(a, b) * 1000.0
}

/// A straight east-west street of `len` nodes.
pub fn corridor(len: usize, spacing_deg: f64, two_way: bool) -> RoadGraph {
    let locations: Vec<Location> = (0..len)
        .map(|i| Location::new(GRID_ORIGIN.lat, GRID_ORIGIN.lon + i as f64 * spacing_deg))
        .collect();
    let mut edges = Vec::new();
    for i in 1..len {
        let (a, b) = ((i - 1) as u32, i as u32);
        let length = meters(&locations[i - 1], &locations[i]);
        edges.push(EdgeSpec::new(a, b, length));
        if two_way {
            edges.push(EdgeSpec::new(b, a, length));
        }
    }
    RoadGraph::from_parts(locations, edges).expect("corridor graph")
}

/// Two grids far enough apart to share no cells and with no road between them.
pub fn two_islands(side: usize, spacing_deg: f64) -> RoadGraph {
    let west = grid_graph(side, side, spacing_deg);
    let offset = side as u32 * side as u32;
    let mut locations: Vec<Location> = west.locations().to_vec();
    locations.extend(
        west.locations()
            .iter()
            .map(|l| Location::new(l.lat, l.lon + 0.5)),
    );
    let mut edges = Vec::new();
    for node in 0..offset {
        for (next, _) in west.successors(node) {
            let length = west.edge_length(node, next).expect("edge");
            edges.push(EdgeSpec::new(node, next, length));
            edges.push(EdgeSpec::new(node + offset, next + offset, length));
        }
    }
    RoadGraph::from_parts(locations, edges).expect("island graph")
}

/// A corridor whose westbound lanes take `detour` times the eastbound length.
pub fn lopsided_corridor(len: usize, spacing_deg: f64, detour: f64) -> RoadGraph {
    let locations: Vec<Location> = (0..len)
        .map(|i| Location::new(GRID_ORIGIN.lat, GRID_ORIGIN.lon + i as f64 * spacing_deg))
        .collect();
    let mut edges = Vec::new();
    for i in 1..len {
        let (a, b) = ((i - 1) as u32, i as u32);
        let length = meters(&locations[i - 1], &locations[i]);
        edges.push(EdgeSpec::new(a, b, length));
        edges.push(EdgeSpec::new(b, a, length * detour));
    }
    RoadGraph::from_parts(locations, edges).expect("lopsided graph")
}

/// Two `side x side` grids, the second `offset_lat` degrees north of the first,
/// joined by a single two-way road from the south grid's top-left corner to the
/// north grid's bottom-left corner. North nodes are numbered after the south ones.
pub fn bridged_clusters(side: usize, spacing_deg: f64, offset_lat: f64) -> RoadGraph {
    let south = grid_graph(side, side, spacing_deg);
    let offset = side as u32 * side as u32;
    let mut locations: Vec<Location> = south.locations().to_vec();
    locations.extend(
        south
            .locations()
            .iter()
            .map(|l| Location::new(l.lat + offset_lat, l.lon)),
    );
    let mut edges = Vec::new();
    for node in 0..offset {
        for (next, _) in south.successors(node) {
            let length = south.edge_length(node, next).expect("edge");
            edges.push(EdgeSpec::new(node, next, length));
            edges.push(EdgeSpec::new(node + offset, next + offset, length));
        }
    }
    let top_left = (side as u32 - 1) * side as u32;
    let bridge = meters(&locations[top_left as usize], &locations[offset as usize]);
    edges.push(EdgeSpec::new(top_left, offset, bridge));
    edges.push(EdgeSpec::new(offset, top_left, bridge));
    RoadGraph::from_parts(locations, edges).expect("bridged graph")
}

/// One intersection, no roads.
pub fn single_node() -> RoadGraph {
    RoadGraph::from_parts(vec![GRID_ORIGIN], Vec::new()).expect("single node graph")
}
