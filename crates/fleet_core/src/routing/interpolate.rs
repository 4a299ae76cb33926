//! Evenly spaced points along a node path, for animation and map output.

use crate::graph::{NodeId, RoadGraph};
use crate::spatial::{haversine_km, Location};

/// One point every ~200 m, never fewer than 10 nor more than 50.
const METERS_PER_POINT: f64 = 200.0;
const MIN_POINTS: usize = 10;
const MAX_POINTS: usize = 50;

pub fn point_count(total_m: f64) -> usize {
    let raw = (total_m / METERS_PER_POINT).floor();
    if raw.is_finite() && raw > 0.0 {
        (raw as usize).clamp(MIN_POINTS, MAX_POINTS)
    } else {
        MIN_POINTS
    }
}

/// Points spaced evenly by distance along `path`, including both endpoints.
///
/// A path with no length (a single node, or repeated nodes) yields `point_count`
/// copies of its first location. An empty path yields no points.
pub fn interpolate(graph: &RoadGraph, path: &[NodeId]) -> Vec<Location> {
    let locations: Vec<Location> = path.iter().filter_map(|n| graph.location(*n)).collect();
    let Some(first) = locations.first().copied() else {
        return Vec::new();
    };

    // Cumulative distance at each node. Segments without an edge (should not
    // happen for routed paths) fall back to great-circle length.
    let mut cumulative = Vec::with_capacity(locations.len());
    cumulative.push(0.0);
    for (pair, nodes) in locations.windows(2).zip(path.windows(2)) {
        let segment = graph
            .edge_length(nodes[0], nodes[1])
            .unwrap_or_else(|| haversine_km(&pair[0], &pair[1]) * 1000.0);
        let last = cumulative.last().copied().unwrap_or(0.0);
        cumulative.push(last + segment);
    }
    let total = cumulative.last().copied().unwrap_or(0.0);
    let count = point_count(total);
    if total <= 0.0 {
        return vec![first; count];
    }

    let mut points = Vec::with_capacity(count);
    let mut segment = 0;
    for k in 0..count {
        let target = total * k as f64 / (count - 1) as f64;
        while segment + 2 < cumulative.len() && cumulative[segment + 1] < target {
            segment += 1;
        }
        let (a, b) = (locations[segment], locations[segment + 1]);
        let span = cumulative[segment + 1] - cumulative[segment];
        let t = if span > 0.0 {
            ((target - cumulative[segment]) / span).clamp(0.0, 1.0)
        } else {
            0.0
        };
        points.push(Location::new(
            a.lat + (b.lat - a.lat) * t,
            a.lon + (b.lon - a.lon) * t,
        ));
    }
    points
}

/// [`interpolate`] with evenly spaced virtual timestamps from `start_ms` to `end_ms`.
pub fn interpolate_timed(
    graph: &RoadGraph,
    path: &[NodeId],
    start_ms: u64,
    end_ms: u64,
) -> Vec<(u64, Location)> {
    let points = interpolate(graph, path);
    let steps = points.len().saturating_sub(1).max(1) as u64;
    let span = end_ms.saturating_sub(start_ms);
    points
        .into_iter()
        .enumerate()
        .map(|(k, location)| (start_ms + span * k as u64 / steps, location))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeSpec;

    fn straight_road(segments: u32, segment_m: f64) -> RoadGraph {
        let locations = (0..=segments)
            .map(|i| Location::new(41.0 + 0.001 * i as f64, -81.5))
            .collect();
        let edges = (0..segments)
            .map(|i| EdgeSpec::new(i, i + 1, segment_m))
            .collect();
        RoadGraph::from_parts(locations, edges).expect("graph")
    }

    #[test]
    fn point_count_is_clamped() {
        assert_eq!(point_count(0.0), 10);
        assert_eq!(point_count(1_000.0), 10);
        assert_eq!(point_count(5_000.0), 25);
        assert_eq!(point_count(50_000.0), 50);
    }

    #[test]
    fn points_run_from_start_to_end() {
        let graph = straight_road(10, 500.0);
        let path: Vec<NodeId> = (0..=10).collect();
        let points = interpolate(&graph, &path);
        assert_eq!(points.len(), 25);

        let first = points.first().expect("first");
        let last = points.last().expect("last");
        assert!((first.lat - 41.0).abs() < 1e-9);
        assert!((last.lat - 41.01).abs() < 1e-9);
        assert!(points.windows(2).all(|w| w[1].lat >= w[0].lat));
    }

    #[test]
    fn zero_length_path_repeats_first_point() {
        let graph = straight_road(1, 100.0);
        let points = interpolate(&graph, &[1]);
        assert_eq!(points.len(), 10);
        let node = graph.location(1).expect("node");
        assert!(points.iter().all(|p| *p == node));
        assert!(interpolate(&graph, &[]).is_empty());
    }

    #[test]
    fn timed_points_span_the_interval() {
        let graph = straight_road(4, 500.0);
        let path: Vec<NodeId> = (0..=4).collect();
        let timed = interpolate_timed(&graph, &path, 1_000, 10_000);
        assert_eq!(timed.len(), 10);
        assert_eq!(timed.first().map(|p| p.0), Some(1_000));
        assert_eq!(timed.last().map(|p| p.0), Some(10_000));
        assert!(timed.windows(2).all(|w| w[1].0 >= w[0].0));
    }
}
