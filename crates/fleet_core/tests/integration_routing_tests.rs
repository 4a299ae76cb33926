mod support;

use std::sync::Arc;

use fleet_core::config::RoutingConfig;
use fleet_core::graph::RoadGraph;
use fleet_core::routing::{BuildMode, RouteStrategy, RoutingError, RoutingService};
use fleet_core::spatial::Location;
use fleet_core::test_helpers::{grid_graph, grid_location, grid_node};
use pathfinding::prelude::dijkstra;
use support::graph::{corridor, lopsided_corridor, single_node, two_islands};

const SPACING: f64 = 0.004;

fn routing(graph: RoadGraph, config: RoutingConfig) -> RoutingService {
    RoutingService::build(Arc::new(graph), &config).expect("routing service")
}

fn res8() -> RoutingConfig {
    RoutingConfig::default().with_resolution(8)
}

#[test]
fn parallel_and_sequential_precompute_agree() {
    let sequential = routing(grid_graph(12, 12, SPACING), res8().with_parallel(false));
    let mut parallel_config = res8().with_parallel(true);
    parallel_config.batch_size = 3;
    parallel_config.workers = 4;
    let parallel = routing(grid_graph(12, 12, SPACING), parallel_config);

    assert_eq!(sequential.cache().mode(), BuildMode::SingleThreaded);
    assert!(matches!(parallel.cache().mode(), BuildMode::Parallel { .. }));
    assert_eq!(sequential.cache().len(), parallel.cache().len());
    for ((origin, destination), path) in sequential.cache().iter() {
        let other = parallel
            .cache()
            .get(*origin, *destination)
            .expect("pair cached in both modes");
        assert_eq!(other.nodes, path.nodes);
        assert!((other.distance_m - path.distance_m).abs() < 1e-9);
    }

    let from = grid_location(0, 0, SPACING);
    let to = grid_location(11, 9, SPACING);
    let a = sequential.shortest_path(&from, &to).expect("route");
    let b = parallel.shortest_path(&from, &to).expect("route");
    assert_eq!(a, b);
}

#[test]
fn repeated_queries_are_identical() {
    let service = routing(grid_graph(8, 8, SPACING), res8());
    let from = grid_location(1, 2, SPACING);
    let to = grid_location(7, 6, SPACING);
    let first = service.shortest_path(&from, &to).expect("route");
    for _ in 0..3 {
        assert_eq!(service.shortest_path(&from, &to).expect("route"), first);
    }
}

#[test]
fn grid_distances_are_nearly_symmetric() {
    let service = routing(grid_graph(8, 8, SPACING), res8());
    let pairs = [((0, 0), (7, 7)), ((2, 5), (6, 1)), ((3, 3), (3, 7))];
    for ((r0, c0), (r1, c1)) in pairs {
        let a = grid_location(r0, c0, SPACING);
        let b = grid_location(r1, c1, SPACING);
        let forward = service.shortest_path(&a, &b).expect("forward");
        let backward = service.shortest_path(&b, &a).expect("backward");
        let tolerance = 0.05 * forward.distance_m.max(backward.distance_m);
        assert!(
            (forward.distance_m - backward.distance_m).abs() <= tolerance,
            "{} vs {}",
            forward.distance_m,
            backward.distance_m
        );
    }
}

#[test]
fn routes_start_and_end_at_resolved_nodes() {
    let service = routing(grid_graph(8, 8, SPACING), res8());
    let route = service
        .shortest_path(&grid_location(0, 0, SPACING), &grid_location(5, 6, SPACING))
        .expect("route");
    assert_eq!(route.origin(), Some(grid_node(0, 0, 8)));
    assert_eq!(route.destination(), Some(grid_node(5, 6, 8)));
    let length = service.graph().path_length_m(&route.nodes).expect("path is traversable");
    assert!((length - route.distance_m).abs() < 1e-6);
}

#[test]
fn single_node_graph_routes_with_zero_length() {
    let service = routing(single_node(), res8());
    assert!(service.cache().is_empty());
    let here = service.node_location(0).expect("node");
    let elsewhere = Location::new(here.lat + 0.01, here.lon);
    let route = service.shortest_path(&here, &elsewhere).expect("route");
    assert_eq!(route.nodes, vec![0]);
    assert_eq!(route.distance_m, 0.0);
    assert_eq!(route.strategy, RouteStrategy::SameNode);
}

#[test]
fn disconnected_islands_have_no_path() {
    let service = routing(two_islands(4, SPACING), res8());
    let west = service.node_location(0).expect("west");
    let east = service.node_location(16).expect("east");
    match service.shortest_path(&west, &east) {
        Err(RoutingError::NoPathFound { from, to }) => {
            assert_eq!(from, 0);
            assert_eq!(to, 16);
        }
        other => panic!("expected NoPathFound, got {other:?}"),
    }

    let west_far = service.node_location(15).expect("west corner");
    assert!(service.shortest_path(&west, &west_far).is_ok());
}

#[test]
fn one_way_street_routes_only_forward() {
    let service = routing(corridor(12, SPACING, false), res8());
    let head = service.node_location(0).expect("head");
    let tail = service.node_location(11).expect("tail");
    let forward = service.shortest_path(&head, &tail).expect("forward");
    assert_eq!(forward.nodes, (0..12).collect::<Vec<u32>>());
    assert!(matches!(
        service.shortest_path(&tail, &head),
        Err(RoutingError::NoPathFound { .. })
    ));
}

#[test]
fn cached_paths_are_shortest_in_their_own_direction() {
    for config in [res8(), res8().with_parallel(false)] {
        let service = routing(lopsided_corridor(16, SPACING, 3.0), config);
        let graph = service.graph();
        assert!(service.cache().len() >= 2);

        for (pair, cached) in service.cache().iter() {
            let from = *cached.nodes.first().expect("start");
            let to = *cached.nodes.last().expect("end");
            let (best, _) = dijkstra(&from, |n: &u32| graph.successors(*n), |n| *n == to)
                .expect("reachable");
            let best_m = graph.path_length_m(&best).expect("length");
            assert!(
                (cached.distance_m - best_m).abs() < 0.01,
                "{pair:?}: cached {} vs shortest {best_m}",
                cached.distance_m
            );
        }
    }
}

#[test]
fn westbound_trip_pays_the_detour() {
    let service = routing(lopsided_corridor(12, SPACING, 3.0), res8());
    let head = service.node_location(0).expect("head");
    let tail = service.node_location(11).expect("tail");
    let east = service.shortest_path(&head, &tail).expect("east");
    let west = service.shortest_path(&tail, &head).expect("west");
    assert_eq!(west.nodes, (0..12).rev().collect::<Vec<u32>>());
    assert!((west.distance_m - 3.0 * east.distance_m).abs() < 0.5);
}

#[test]
fn invalid_location_fails_to_resolve() {
    let service = routing(grid_graph(3, 3, SPACING), res8());
    let bad = Location::new(f64::NAN, 0.0);
    assert!(matches!(
        service.shortest_path(&bad, &grid_location(0, 0, SPACING)),
        Err(RoutingError::NodeResolutionFailure { .. })
    ));
}

#[test]
fn timed_interpolation_spans_the_trip() {
    let service = routing(grid_graph(8, 8, SPACING), res8());
    let route = service
        .shortest_path(&grid_location(0, 0, SPACING), &grid_location(7, 7, SPACING))
        .expect("route");
    let points = service.interpolate_timed(&route, 1_000, 61_000);
    assert!(points.len() >= 10 && points.len() <= 50);
    assert_eq!(points.first().map(|(t, _)| *t), Some(1_000));
    assert_eq!(points.last().map(|(t, _)| *t), Some(61_000));
    assert!(points.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(points.first().map(|(_, l)| *l), service.node_location(0));
}
