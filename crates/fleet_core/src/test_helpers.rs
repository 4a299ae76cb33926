//! Test helpers for common test setup and utilities.
//!
//! Synthetic road grids stand in for real map data, and [`test_config`] gives a small
//! fleet whose numbers are easy to reason about in assertions.

use bevy_ecs::prelude::{Schedule, World};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::config::{
    ChargingConfig, CostConfig, DispatchConfig, FleetConfig, GeoConfig, RoutingConfig, SimConfig,
    SimulationConfig, VehicleBehaviorConfig,
};
use crate::graph::{EdgeSpec, NodeId, RoadGraph};
use crate::pricing::PricingConfig;
use crate::scenario::build_scenario;
use crate::spatial::{haversine_km, Location};

/// South-west corner of every test grid (Akron, OH).
pub const GRID_ORIGIN: Location = Location {
    lat: 41.0814,
    lon: -81.5190,
};

pub fn grid_location(row: usize, col: usize, spacing_deg: f64) -> Location {
    Location::new(
        GRID_ORIGIN.lat + row as f64 * spacing_deg,
        GRID_ORIGIN.lon + col as f64 * spacing_deg,
    )
}

/// Node id of a grid position: `row * cols + col`.
pub fn grid_node(row: usize, col: usize, cols: usize) -> NodeId {
    (row * cols + col) as NodeId
}

/// A `rows x cols` lattice of two-way streets. Edge lengths are great-circle meters,
/// identical in both directions.
///
/// # Panics
///
/// Panics if `rows` or `cols` is zero.
pub fn grid_graph(rows: usize, cols: usize, spacing_deg: f64) -> RoadGraph {
    assert!(rows > 0 && cols > 0, "grid needs at least one node");
    let mut locations = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            locations.push(grid_location(row, col, spacing_deg));
        }
    }

    let mut edges = Vec::new();
    let mut connect = |a: NodeId, b: NodeId| {
        let meters = haversine_km(&locations[a as usize], &locations[b as usize]) * 1000.0;
        edges.push(EdgeSpec::new(a, b, meters));
        edges.push(EdgeSpec::new(b, a, meters));
    };
    for row in 0..rows {
        for col in 0..cols {
            let here = grid_node(row, col, cols);
            if col + 1 < cols {
                connect(here, grid_node(row, col + 1, cols));
            }
            if row + 1 < rows {
                connect(here, grid_node(row + 1, col, cols));
            }
        }
    }
    RoadGraph::from_parts(locations, edges).expect("grid graph should be valid")
}

/// Small deterministic config: 3 vehicles, one 50 kW charger, depot and service area
/// centered on `center`, single-threaded precompute at resolution 8.
pub fn test_config(center: Location) -> SimConfig {
    SimConfig {
        simulation: SimulationConfig {
            duration_secs: 2 * 60 * 60,
            time_step_secs: 60,
            seed: Some(7),
        },
        fleet: FleetConfig {
            fleet_size: 3,
            battery_capacity_kwh: 60.0,
            efficiency_mi_per_kwh: 4.0,
            utilization: 1.0,
            initial_spread_radius_miles: 1.0,
        },
        charging: ChargingConfig {
            chargers: 1,
            charger_power_kw: 50.0,
        },
        pricing: PricingConfig::new(3.0, 2.0),
        geo: GeoConfig {
            depot: center,
            service_area_center: center,
            service_area_radius_miles: 5.0,
        },
        dispatch: DispatchConfig::new(15.0),
        behavior: VehicleBehaviorConfig::new(0.2),
        routing: RoutingConfig::default()
            .with_resolution(8)
            .with_parallel(false),
        costs: CostConfig::default(),
    }
}

/// A 6x6 grid and a [`test_config`] centered on it.
pub fn test_scenario() -> (SimConfig, RoadGraph) {
    let graph = grid_graph(6, 6, 0.004);
    (test_config(grid_location(3, 3, 0.004)), graph)
}

/// World built by [`build_scenario`], with no events scheduled yet.
///
/// # Panics
///
/// Panics if the scenario fails to build.
pub fn create_test_world(config: SimConfig, graph: RoadGraph) -> World {
    let mut world = World::new();
    build_scenario(&mut world, config, graph).expect("test scenario should build");
    world
}

/// Schedule one event at the current time, pop it into [`CurrentEvent`] and run
/// `schedule` on it. Anything already queued at the current time pops first, so call
/// this on a clock with nothing due yet.
///
/// # Panics
///
/// Panics if the world has no [`SimulationClock`].
pub fn fire_event(
    world: &mut World,
    schedule: &mut Schedule,
    kind: EventKind,
    subject: Option<EventSubject>,
) {
    let event = {
        let mut clock = world.resource_mut::<SimulationClock>();
        let now = clock.now();
        clock.schedule_at(now, kind, subject);
        clock.pop_next().expect("event was just scheduled")
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
}
