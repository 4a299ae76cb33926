use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use bevy_ecs::prelude::{Entity, World};
use log::info;
use rand::Rng;

use crate::clock::{SimulationClock, ONE_SEC_MS};
use crate::config::SimConfig;
use crate::depot::ChargingDepot;
use crate::dispatch::TripGenerator;
use crate::distributions::ExponentialInterArrival;
use crate::ecs::{Position, Vehicle};
use crate::graph::RoadGraph;
use crate::routing::{Routing, RoutingService};
use crate::runner::SimulationFault;
use crate::scenario::params::{ServiceArea, SimRng, SimulationEndTimeMs};
use crate::spatial::{GeoIndex, VehicleIndex};
use crate::systems::position_at;
use crate::telemetry::SimTelemetry;

/// Spawn a vehicle and register it in the [`VehicleIndex`] when one is present.
pub fn spawn_vehicle(world: &mut World, vehicle: Vehicle, position: Position) -> Entity {
    let entity = world.spawn((vehicle, position)).id();
    if let Some(mut index) = world.get_resource_mut::<VehicleIndex>() {
        index.insert(entity, position.cell);
    }
    entity
}

/// Build a runnable world from a config and a road graph.
///
/// Runs the path-cache precompute, so this returns only once routing is ready.
/// Call [`crate::runner::initialize_simulation`] afterwards to schedule the start.
pub fn build_scenario(world: &mut World, config: SimConfig, graph: RoadGraph) -> anyhow::Result<()> {
    config.validate().context("invalid simulation config")?;
    if graph.is_empty() {
        bail!("road graph has no nodes");
    }
    let resolution = config.routing.resolution()?;

    let routing = RoutingService::build(Arc::new(graph), &config.routing)
        .context("building routing service")?;
    let mut rng = SimRng::new(config.simulation.seed);

    let service_nodes =
        routing.nodes_within_miles(&config.geo.service_area_center, config.geo.service_area_radius_miles);
    if service_nodes.is_empty() {
        bail!(
            "no road nodes within {} miles of service area center {}",
            config.geo.service_area_radius_miles,
            config.geo.service_area_center
        );
    }

    // Initial placement: random nodes near the depot, or the depot's own node.
    let depot_location = config.geo.depot;
    let mut start_nodes =
        routing.nodes_within_miles(&depot_location, config.fleet.initial_spread_radius_miles);
    if start_nodes.is_empty() {
        let depot_node = routing
            .nearest_node(&depot_location)
            .ok_or_else(|| anyhow!("no road node near depot {depot_location}"))?;
        start_nodes.push(depot_node);
    }

    world.insert_resource(SimulationClock::default());
    world.insert_resource(SimTelemetry::default());
    world.insert_resource(SimulationFault::default());
    world.insert_resource(GeoIndex::new(resolution));
    world.insert_resource(VehicleIndex::new());
    world.insert_resource(SimulationEndTimeMs(
        config.simulation.duration_secs.saturating_mul(ONE_SEC_MS),
    ));
    world.insert_resource(ChargingDepot::new(
        config.charging.chargers,
        config.charging.charger_power_kw,
        depot_location,
        resolution,
    ));

    for id in 0..config.fleet.fleet_size {
        let node = start_nodes[rng.0.gen_range(0..start_nodes.len())];
        let position = position_at(&routing, node)
            .with_context(|| format!("placing vehicle {id} at node {node}"))?;
        let vehicle = Vehicle::new(
            id as u32,
            config.fleet.battery_capacity_kwh,
            config.fleet.efficiency_mi_per_kwh,
        );
        spawn_vehicle(world, vehicle, position);
    }

    let arrivals = ExponentialInterArrival::for_fleet(
        config.fleet.utilization,
        config.fleet.fleet_size,
        rng.0.gen(),
    );
    info!(
        "scenario: {} vehicles, {} chargers at {}, one request every {:.2} min, {} service-area nodes",
        config.fleet.fleet_size,
        config.charging.chargers,
        depot_location,
        arrivals.mean_minutes(),
        service_nodes.len()
    );
    world.insert_resource(TripGenerator::new(Box::new(arrivals)));
    world.insert_resource(ServiceArea::new(
        config.geo.service_area_center,
        config.geo.service_area_radius_miles,
        service_nodes,
    ));

    world.insert_resource(config.simulation);
    world.insert_resource(config.pricing);
    world.insert_resource(config.dispatch);
    world.insert_resource(config.behavior);
    world.insert_resource(config.costs);
    world.insert_resource(Routing(Arc::new(routing)));
    world.insert_resource(rng);
    Ok(())
}
