//! Idle loop. Each wake an idle vehicle either heads to the depot (battery low or
//! barely enough to get back), cruises to a neighbouring cell, or waits one time step.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use h3o::CellIndex;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock, ONE_SEC_MS};
use crate::config::{DispatchConfig, SimulationConfig, VehicleBehaviorConfig};
use crate::depot::ChargingDepot;
use crate::ecs::{Position, Vehicle, VehicleState};
use crate::routing::{Routing, RoutingService};
use crate::scenario::SimRng;
use crate::spatial::GeoIndex;
use crate::systems::{drive_ms, position_at, road_miles_or_direct, set_state};
use crate::telemetry::SimTelemetry;

#[allow(clippy::too_many_arguments)]
pub fn vehicle_wake_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut rng: ResMut<SimRng>,
    routing: Res<Routing>,
    geo: Res<GeoIndex>,
    depot: Res<ChargingDepot>,
    (simulation, dispatch, behavior): (
        Res<SimulationConfig>,
        Res<DispatchConfig>,
        Res<VehicleBehaviorConfig>,
    ),
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<(&mut Vehicle, &mut Position)>,
) {
    if event.0.kind != EventKind::VehicleWake {
        return;
    }
    let (Some(entity), Some(token)) = (event.0.vehicle(), event.0.wake_token()) else {
        return;
    };
    let Ok((mut vehicle, mut position)) = vehicles.get_mut(entity) else {
        return;
    };
    if !vehicle.is_current_wake(token) || vehicle.state != VehicleState::Idle {
        debug!("vehicle {}: stale wake {token} ignored", vehicle.id);
        return;
    }

    let now = clock.now();
    let depot_miles = road_miles_or_direct(&routing, &position.location, &depot.location());
    let low_threshold = behavior.low_battery_fraction * vehicle.battery_capacity_kwh;
    let return_energy = vehicle.energy_for_miles(depot_miles) * dispatch.battery_safety_margin;

    if vehicle.battery_kwh() < low_threshold || vehicle.battery_kwh() < return_energy {
        set_state(
            &mut vehicle,
            VehicleState::EnRouteToDepot,
            now,
            position.location,
            &mut telemetry,
        );
        vehicle.next_wake_token();
        vehicle.drive(depot_miles);
        clock.schedule_in(
            drive_ms(depot_miles, behavior.repositioning_speed_mph),
            EventKind::DepotArrival,
            Some(EventSubject::Vehicle(entity)),
        );
        return;
    }

    let mut delay = simulation.time_step_secs * ONE_SEC_MS;
    if rng.0.gen_bool(behavior.reposition_probability) {
        if let Some((target, miles)) = pick_reposition(&routing, &geo, &position, &mut rng.0) {
            if vehicle.energy_for_miles(miles) <= vehicle.battery_kwh() {
                debug!(
                    "vehicle {}: repositioning {:.2} mi to node {}",
                    vehicle.id, miles, target.node
                );
                vehicle.drive(miles);
                *position = target;
                delay = drive_ms(miles, behavior.repositioning_speed_mph) + ONE_SEC_MS;
            }
        }
    }
    schedule_wake(&mut clock, entity, &mut vehicle, delay);
}

fn schedule_wake(clock: &mut SimulationClock, entity: Entity, vehicle: &mut Vehicle, delay_ms: u64) {
    let token = vehicle.next_wake_token();
    clock.schedule_in(
        delay_ms,
        EventKind::VehicleWake,
        Some(EventSubject::Wake(entity, token)),
    );
}

/// A random road node in a random adjacent cell, with the road distance to it.
fn pick_reposition<R: Rng + ?Sized>(
    routing: &RoutingService,
    geo: &GeoIndex,
    position: &Position,
    rng: &mut R,
) -> Option<(Position, f64)> {
    let neighbours: Vec<CellIndex> = geo
        .ring(position.cell, 1)
        .into_iter()
        .filter(|cell| !routing.cells().nodes_in(*cell).is_empty())
        .collect();
    let cell = *neighbours.choose(rng)?;
    let node = routing.random_node_in_cell(cell, rng)?;
    let route = routing.route_between_nodes(position.node, node).ok()?;
    Some((position_at(routing, node)?, route.distance_miles()))
}
