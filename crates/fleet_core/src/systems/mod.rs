//! Event-driven systems. Each reacts to one [`crate::clock::EventKind`] and is gated on
//! it in [`crate::runner::simulation_schedule`].

pub mod charging;
pub mod simulation_started;
pub mod trip_progress;
pub mod trip_request;
pub mod vehicle;
pub mod vehicle_index;

use log::{debug, warn};

use crate::clock::hours_to_ms;
use crate::ecs::{Position, Vehicle, VehicleState};
use crate::graph::NodeId;
use crate::routing::RoutingService;
use crate::spatial::{haversine_miles, Location};
use crate::telemetry::{SimTelemetry, VehicleStateRecord};

/// The [`Position`] of a graph node.
pub fn position_at(routing: &RoutingService, node: NodeId) -> Option<Position> {
    Some(Position {
        node,
        location: routing.node_location(node)?,
        cell: routing.node_cell(node)?,
    })
}

/// Snap a location to its nearest graph node.
pub fn snap_to_road(routing: &RoutingService, location: &Location) -> Option<Position> {
    position_at(routing, routing.nearest_node(location)?)
}

/// Move to the road node nearest `target`. Leaves the position alone when nothing snaps.
pub(crate) fn move_to(routing: &RoutingService, position: &mut Position, target: &Location) {
    if let Some(snapped) = snap_to_road(routing, target) {
        *position = snapped;
    }
}

/// Change state and record the transition. No-op when the state is unchanged.
pub(crate) fn set_state(
    vehicle: &mut Vehicle,
    new_state: VehicleState,
    now: u64,
    location: Location,
    telemetry: &mut SimTelemetry,
) {
    let old_state = vehicle.state;
    if old_state == new_state {
        return;
    }
    vehicle.state = new_state;
    debug!(
        "t={now} vehicle {} {old_state} -> {new_state} | battery {:.1}% | {:.1} mi | {} trips",
        vehicle.id,
        vehicle.battery_pct(),
        vehicle.odometer_miles,
        vehicle.trips_completed
    );
    telemetry.vehicle_states.push(VehicleStateRecord {
        timestamp: now,
        vehicle_id: vehicle.id,
        old_state,
        new_state,
        battery_pct: vehicle.battery_pct(),
        odometer_miles: vehicle.odometer_miles,
        trips_completed: vehicle.trips_completed,
        location,
    });
}

/// Virtual time to drive `miles` at `speed_mph`.
pub(crate) fn drive_ms(miles: f64, speed_mph: f64) -> u64 {
    if speed_mph <= 0.0 {
        return 0;
    }
    hours_to_ms(miles / speed_mph)
}

/// Road distance in miles, or great-circle distance when the road graph has no route.
pub(crate) fn road_miles_or_direct(routing: &RoutingService, from: &Location, to: &Location) -> f64 {
    match routing.shortest_path(from, to) {
        Ok(route) => route.distance_miles(),
        Err(err) => {
            warn!("{err}; using great-circle distance {from} -> {to}");
            haversine_miles(from, to)
        }
    }
}
