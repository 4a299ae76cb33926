use bevy_ecs::prelude::{Query, Res, ResMut};
use log::warn;

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock, ONE_SEC_MS};
use crate::config::VehicleBehaviorConfig;
use crate::ecs::{ActiveTrip, Position, Vehicle, VehicleState};
use crate::routing::Routing;
use crate::systems::{drive_ms, move_to, set_state};
use crate::telemetry::SimTelemetry;

/// Rider on board: drive the trip and schedule the dropoff.
pub fn pickup_reached_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    routing: Res<Routing>,
    behavior: Res<VehicleBehaviorConfig>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<(&mut Vehicle, &mut Position)>,
) {
    if event.0.kind != EventKind::PickupReached {
        return;
    }
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok((mut vehicle, mut position)) = vehicles.get_mut(entity) else {
        return;
    };
    let Some(trip) = expect_trip(&vehicle, VehicleState::EnRouteToRider) else {
        return;
    };

    let now = clock.now();
    move_to(&routing, &mut position, &trip.pickup);
    set_state(&mut vehicle, VehicleState::OnTrip, now, position.location, &mut telemetry);
    vehicle.drive(trip.trip_miles);

    let delay = drive_ms(trip.trip_miles, behavior.trip_speed_mph)
        + behavior.dropoff_delay_secs * ONE_SEC_MS;
    clock.schedule_in(delay, EventKind::DropoffReached, Some(EventSubject::Vehicle(entity)));
}

/// Trip done: the vehicle is idle at the dropoff and re-enters its idle loop now.
pub fn dropoff_reached_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    routing: Res<Routing>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<(&mut Vehicle, &mut Position)>,
) {
    if event.0.kind != EventKind::DropoffReached {
        return;
    }
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok((mut vehicle, mut position)) = vehicles.get_mut(entity) else {
        return;
    };
    let Some(trip) = expect_trip(&vehicle, VehicleState::OnTrip) else {
        return;
    };

    let now = clock.now();
    move_to(&routing, &mut position, &trip.dropoff);
    vehicle.trips_completed += 1;
    vehicle.active_trip = None;
    set_state(&mut vehicle, VehicleState::Idle, now, position.location, &mut telemetry);
    telemetry.mark_trip_completed(trip.trip_id, now);

    let token = vehicle.next_wake_token();
    clock.schedule_at(now, EventKind::VehicleWake, Some(EventSubject::Wake(entity, token)));
}

fn expect_trip(vehicle: &Vehicle, state: VehicleState) -> Option<ActiveTrip> {
    if vehicle.state != state {
        warn!(
            "vehicle {}: trip event while {} (expected {state})",
            vehicle.id, vehicle.state
        );
        return None;
    }
    if vehicle.active_trip.is_none() {
        warn!("vehicle {}: {state} without an active trip", vehicle.id);
    }
    vehicle.active_trip
}
