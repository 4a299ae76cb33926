//! Trip generator and dispatcher: one request per `TripRequest` event.
//!
//! Each request draws origin and destination from the service area, prices the
//! road distance, then either assigns the nearest feasible idle vehicle or records
//! why it could not. The next request is scheduled first, so a failed request
//! never stalls the arrival process.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use log::{debug, warn};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock, ONE_SEC_MS};
use crate::config::{DispatchConfig, VehicleBehaviorConfig};
use crate::depot::ChargingDepot;
use crate::dispatch::{
    evaluate, find_nearest_vehicle, nearest_anywhere, Feasibility, TripGenerator, UnfulfilledReason,
    Verdict,
};
use crate::ecs::{ActiveTrip, Position, Vehicle, VehicleState};
use crate::pricing::PricingConfig;
use crate::routing::Routing;
use crate::scenario::{ServiceArea, SimRng};
use crate::spatial::{GeoIndex, VehicleIndex};
use crate::systems::{drive_ms, road_miles_or_direct, set_state};
use crate::telemetry::{SimTelemetry, TripRecord};

#[allow(clippy::too_many_arguments)]
pub fn trip_request_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut generator: ResMut<TripGenerator>,
    mut rng: ResMut<SimRng>,
    routing: Res<Routing>,
    geo: Res<GeoIndex>,
    vehicle_index: Res<VehicleIndex>,
    area: Res<ServiceArea>,
    depot: Res<ChargingDepot>,
    (pricing, dispatch, behavior): (Res<PricingConfig>, Res<DispatchConfig>, Res<VehicleBehaviorConfig>),
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<(Entity, &mut Vehicle, &Position)>,
) {
    if event.0.kind != EventKind::TripRequest {
        return;
    }
    let now = clock.now();
    if let Some(gap) = generator.next_gap_ms() {
        clock.schedule_in(gap, EventKind::TripRequest, None);
    }

    let (Some(origin_node), Some(destination_node)) =
        (area.random_node(&mut rng.0), area.random_node(&mut rng.0))
    else {
        return;
    };
    let (Some(origin), Some(destination)) = (
        routing.node_location(origin_node),
        routing.node_location(destination_node),
    ) else {
        return;
    };

    let trip_id = telemetry.next_trip_id();
    let surge = pricing.surge_multiplier(now);

    let route = match routing.shortest_path(&origin, &destination) {
        Ok(route) => route,
        Err(err) => {
            warn!("trip {trip_id}: {err}");
            let fare = pricing.calculate_trip_fare(0.0, now);
            let record = TripRecord::requested(trip_id, now, origin, destination, 0.0, surge, fare)
                .unfulfilled(UnfulfilledReason::NoRoute);
            telemetry.record_trip(record);
            return;
        }
    };
    let trip_miles = route.distance_miles();
    let fare = pricing.calculate_trip_fare(trip_miles, now);
    let record = TripRecord::requested(trip_id, now, origin, destination, trip_miles, surge, fare);

    // Ring search around the origin first; only a fleet with nobody idle at all
    // leaves the request without a candidate.
    let candidate = find_nearest_vehicle(&geo, &vehicle_index, &origin, &dispatch, |entity| {
        vehicles
            .get(entity)
            .ok()
            .filter(|(_, v, _)| v.state == VehicleState::Idle)
            .map(|(_, v, p)| (v.id, p.location))
    })
    .or_else(|| {
        nearest_anywhere(
            &origin,
            vehicles
                .iter()
                .filter(|(_, v, _)| v.state == VehicleState::Idle)
                .map(|(entity, v, p)| (entity, v.id, p.location)),
        )
    });
    let Some(candidate) = candidate else {
        telemetry.record_trip(record.unfulfilled(UnfulfilledReason::NoAvailableVehicles));
        return;
    };

    let Ok((_, mut vehicle, position)) = vehicles.get_mut(candidate.entity) else {
        telemetry.record_trip(record.unfulfilled(UnfulfilledReason::NoAvailableVehicles));
        return;
    };

    let return_miles = road_miles_or_direct(&routing, &destination, &depot.location());
    let verdict = evaluate(
        &dispatch,
        behavior.repositioning_speed_mph,
        &Feasibility {
            pickup_miles: candidate.pickup_miles,
            trip_miles,
            return_miles,
            battery_kwh: vehicle.battery_kwh(),
            efficiency_mi_per_kwh: vehicle.efficiency_mi_per_kwh,
        },
    );

    let record = match verdict {
        Verdict::ExcessivePickupTime { pickup_minutes } => record
            .with_nearest_pickup(candidate.pickup_miles, pickup_minutes)
            .unfulfilled(UnfulfilledReason::ExcessivePickupTime),
        Verdict::InsufficientBattery {
            pickup_minutes,
            energy_required_kwh,
        } => record
            .with_nearest_pickup(candidate.pickup_miles, pickup_minutes)
            .with_battery_shortfall(vehicle.battery_kwh(), energy_required_kwh)
            .unfulfilled(UnfulfilledReason::InsufficientBattery),
        Verdict::Assign { pickup_minutes } => {
            let trip = ActiveTrip {
                trip_id,
                pickup: origin,
                dropoff: destination,
                trip_miles,
                fare,
            };
            start_trip(
                &mut clock,
                &routing,
                &behavior,
                &mut telemetry,
                candidate.entity,
                &mut vehicle,
                position,
                trip,
            );
            debug!(
                "trip {trip_id}: vehicle {} assigned, pickup {:.2} mi / {:.1} min, fare {:.2}",
                vehicle.id, candidate.pickup_miles, pickup_minutes, fare
            );
            record.assign(vehicle.id, candidate.pickup_miles, pickup_minutes)
        }
    };
    telemetry.record_trip(record);
}

/// Send an idle vehicle to the rider. Energy for the approach is drawn now; the
/// pickup fires after the drive plus the pickup delay.
#[allow(clippy::too_many_arguments)]
fn start_trip(
    clock: &mut SimulationClock,
    routing: &Routing,
    behavior: &VehicleBehaviorConfig,
    telemetry: &mut SimTelemetry,
    entity: Entity,
    vehicle: &mut Vehicle,
    position: &Position,
    trip: ActiveTrip,
) {
    let now = clock.now();
    let approach_miles = road_miles_or_direct(routing, &position.location, &trip.pickup);

    set_state(vehicle, VehicleState::EnRouteToRider, now, position.location, telemetry);
    vehicle.next_wake_token();
    vehicle.drive(approach_miles);
    vehicle.active_trip = Some(trip);

    let delay = drive_ms(approach_miles, behavior.repositioning_speed_mph)
        + behavior.pickup_delay_secs * ONE_SEC_MS;
    clock.schedule_in(delay, EventKind::PickupReached, Some(EventSubject::Vehicle(entity)));
}
