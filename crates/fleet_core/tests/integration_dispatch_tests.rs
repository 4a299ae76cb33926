mod support;

use bevy_ecs::prelude::{IntoSystemConfigs, Schedule, World};
use fleet_core::clock::{EventKind, SimulationClock};
use fleet_core::config::DispatchConfig;
use fleet_core::dispatch::UnfulfilledReason;
use fleet_core::ecs::{Position, Vehicle, VehicleState};
use fleet_core::routing::Routing;
use fleet_core::spatial::Location;
use fleet_core::systems::position_at;
use fleet_core::systems::trip_request::trip_request_system;
use fleet_core::systems::vehicle_index::update_vehicle_index_system;
use fleet_core::telemetry::{SimTelemetry, TripRecord, TripStatus};
use fleet_core::test_helpers::{fire_event, grid_location};
use support::graph::bridged_clusters;
use support::world::{vehicles_by_id, TestWorldBuilder, SPACING};

/// Roughly 20 miles of latitude.
const NORTH_OFFSET_DEG: f64 = 0.2895;

/// Requests come from the south grid; the depot and the whole fleet start in the
/// north grid, about 20 miles away.
fn split_world() -> World {
    let south_center = grid_location(1, 1, SPACING);
    let north_center = Location::new(south_center.lat + NORTH_OFFSET_DEG, south_center.lon);
    TestWorldBuilder::new()
        .with_graph(bridged_clusters(3, SPACING, NORTH_OFFSET_DEG))
        .configure(|c| {
            c.geo.service_area_center = south_center;
            c.geo.service_area_radius_miles = 0.5;
            c.geo.depot = north_center;
            c.fleet.initial_spread_radius_miles = 0.5;
            c.dispatch = DispatchConfig::new(15.0);
            c.behavior.repositioning_speed_mph = 25.0;
        })
        .build()
}

fn request_once(world: &mut World) -> TripRecord {
    let mut schedule = Schedule::default();
    schedule.add_systems((update_vehicle_index_system, trip_request_system).chain());
    fire_event(world, &mut schedule, EventKind::TripRequest, None);
    let telemetry = world.resource::<SimTelemetry>();
    assert_eq!(telemetry.trips.len(), 1);
    telemetry.trips[0].clone()
}

/// Drop vehicle 0 onto the south grid's center node with `battery_kwh` left.
fn move_first_vehicle_south(world: &mut World, battery_kwh: f64) {
    let entity = vehicles_by_id(world)[0];
    let position = position_at(&world.resource::<Routing>(), 4).expect("south center node");
    *world.get_mut::<Position>(entity).expect("position") = position;
    world
        .get_mut::<Vehicle>(entity)
        .expect("vehicle")
        .set_battery_kwh(battery_kwh);
}

#[test]
fn fleet_far_outside_search_window_breaks_sla() {
    let mut world = split_world();
    let trip = request_once(&mut world);

    assert_eq!(trip.status, TripStatus::Unfulfilled);
    assert_eq!(trip.reason, Some(UnfulfilledReason::ExcessivePickupTime));
    let pickup_miles = trip.pickup_miles.expect("nearest pickup recorded");
    let pickup_minutes = trip.pickup_minutes.expect("pickup time recorded");
    assert!((19.0..21.0).contains(&pickup_miles), "got {pickup_miles}");
    // 20 miles at 25 mph is 48 minutes against a 15 minute SLA.
    assert!((pickup_minutes - pickup_miles / 25.0 * 60.0).abs() < 1e-9);
    assert!(pickup_minutes > 45.0);
    assert_eq!(trip.missed_revenue, trip.fare);

    assert!(world.resource::<SimTelemetry>().vehicle_states.is_empty());
    let mut clock = world.resource_mut::<SimulationClock>();
    let pending: Vec<_> = std::iter::from_fn(|| clock.pop_next()).map(|e| e.kind).collect();
    assert_eq!(pending, vec![EventKind::TripRequest]);
}

#[test]
fn nearby_vehicle_without_range_to_depot_is_rejected() {
    let mut world = split_world();
    move_first_vehicle_south(&mut world, 4.0);
    let trip = request_once(&mut world);

    assert_eq!(trip.reason, Some(UnfulfilledReason::InsufficientBattery));
    assert_eq!(trip.battery_kwh, Some(4.0));
    // The return leg alone is about 20 road miles, 5 kWh at 4 mi/kWh.
    let required = trip.energy_required_kwh.expect("requirement recorded");
    assert!(required > 5.0, "got {required}");
    assert!(trip.pickup_miles.expect("pickup") < 1.0);
    assert!(trip.pickup_minutes.expect("pickup") < 15.0);
}

#[test]
fn nearby_charged_vehicle_is_assigned() {
    let mut world = split_world();
    move_first_vehicle_south(&mut world, 60.0);
    let trip = request_once(&mut world);

    assert_eq!(trip.status, TripStatus::Assigned);
    assert_eq!(trip.vehicle_id, Some(0));
    let entity = vehicles_by_id(&mut world)[0];
    assert_eq!(
        world.get::<Vehicle>(entity).expect("vehicle").state,
        VehicleState::EnRouteToRider
    );
}

#[test]
fn busy_fleet_reports_no_available_vehicles() {
    let mut world = split_world();
    for entity in vehicles_by_id(&mut world) {
        world.get_mut::<Vehicle>(entity).expect("vehicle").state = VehicleState::OnTrip;
    }
    let trip = request_once(&mut world);
    assert_eq!(trip.reason, Some(UnfulfilledReason::NoAvailableVehicles));
    assert!(trip.pickup_miles.is_none());
}
