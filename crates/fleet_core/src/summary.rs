//! Run summary: trip outcomes, fleet usage, charging and operating income.

use std::collections::BTreeMap;

use bevy_ecs::prelude::World;
use serde::Serialize;

use crate::clock::{ONE_HOUR_MS, ONE_MIN_MS};
use crate::config::CostConfig;
use crate::depot::ChargingDepot;
use crate::dispatch::UnfulfilledReason;
use crate::ecs::{Vehicle, VehicleState};
use crate::scenario::SimulationEndTimeMs;
use crate::telemetry::{SimTelemetry, TripStatus};

/// Aggregated results of a single simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSummary {
    pub duration_hours: f64,
    pub fleet_size: usize,
    pub trips_requested: usize,
    pub trips_assigned: usize,
    /// Assigned trips whose dropoff happened before the run ended.
    pub trips_completed: usize,
    pub trips_unfulfilled: usize,
    pub unfulfilled_by_reason: BTreeMap<UnfulfilledReason, usize>,
    /// Assigned / requested.
    pub fulfillment_rate: f64,
    /// Fares of completed trips.
    pub revenue: f64,
    /// Fares of unfulfilled requests.
    pub missed_revenue: f64,
    pub total_fleet_miles: f64,
    /// Number of transitions into each state.
    pub state_transitions: BTreeMap<VehicleState, usize>,
    pub energy_delivered_kwh: f64,
    pub charge_events: u64,
    pub avg_charge_minutes: f64,
    pub avg_queue_wait_minutes: f64,
    /// Charger busy time over charger-hours available.
    pub charger_utilization: f64,
    pub energy_cost: f64,
    pub maintenance_cost: f64,
    pub operating_income: f64,
    /// Operating income over revenue, 0 without revenue.
    pub operating_margin: f64,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

impl FleetSummary {
    /// Summarize a finished world. Missing resources count as empty.
    pub fn from_world(world: &mut World) -> Self {
        let (fleet_size, total_fleet_miles) = {
            let mut query = world.query::<&Vehicle>();
            query
                .iter(world)
                .fold((0usize, 0.0), |(n, miles), v| (n + 1, miles + v.odometer_miles))
        };
        let duration_ms = world
            .get_resource::<SimulationEndTimeMs>()
            .map(|end| end.0)
            .unwrap_or(0);
        let costs = world.get_resource::<CostConfig>().cloned().unwrap_or_default();

        let empty = SimTelemetry::default();
        let telemetry = world.get_resource::<SimTelemetry>().unwrap_or(&empty);

        let trips_requested = telemetry.trips.len();
        let trips_assigned = telemetry.trips_with_status(TripStatus::Assigned).count();
        let completed: Vec<_> = telemetry
            .trips_with_status(TripStatus::Assigned)
            .filter(|t| t.completed_at.is_some())
            .collect();
        let revenue: f64 = completed.iter().map(|t| t.fare).sum();

        let mut unfulfilled_by_reason = BTreeMap::new();
        let mut missed_revenue = 0.0;
        for trip in telemetry.trips_with_status(TripStatus::Unfulfilled) {
            if let Some(reason) = trip.reason {
                *unfulfilled_by_reason.entry(reason).or_insert(0) += 1;
            }
            missed_revenue += trip.missed_revenue;
        }
        let trips_unfulfilled: usize = unfulfilled_by_reason.values().sum();

        let mut state_transitions = BTreeMap::new();
        for record in &telemetry.vehicle_states {
            *state_transitions.entry(record.new_state).or_insert(0) += 1;
        }

        let avg_charge_minutes = mean(
            telemetry
                .charging
                .iter()
                .map(|c| c.charge_duration_ms as f64 / ONE_MIN_MS as f64),
        );
        let avg_queue_wait_minutes = mean(
            telemetry
                .charging
                .iter()
                .map(|c| c.queue_wait_ms as f64 / ONE_MIN_MS as f64),
        );

        let (energy_delivered_kwh, charge_events, charger_utilization) =
            match world.get_resource::<ChargingDepot>() {
                Some(depot) => {
                    let available_ms = depot.capacity() as f64 * duration_ms as f64;
                    let utilization = if available_ms > 0.0 {
                        depot.charger_busy_ms() as f64 / available_ms
                    } else {
                        0.0
                    };
                    (depot.energy_delivered_kwh(), depot.charge_events(), utilization)
                }
                None => (0.0, 0, 0.0),
            };

        let energy_cost = energy_delivered_kwh * costs.energy_price_per_kwh;
        let maintenance_cost =
            total_fleet_miles * (costs.vehicle_capex_per_mile + costs.battery_capex_per_mile);
        let operating_income = revenue - energy_cost - maintenance_cost;

        Self {
            duration_hours: duration_ms as f64 / ONE_HOUR_MS as f64,
            fleet_size,
            trips_requested,
            trips_assigned,
            trips_completed: completed.len(),
            trips_unfulfilled,
            unfulfilled_by_reason,
            fulfillment_rate: if trips_requested > 0 {
                trips_assigned as f64 / trips_requested as f64
            } else {
                0.0
            },
            revenue,
            missed_revenue,
            total_fleet_miles,
            state_transitions,
            energy_delivered_kwh,
            charge_events,
            avg_charge_minutes,
            avg_queue_wait_minutes,
            charger_utilization,
            energy_cost,
            maintenance_cost,
            operating_income,
            operating_margin: if revenue > 0.0 {
                operating_income / revenue
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::spatial::Location;
    use crate::telemetry::{ChargingRecord, TripRecord, VehicleStateRecord};

    fn trip(id: u64, fare: f64) -> TripRecord {
        let here = Location::new(41.08, -81.52);
        TripRecord::requested(id, id * 1000, here, here, 2.0, 1.0, fare)
    }

    #[test]
    fn summarizes_trips_charging_and_costs() {
        let mut world = World::new();
        world.insert_resource(SimulationEndTimeMs(2 * ONE_HOUR_MS));
        world.insert_resource(CostConfig {
            energy_price_per_kwh: 0.2,
            vehicle_capex_per_mile: 0.1,
            battery_capex_per_mile: 0.05,
        });

        let mut vehicle = Vehicle::new(0, 60.0, 4.0);
        vehicle.odometer_miles = 100.0;
        world.spawn(vehicle);

        let mut depot = ChargingDepot::new(1, 50.0, Location::new(41.08, -81.52), h3o::Resolution::Eight);
        depot.record_charge(50.0, ONE_HOUR_MS);
        world.insert_resource(depot);

        let mut telemetry = SimTelemetry::default();
        let mut completed = trip(0, 20.0).assign(0, 1.0, 2.0);
        completed.completed_at = Some(5000);
        telemetry.record_trip(completed);
        telemetry.record_trip(trip(1, 15.0).assign(0, 1.0, 2.0));
        telemetry.record_trip(trip(2, 10.0).unfulfilled(UnfulfilledReason::NoAvailableVehicles));
        telemetry.record_trip(trip(3, 8.0).unfulfilled(UnfulfilledReason::NoAvailableVehicles));
        telemetry.record_trip(trip(4, 6.0).unfulfilled(UnfulfilledReason::InsufficientBattery));
        telemetry.vehicle_states.push(VehicleStateRecord {
            timestamp: 0,
            vehicle_id: 0,
            old_state: VehicleState::Idle,
            new_state: VehicleState::EnRouteToRider,
            battery_pct: 100.0,
            odometer_miles: 0.0,
            trips_completed: 0,
            location: Location::new(41.08, -81.52),
        });
        telemetry.charging.push(ChargingRecord {
            timestamp: ONE_HOUR_MS,
            vehicle_id: 0,
            energy_delivered_kwh: 50.0,
            charge_duration_ms: ONE_HOUR_MS,
            queue_wait_ms: 30 * ONE_MIN_MS,
            depot_total_energy_kwh: 50.0,
            chargers_in_use: 0,
            vehicles_queued: 0,
        });
        world.insert_resource(telemetry);

        let summary = FleetSummary::from_world(&mut world);
        assert_eq!(summary.fleet_size, 1);
        assert_eq!(summary.trips_requested, 5);
        assert_eq!(summary.trips_assigned, 2);
        assert_eq!(summary.trips_completed, 1);
        assert_eq!(summary.trips_unfulfilled, 3);
        assert_eq!(
            summary.unfulfilled_by_reason.get(&UnfulfilledReason::NoAvailableVehicles),
            Some(&2)
        );
        assert_eq!(summary.state_transitions.get(&VehicleState::EnRouteToRider), Some(&1));
        assert!((summary.fulfillment_rate - 0.4).abs() < 1e-9);
        assert!((summary.revenue - 20.0).abs() < 1e-9);
        assert!((summary.missed_revenue - 24.0).abs() < 1e-9);
        assert!((summary.avg_charge_minutes - 60.0).abs() < 1e-9);
        assert!((summary.avg_queue_wait_minutes - 30.0).abs() < 1e-9);
        assert!((summary.charger_utilization - 0.5).abs() < 1e-9);
        assert!((summary.energy_cost - 10.0).abs() < 1e-9);
        assert!((summary.maintenance_cost - 15.0).abs() < 1e-9);
        assert!((summary.operating_income + 5.0).abs() < 1e-9);
        assert!((summary.operating_margin + 0.25).abs() < 1e-9);
    }

    #[test]
    fn empty_world_summarizes_to_zero() {
        let mut world = World::new();
        let summary = FleetSummary::from_world(&mut world);
        assert_eq!(summary.trips_requested, 0);
        assert_eq!(summary.fulfillment_rate, 0.0);
        assert_eq!(summary.operating_margin, 0.0);
        assert!(summary.unfulfilled_by_reason.is_empty());
    }

    #[test]
    fn serializes_reason_keys_as_strings() {
        let mut world = World::new();
        let mut telemetry = SimTelemetry::default();
        telemetry.record_trip(trip(0, 5.0).unfulfilled(UnfulfilledReason::NoRoute));
        world.insert_resource(telemetry);

        let json = serde_json::to_string(&FleetSummary::from_world(&mut world)).expect("json");
        assert!(json.contains("\"no_route\":1"));
    }
}
