//! Telemetry: vehicle state changes, completed charges and trip outcomes, each
//! stamped with virtual time.

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::dispatch::UnfulfilledReason;
use crate::ecs::VehicleState;
use crate::spatial::Location;

/// One vehicle state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleStateRecord {
    pub timestamp: u64,
    pub vehicle_id: u32,
    pub old_state: VehicleState,
    pub new_state: VehicleState,
    pub battery_pct: f64,
    pub odometer_miles: f64,
    pub trips_completed: u32,
    pub location: Location,
}

/// One completed charge, recorded when the vehicle unplugs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChargingRecord {
    pub timestamp: u64,
    pub vehicle_id: u32,
    pub energy_delivered_kwh: f64,
    pub charge_duration_ms: u64,
    pub queue_wait_ms: u64,
    pub depot_total_energy_kwh: f64,
    /// Chargers in use after this vehicle unplugged and the queue head plugged in.
    pub chargers_in_use: usize,
    pub vehicles_queued: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Requested,
    Assigned,
    Unfulfilled,
}

/// One trip request and its outcome.
///
/// Created as `Requested` and finalized exactly once: either assigned (vehicle id
/// set) or unfulfilled (reason set, fare counted as missed revenue).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripRecord {
    pub trip_id: u64,
    pub requested_at: u64,
    pub origin: Location,
    pub destination: Location,
    pub distance_miles: f64,
    pub surge_multiplier: f64,
    pub fare: f64,
    pub status: TripStatus,
    pub vehicle_id: Option<u32>,
    pub reason: Option<UnfulfilledReason>,
    pub pickup_miles: Option<f64>,
    pub pickup_minutes: Option<f64>,
    pub missed_revenue: f64,
    /// Battery of the nearest vehicle when it could not cover the trip.
    pub battery_kwh: Option<f64>,
    pub energy_required_kwh: Option<f64>,
    pub completed_at: Option<u64>,
}

impl TripRecord {
    pub fn requested(
        trip_id: u64,
        requested_at: u64,
        origin: Location,
        destination: Location,
        distance_miles: f64,
        surge_multiplier: f64,
        fare: f64,
    ) -> Self {
        Self {
            trip_id,
            requested_at,
            origin,
            destination,
            distance_miles,
            surge_multiplier,
            fare,
            status: TripStatus::Requested,
            vehicle_id: None,
            reason: None,
            pickup_miles: None,
            pickup_minutes: None,
            missed_revenue: 0.0,
            battery_kwh: None,
            energy_required_kwh: None,
            completed_at: None,
        }
    }

    pub fn assign(mut self, vehicle_id: u32, pickup_miles: f64, pickup_minutes: f64) -> Self {
        debug_assert_eq!(self.status, TripStatus::Requested, "trip finalized twice");
        self.status = TripStatus::Assigned;
        self.vehicle_id = Some(vehicle_id);
        self.pickup_miles = Some(pickup_miles);
        self.pickup_minutes = Some(pickup_minutes);
        self
    }

    pub fn unfulfilled(mut self, reason: UnfulfilledReason) -> Self {
        debug_assert_eq!(self.status, TripStatus::Requested, "trip finalized twice");
        self.status = TripStatus::Unfulfilled;
        self.reason = Some(reason);
        self.missed_revenue = self.fare;
        self
    }

    pub fn with_nearest_pickup(mut self, pickup_miles: f64, pickup_minutes: f64) -> Self {
        self.pickup_miles = Some(pickup_miles);
        self.pickup_minutes = Some(pickup_minutes);
        self
    }

    pub fn with_battery_shortfall(mut self, battery_kwh: f64, energy_required_kwh: f64) -> Self {
        self.battery_kwh = Some(battery_kwh);
        self.energy_required_kwh = Some(energy_required_kwh);
        self
    }

    /// Exactly one of vehicle id or reason is set, matching the status.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            TripStatus::Requested => false,
            TripStatus::Assigned => self.vehicle_id.is_some() && self.reason.is_none(),
            TripStatus::Unfulfilled => self.vehicle_id.is_none() && self.reason.is_some(),
        }
    }
}

/// Collects simulation telemetry. Insert as a resource to record a run.
#[derive(Debug, Default, Resource)]
pub struct SimTelemetry {
    pub vehicle_states: Vec<VehicleStateRecord>,
    pub charging: Vec<ChargingRecord>,
    /// Indexed by trip id.
    pub trips: Vec<TripRecord>,
}

impl SimTelemetry {
    pub fn next_trip_id(&self) -> u64 {
        self.trips.len() as u64
    }

    pub fn record_trip(&mut self, record: TripRecord) {
        debug_assert_eq!(record.trip_id, self.next_trip_id());
        self.trips.push(record);
    }

    pub fn mark_trip_completed(&mut self, trip_id: u64, at: u64) {
        if let Some(trip) = self.trips.get_mut(trip_id as usize) {
            trip.completed_at = Some(at);
        }
    }

    pub fn trips_with_status(&self, status: TripStatus) -> impl Iterator<Item = &TripRecord> + '_ {
        self.trips.iter().filter(move |t| t.status == status)
    }

    /// State changes of one vehicle, in time order.
    pub fn vehicle_history(&self, vehicle_id: u32) -> impl Iterator<Item = &VehicleStateRecord> + '_ {
        self.vehicle_states
            .iter()
            .filter(move |r| r.vehicle_id == vehicle_id)
    }
}
