use std::fmt;

use bevy_ecs::prelude::Component;
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::graph::NodeId;
use crate::spatial::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    Idle,
    EnRouteToRider,
    OnTrip,
    EnRouteToDepot,
    InChargerQueue,
    Charging,
}

impl VehicleState {
    pub const ALL: [VehicleState; 6] = [
        VehicleState::Idle,
        VehicleState::EnRouteToRider,
        VehicleState::OnTrip,
        VehicleState::EnRouteToDepot,
        VehicleState::InChargerQueue,
        VehicleState::Charging,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleState::Idle => "idle",
            VehicleState::EnRouteToRider => "en_route_to_rider",
            VehicleState::OnTrip => "on_trip",
            VehicleState::EnRouteToDepot => "en_route_to_depot",
            VehicleState::InChargerQueue => "in_charger_queue",
            VehicleState::Charging => "charging",
        }
    }
}

impl fmt::Display for VehicleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The trip a vehicle is currently serving.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveTrip {
    pub trip_id: u64,
    pub pickup: Location,
    pub dropoff: Location,
    pub trip_miles: f64,
    pub fare: f64,
}

/// A battery-electric vehicle. One per fleet slot, never despawned.
///
/// Battery level is kept within `[0, battery_capacity_kwh]` by every mutator.
#[derive(Debug, Clone, Component)]
pub struct Vehicle {
    pub id: u32,
    pub state: VehicleState,
    pub battery_capacity_kwh: f64,
    pub efficiency_mi_per_kwh: f64,
    battery_kwh: f64,
    pub odometer_miles: f64,
    pub trips_completed: u32,
    pub active_trip: Option<ActiveTrip>,
    /// Bumped whenever the vehicle leaves its idle loop; see [`Vehicle::next_wake_token`].
    pub pending_wake: u64,
    /// Simulation time the vehicle joined the charger queue.
    pub queued_at: Option<u64>,
    /// Simulation time the vehicle was plugged in.
    pub charge_started_at: Option<u64>,
}

impl Vehicle {
    /// A fully charged, idle vehicle.
    pub fn new(id: u32, battery_capacity_kwh: f64, efficiency_mi_per_kwh: f64) -> Self {
        Self {
            id,
            state: VehicleState::Idle,
            battery_capacity_kwh,
            efficiency_mi_per_kwh,
            battery_kwh: battery_capacity_kwh,
            odometer_miles: 0.0,
            trips_completed: 0,
            active_trip: None,
            pending_wake: 0,
            queued_at: None,
            charge_started_at: None,
        }
    }

    pub fn battery_kwh(&self) -> f64 {
        self.battery_kwh
    }

    pub fn set_battery_kwh(&mut self, kwh: f64) {
        self.battery_kwh = kwh.clamp(0.0, self.battery_capacity_kwh);
    }

    pub fn battery_pct(&self) -> f64 {
        if self.battery_capacity_kwh > 0.0 {
            self.battery_kwh / self.battery_capacity_kwh * 100.0
        } else {
            0.0
        }
    }

    pub fn energy_for_miles(&self, miles: f64) -> f64 {
        miles.max(0.0) / self.efficiency_mi_per_kwh
    }

    /// Drive `miles`: deducts `miles / efficiency` kWh (floored at empty) and
    /// advances the odometer. Returns the energy actually drawn.
    pub fn drive(&mut self, miles: f64) -> f64 {
        let miles = miles.max(0.0);
        let before = self.battery_kwh;
        self.set_battery_kwh(before - self.energy_for_miles(miles));
        self.odometer_miles += miles;
        before - self.battery_kwh
    }

    pub fn energy_to_full(&self) -> f64 {
        self.battery_capacity_kwh - self.battery_kwh
    }

    /// Fill the battery. Returns the energy delivered.
    pub fn charge_to_full(&mut self) -> f64 {
        let delivered = self.energy_to_full();
        self.battery_kwh = self.battery_capacity_kwh;
        delivered
    }

    /// Invalidate any outstanding idle wake and return a fresh token.
    pub fn next_wake_token(&mut self) -> u64 {
        self.pending_wake = self.pending_wake.wrapping_add(1);
        self.pending_wake
    }

    /// Whether a wake scheduled with `token` is still current.
    pub fn is_current_wake(&self, token: u64) -> bool {
        self.pending_wake == token
    }
}

/// Where a vehicle is: its snapped graph node, that node's location and H3 cell.
#[derive(Debug, Clone, Copy, PartialEq, Component)]
pub struct Position {
    pub node: NodeId,
    pub location: Location,
    pub cell: CellIndex,
}
