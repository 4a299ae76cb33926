//! Simulation runner: advances the clock and routes events into the ECS.
//!
//! Clock progression and event routing happen here, outside systems. Each step
//! pops the next event from [SimulationClock], inserts it as [CurrentEvent],
//! then runs the schedule. Systems run in a fixed order, so a seeded run is
//! reproducible.

use std::fmt;

use bevy_ecs::prelude::{Res, Resource};
use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};
use log::{error, info};

use crate::clock::{CurrentEvent, Event, EventKind, SimulationClock};
use crate::depot::{ChargingDepot, DepotError};
use crate::scenario::SimulationEndTimeMs;
use crate::systems::{
    charging::{charge_complete_system, depot_arrival_system},
    simulation_started::simulation_started_system,
    trip_progress::{dropoff_reached_system, pickup_reached_system},
    trip_request::trip_request_system,
    vehicle::vehicle_wake_system,
    vehicle_index::update_vehicle_index_system,
};

/// Unrecoverable simulation failure. Aborts the run.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationError {
    Depot(DepotError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Depot(err) => write!(f, "depot fault: {err}"),
        }
    }
}

impl std::error::Error for SimulationError {}

impl From<DepotError> for SimulationError {
    fn from(err: DepotError) -> Self {
        SimulationError::Depot(err)
    }
}

/// First fatal error raised by a system. The runner stops as soon as one is set.
#[derive(Debug, Default, Resource)]
pub struct SimulationFault(Option<SimulationError>);

impl SimulationFault {
    pub fn record(&mut self, err: impl Into<SimulationError>) {
        let err = err.into();
        error!("{err}");
        if self.0.is_none() {
            self.0 = Some(err);
        }
    }

    pub fn error(&self) -> Option<&SimulationError> {
        self.0.as_ref()
    }

    pub fn take(&mut self) -> Option<SimulationError> {
        self.0.take()
    }
}

// Condition functions for each event kind
fn is_simulation_started(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::SimulationStarted)
        .unwrap_or(false)
}

fn is_trip_request(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::TripRequest)
        .unwrap_or(false)
}

fn is_vehicle_wake(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::VehicleWake)
        .unwrap_or(false)
}

fn is_pickup_reached(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::PickupReached)
        .unwrap_or(false)
}

fn is_dropoff_reached(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DropoffReached)
        .unwrap_or(false)
}

fn is_depot_arrival(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::DepotArrival)
        .unwrap_or(false)
}

fn is_charge_complete(event: Option<Res<CurrentEvent>>) -> bool {
    event
        .map(|e| e.0.kind == EventKind::ChargeComplete)
        .unwrap_or(false)
}

/// Runs one simulation step: pops the next event, inserts it as [CurrentEvent], then runs the schedule.
/// Returns `true` if an event was processed, `false` if the clock was empty or if the next event
/// is at or past [SimulationEndTimeMs] (when that resource is present).
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let stop_at = world.get_resource::<SimulationEndTimeMs>().map(|e| e.0);
    let next_ts = world
        .get_resource::<SimulationClock>()
        .and_then(|c| c.next_event_time());
    if let (Some(end_ms), Some(ts)) = (stop_at, next_ts) {
        if ts >= end_ms {
            return false;
        }
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));
    schedule.run(world);
    true
}

/// Runs one simulation step and invokes `hook` after the schedule completes.
pub fn run_next_event_with_hook<F>(world: &mut World, schedule: &mut Schedule, mut hook: F) -> bool
where
    F: FnMut(&World, &Event),
{
    if !run_next_event(world, schedule) {
        return false;
    }
    if let Some(event) = world.get_resource::<CurrentEvent>().map(|e| e.0) {
        hook(world, &event);
    }
    true
}

/// Runs simulation steps until the event queue is empty or `max_steps` is reached.
/// Returns the number of steps executed.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}

/// Runs the whole simulation: steps until the next event reaches [SimulationEndTimeMs],
/// then drops whatever is still queued. Vehicles mid-trip or mid-charge stay where
/// they are.
///
/// Returns the number of events processed, or the first fault a system raised.
pub fn run_until_end(world: &mut World, schedule: &mut Schedule) -> Result<usize, SimulationError> {
    let mut steps = 0;
    while run_next_event(world, schedule) {
        steps += 1;
        if let Some(err) = take_fault(world) {
            return Err(err);
        }
    }
    if let Some(err) = take_fault(world) {
        return Err(err);
    }
    if let Some(depot) = world.get_resource::<ChargingDepot>() {
        depot.check_invariants()?;
    }

    let end_ms = world.get_resource::<SimulationEndTimeMs>().map(|e| e.0);
    let mut clock = world.resource_mut::<SimulationClock>();
    let dropped = end_ms.map(|end| clock.drop_from(end)).unwrap_or(0);
    info!(
        "simulation finished at t={} ms after {steps} events ({dropped} pending events dropped)",
        clock.now()
    );
    Ok(steps)
}

fn take_fault(world: &mut World) -> Option<SimulationError> {
    world
        .get_resource_mut::<SimulationFault>()
        .and_then(|mut fault| fault.take())
}

/// Builds the default simulation schedule: every event-reacting system gated on its
/// event kind, then [apply_deferred], then the vehicle index refresh.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();

    schedule.add_systems(
        (
            simulation_started_system.run_if(is_simulation_started),
            trip_request_system.run_if(is_trip_request),
            vehicle_wake_system.run_if(is_vehicle_wake),
            pickup_reached_system.run_if(is_pickup_reached),
            dropoff_reached_system.run_if(is_dropoff_reached),
            depot_arrival_system.run_if(is_depot_arrival),
            charge_complete_system.run_if(is_charge_complete),
            apply_deferred,
            // Runs on every event to keep dispatch candidates in their current cells.
            update_vehicle_index_system,
        )
            .chain(),
    );

    schedule
}

/// Initializes the simulation by scheduling the SimulationStarted event at time 0.
/// Call this after building the scenario and before running events.
pub fn initialize_simulation(world: &mut World) {
    let mut clock = world.resource_mut::<SimulationClock>();
    clock.schedule_at(0, EventKind::SimulationStarted, None);
}
