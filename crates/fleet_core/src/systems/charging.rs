use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use log::{debug, warn};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::depot::{Admission, ChargingDepot};
use crate::ecs::{Position, Vehicle, VehicleState};
use crate::routing::Routing;
use crate::runner::SimulationFault;
use crate::systems::{move_to, set_state};
use crate::telemetry::{ChargingRecord, SimTelemetry};

/// Vehicle reaches the depot: plug in if a charger is free, otherwise join the queue.
#[allow(clippy::too_many_arguments)]
pub fn depot_arrival_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    routing: Res<Routing>,
    mut depot: ResMut<ChargingDepot>,
    mut fault: ResMut<SimulationFault>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<(&mut Vehicle, &mut Position)>,
) {
    if event.0.kind != EventKind::DepotArrival {
        return;
    }
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok((mut vehicle, mut position)) = vehicles.get_mut(entity) else {
        return;
    };
    if vehicle.state != VehicleState::EnRouteToDepot {
        warn!("vehicle {}: depot arrival while {}", vehicle.id, vehicle.state);
        return;
    }

    let now = clock.now();
    move_to(&routing, &mut position, &depot.location());
    set_state(
        &mut vehicle,
        VehicleState::InChargerQueue,
        now,
        position.location,
        &mut telemetry,
    );
    vehicle.queued_at = Some(now);

    match depot.request(entity, now) {
        Ok(Admission::Charging) => start_charging(
            &mut clock,
            &depot,
            &mut telemetry,
            entity,
            &mut vehicle,
            &position,
        ),
        Ok(Admission::Queued { position: place }) => {
            debug!(
                "vehicle {}: queued at depot, {place} ahead, {} chargers busy",
                vehicle.id,
                depot.in_use()
            );
        }
        Err(err) => fault.record(err),
    }
}

/// A charge finished: free the charger, hand it to the head of the queue and send
/// the charged vehicle back into its idle loop.
#[allow(clippy::too_many_arguments)]
pub fn charge_complete_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut depot: ResMut<ChargingDepot>,
    mut fault: ResMut<SimulationFault>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<(&mut Vehicle, &mut Position)>,
) {
    if event.0.kind != EventKind::ChargeComplete {
        return;
    }
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let now = clock.now();

    let next = {
        let Ok((mut vehicle, position)) = vehicles.get_mut(entity) else {
            return;
        };
        if vehicle.state != VehicleState::Charging {
            warn!("vehicle {}: charge complete while {}", vehicle.id, vehicle.state);
            return;
        }

        let started = vehicle.charge_started_at.unwrap_or(now);
        let queued = vehicle.queued_at.unwrap_or(started);
        let energy = vehicle.charge_to_full();
        let duration = now.saturating_sub(started);
        depot.record_charge(energy, duration);

        let next = match depot.release(entity) {
            Ok(next) => next,
            Err(err) => {
                fault.record(err);
                None
            }
        };

        vehicle.queued_at = None;
        vehicle.charge_started_at = None;
        set_state(&mut vehicle, VehicleState::Idle, now, position.location, &mut telemetry);
        let token = vehicle.next_wake_token();
        clock.schedule_at(now, EventKind::VehicleWake, Some(EventSubject::Wake(entity, token)));

        telemetry.charging.push(ChargingRecord {
            timestamp: now,
            vehicle_id: vehicle.id,
            energy_delivered_kwh: energy,
            charge_duration_ms: duration,
            queue_wait_ms: started.saturating_sub(queued),
            depot_total_energy_kwh: depot.energy_delivered_kwh(),
            chargers_in_use: depot.in_use(),
            vehicles_queued: depot.queued(),
        });
        next
    };

    if let Some((next_entity, _)) = next {
        if let Ok((mut vehicle, position)) = vehicles.get_mut(next_entity) {
            start_charging(
                &mut clock,
                &depot,
                &mut telemetry,
                next_entity,
                &mut vehicle,
                &position,
            );
        }
    }
}

fn start_charging(
    clock: &mut SimulationClock,
    depot: &ChargingDepot,
    telemetry: &mut SimTelemetry,
    entity: Entity,
    vehicle: &mut Vehicle,
    position: &Position,
) {
    let now = clock.now();
    set_state(vehicle, VehicleState::Charging, now, position.location, telemetry);
    vehicle.charge_started_at = Some(now);
    let duration = depot.charge_duration_ms(vehicle.energy_to_full());
    debug!(
        "vehicle {}: charging {:.1} kWh for {duration} ms",
        vehicle.id,
        vehicle.energy_to_full()
    );
    clock.schedule_in(duration, EventKind::ChargeComplete, Some(EventSubject::Vehicle(entity)));
}
