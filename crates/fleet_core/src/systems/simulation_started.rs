use bevy_ecs::prelude::{Entity, Query, Res, ResMut};

use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::dispatch::TripGenerator;
use crate::ecs::Vehicle;

/// Starts the trip generator and every vehicle's idle loop.
pub fn simulation_started_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<SimulationClock>,
    mut generator: ResMut<TripGenerator>,
    mut vehicles: Query<(Entity, &mut Vehicle)>,
) {
    if event.0.kind != EventKind::SimulationStarted {
        return;
    }

    if let Some(gap) = generator.next_gap_ms() {
        clock.schedule_in(gap, EventKind::TripRequest, None);
    }

    let now = clock.now();
    let mut fleet: Vec<(Entity, _)> = vehicles.iter_mut().collect();
    fleet.sort_by_key(|(_, vehicle)| vehicle.id);
    for (entity, mut vehicle) in fleet {
        let token = vehicle.next_wake_token();
        clock.schedule_at(now, EventKind::VehicleWake, Some(EventSubject::Wake(entity, token)));
    }
}
