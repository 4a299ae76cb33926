//! Keeps the [`VehicleIndex`] in step with vehicle positions.

use bevy_ecs::prelude::{Changed, Entity, Query, ResMut, With};

use crate::ecs::{Position, Vehicle};
use crate::spatial::VehicleIndex;

/// Re-files vehicles whose position changed this step. Vehicles are never despawned,
/// so there is no removal path.
pub fn update_vehicle_index_system(
    mut index: ResMut<VehicleIndex>,
    moved: Query<(Entity, &Position), (Changed<Position>, With<Vehicle>)>,
) {
    if moved.is_empty() {
        return;
    }
    for (entity, position) in moved.iter() {
        if index.cell_of(entity) != Some(position.cell) {
            index.update(entity, position.cell);
        }
    }
}
