//! Trip assignment: nearest idle vehicle under pickup-SLA and battery constraints.
//!
//! The checks here are pure functions so they can be exercised without a world;
//! `systems::trip_request` gathers the inputs and applies the decision.

use std::fmt;

use bevy_ecs::prelude::{Entity, Resource};
use h3o::CellIndex;
use serde::{Deserialize, Serialize};

use crate::config::DispatchConfig;
use crate::distributions::InterArrivalDistribution;
use crate::spatial::{haversine_miles, GeoIndex, Location, VehicleIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfulfilledReason {
    InsufficientBattery,
    ExcessivePickupTime,
    NoAvailableVehicles,
    NoRoute,
}

impl UnfulfilledReason {
    pub const ALL: [UnfulfilledReason; 4] = [
        UnfulfilledReason::InsufficientBattery,
        UnfulfilledReason::ExcessivePickupTime,
        UnfulfilledReason::NoAvailableVehicles,
        UnfulfilledReason::NoRoute,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UnfulfilledReason::InsufficientBattery => "insufficient_battery",
            UnfulfilledReason::ExcessivePickupTime => "excessive_pickup_time",
            UnfulfilledReason::NoAvailableVehicles => "no_available_vehicles",
            UnfulfilledReason::NoRoute => "no_route",
        }
    }
}

impl fmt::Display for UnfulfilledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trip arrival process: draws the gap to the next request.
#[derive(Debug, Resource)]
pub struct TripGenerator {
    distribution: Box<dyn InterArrivalDistribution>,
    generated: u64,
}

impl TripGenerator {
    pub fn new(distribution: Box<dyn InterArrivalDistribution>) -> Self {
        Self {
            distribution,
            generated: 0,
        }
    }

    /// Milliseconds until the next request (at least 1), or `None` if requests
    /// never arrive.
    pub fn next_gap_ms(&mut self) -> Option<u64> {
        let gap = self.distribution.sample_ms(self.generated);
        self.generated += 1;
        gap.is_finite().then(|| (gap.round() as u64).max(1))
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }
}

/// An idle vehicle considered for a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub entity: Entity,
    pub vehicle_id: u32,
    pub location: Location,
    pub pickup_miles: f64,
}

impl Candidate {
    fn at(entity: Entity, vehicle_id: u32, location: Location, origin: &Location) -> Self {
        Self {
            entity,
            vehicle_id,
            location,
            pickup_miles: haversine_miles(origin, &location),
        }
    }

    /// Closer wins; equal distances go to the lower vehicle id.
    fn beats(&self, other: &Candidate) -> bool {
        self.pickup_miles < other.pickup_miles
            || (self.pickup_miles == other.pickup_miles && self.vehicle_id < other.vehicle_id)
    }
}

fn keep_nearest(best: Option<Candidate>, candidate: Candidate) -> Option<Candidate> {
    match best {
        Some(b) if !candidate.beats(&b) => Some(b),
        _ => Some(candidate),
    }
}

/// Nearest eligible vehicle to `origin` within `max_pickup_radius_miles`.
///
/// Searches the origin cell and rings out to `min(max_search_rings, radius / 2)`
/// (a resolution-7 cell is roughly two miles across). `eligible` returns the
/// vehicle id and location for idle vehicles and `None` for everyone else.
/// Ranking is by great-circle distance; ties go to the lower vehicle id.
///
/// This is the fast path. `None` only means nobody is close; pair it with
/// [`nearest_anywhere`] before concluding that no vehicle is available.
pub fn find_nearest_vehicle<F>(
    geo: &GeoIndex,
    index: &VehicleIndex,
    origin: &Location,
    config: &DispatchConfig,
    mut eligible: F,
) -> Option<Candidate>
where
    F: FnMut(Entity) -> Option<(u32, Location)>,
{
    let origin_cell = geo.cell_of(origin)?;
    let rings = config
        .max_search_rings
        .min((config.max_pickup_radius_miles / 2.0) as u32);

    let mut cells: Vec<CellIndex> = Vec::new();
    for k in 0..=rings {
        cells.extend(geo.ring(origin_cell, k));
    }

    index
        .vehicles_in_cells(&cells)
        .into_iter()
        .filter_map(|entity| {
            let (vehicle_id, location) = eligible(entity)?;
            Some(Candidate::at(entity, vehicle_id, location, origin))
        })
        .filter(|candidate| candidate.pickup_miles <= config.max_pickup_radius_miles)
        .fold(None, keep_nearest)
}

/// Nearest of `idle` vehicles to `origin` with no distance limit, ranked like
/// [`find_nearest_vehicle`]. `None` only when `idle` is empty.
pub fn nearest_anywhere<I>(origin: &Location, idle: I) -> Option<Candidate>
where
    I: IntoIterator<Item = (Entity, u32, Location)>,
{
    idle.into_iter()
        .map(|(entity, vehicle_id, location)| Candidate::at(entity, vehicle_id, location, origin))
        .fold(None, keep_nearest)
}

pub fn pickup_minutes(pickup_miles: f64, pickup_speed_mph: f64) -> f64 {
    pickup_miles / pickup_speed_mph * 60.0
}

/// Energy to reach the rider, drive the trip and get back to the depot, times the margin.
pub fn energy_required_kwh(
    pickup_miles: f64,
    trip_miles: f64,
    return_miles: f64,
    efficiency_mi_per_kwh: f64,
    safety_margin: f64,
) -> f64 {
    (pickup_miles + trip_miles + return_miles) / efficiency_mi_per_kwh * safety_margin
}

/// Inputs for the per-candidate feasibility checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feasibility {
    pub pickup_miles: f64,
    pub trip_miles: f64,
    pub return_miles: f64,
    pub battery_kwh: f64,
    pub efficiency_mi_per_kwh: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Assign { pickup_minutes: f64 },
    ExcessivePickupTime { pickup_minutes: f64 },
    InsufficientBattery { pickup_minutes: f64, energy_required_kwh: f64 },
}

impl Verdict {
    pub fn reason(&self) -> Option<UnfulfilledReason> {
        match self {
            Verdict::Assign { .. } => None,
            Verdict::ExcessivePickupTime { .. } => Some(UnfulfilledReason::ExcessivePickupTime),
            Verdict::InsufficientBattery { .. } => Some(UnfulfilledReason::InsufficientBattery),
        }
    }

    pub fn pickup_minutes(&self) -> f64 {
        match self {
            Verdict::Assign { pickup_minutes }
            | Verdict::ExcessivePickupTime { pickup_minutes }
            | Verdict::InsufficientBattery { pickup_minutes, .. } => *pickup_minutes,
        }
    }
}

/// Pickup SLA first, then battery.
pub fn evaluate(config: &DispatchConfig, pickup_speed_mph: f64, input: &Feasibility) -> Verdict {
    let pickup_minutes = pickup_minutes(input.pickup_miles, pickup_speed_mph);
    if pickup_minutes > config.pickup_sla_minutes {
        return Verdict::ExcessivePickupTime { pickup_minutes };
    }
    let energy_required_kwh = energy_required_kwh(
        input.pickup_miles,
        input.trip_miles,
        input.return_miles,
        input.efficiency_mi_per_kwh,
        config.battery_safety_margin,
    );
    if input.battery_kwh < energy_required_kwh {
        return Verdict::InsufficientBattery {
            pickup_minutes,
            energy_required_kwh,
        };
    }
    Verdict::Assign { pickup_minutes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch_config(margin: f64) -> DispatchConfig {
        let mut config = DispatchConfig::new(15.0);
        config.battery_safety_margin = margin;
        config
    }

    #[test]
    fn far_pickup_breaks_sla() {
        let config = dispatch_config(1.0);
        let verdict = evaluate(
            &config,
            25.0,
            &Feasibility {
                pickup_miles: 20.0,
                trip_miles: 5.0,
                return_miles: 5.0,
                battery_kwh: 60.0,
                efficiency_mi_per_kwh: 4.0,
            },
        );
        assert_eq!(verdict.reason(), Some(UnfulfilledReason::ExcessivePickupTime));
        assert!((verdict.pickup_minutes() - 48.0).abs() < 1e-9);
    }

    #[test]
    fn low_battery_fails_energy_check() {
        let config = dispatch_config(1.0);
        let mut input = Feasibility {
            pickup_miles: 10.0,
            trip_miles: 20.0,
            return_miles: 10.0,
            battery_kwh: 8.0,
            efficiency_mi_per_kwh: 4.0,
        };
        // 40 miles at 4 mi/kWh needs 10 kWh.
        match evaluate(&config, 60.0, &input) {
            Verdict::InsufficientBattery {
                energy_required_kwh,
                ..
            } => assert_eq!(energy_required_kwh, 10.0),
            other => panic!("expected insufficient battery, got {other:?}"),
        }

        input.battery_kwh = 10.0;
        assert!(matches!(evaluate(&config, 60.0, &input), Verdict::Assign { .. }));

        // The default margin of 1.1 raises the bar to 11 kWh.
        let strict = dispatch_config(1.1);
        assert_eq!(
            evaluate(&strict, 60.0, &input).reason(),
            Some(UnfulfilledReason::InsufficientBattery)
        );
    }

    #[test]
    fn nearest_vehicle_wins_and_ties_go_to_lower_id() {
        let geo = GeoIndex::default();
        let origin = Location::new(41.0814, -81.5190);
        let cell = geo.cell_of(&origin).expect("cell");

        let near = Location::new(41.0830, -81.5190);
        let far = Location::new(41.0900, -81.5190);
        let entities = [Entity::from_raw(1), Entity::from_raw(2), Entity::from_raw(3), Entity::from_raw(4)];
        let mut index = VehicleIndex::new();
        for entity in entities {
            index.insert(entity, cell);
        }
        let lookup = |entity: Entity| match entity.index() {
            1 => Some((30, far)),
            2 => Some((20, near)),
            3 => Some((10, near)),
            _ => None,
        };

        let config = DispatchConfig::new(15.0);
        let best = find_nearest_vehicle(&geo, &index, &origin, &config, lookup).expect("candidate");
        assert_eq!(best.vehicle_id, 10);
        assert_eq!(best.entity, entities[2]);
        assert!(best.pickup_miles < 0.2);
    }

    #[test]
    fn generator_counts_draws_and_stops_at_zero_rate() {
        use crate::distributions::ExponentialInterArrival;

        let mut generator = TripGenerator::new(Box::new(ExponentialInterArrival::for_fleet(1.0, 10, 3)));
        assert!(generator.next_gap_ms().is_some_and(|gap| gap >= 1));
        assert!(generator.next_gap_ms().is_some());
        assert_eq!(generator.generated(), 2);

        let mut idle = TripGenerator::new(Box::new(ExponentialInterArrival::new(0.0, 3)));
        assert_eq!(idle.next_gap_ms(), None);
    }

    #[test]
    fn nearest_anywhere_has_no_radius() {
        let origin = Location::new(41.0814, -81.5190);
        // About 20 and 25 miles north.
        let far = Location::new(41.3711, -81.5190);
        let farther = Location::new(41.4432, -81.5190);
        let best = nearest_anywhere(
            &origin,
            [
                (Entity::from_raw(1), 4, farther),
                (Entity::from_raw(2), 9, far),
                (Entity::from_raw(3), 2, far),
            ],
        )
        .expect("candidate");
        assert_eq!(best.vehicle_id, 2);
        assert!((best.pickup_miles - 20.0).abs() < 0.1, "got {}", best.pickup_miles);
        assert!(nearest_anywhere(&origin, Vec::new()).is_none());
    }

    #[test]
    fn vehicles_beyond_radius_are_ignored() {
        let geo = GeoIndex::default();
        let origin = Location::new(41.0814, -81.5190);
        let cell = geo.cell_of(&origin).expect("cell");
        let entity = Entity::from_raw(1);
        let mut index = VehicleIndex::new();
        index.insert(entity, cell);

        let mut config = DispatchConfig::new(15.0);
        config.max_pickup_radius_miles = 0.01;
        let away = Location::new(41.0900, -81.5190);
        assert!(find_nearest_vehicle(&geo, &index, &origin, &config, |_| Some((0, away))).is_none());
    }
}
