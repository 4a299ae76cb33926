//! Charging depot: a fixed pool of chargers with a FIFO wait queue.
//!
//! No priorities, no preemption, no partial charging: a vehicle that gets a charger
//! keeps it until full, then the charger goes to the head of the queue.

use std::collections::VecDeque;
use std::fmt;

use bevy_ecs::prelude::{Entity, Resource};
use h3o::{CellIndex, Resolution};

use crate::clock::hours_to_ms;
use crate::spatial::{Location, VehicleIndex};

#[derive(Debug, Clone, PartialEq)]
pub enum DepotError {
    /// More vehicles charging than there are chargers. Fatal for the run.
    CapacityInvariantViolation { in_use: usize, capacity: usize },
    /// The vehicle is already charging or queued.
    AlreadyAtDepot(Entity),
    /// Release for a vehicle that holds no charger.
    NotCharging(Entity),
}

impl fmt::Display for DepotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepotError::CapacityInvariantViolation { in_use, capacity } => {
                write!(f, "{in_use} chargers in use, capacity is {capacity}")
            }
            DepotError::AlreadyAtDepot(entity) => write!(f, "vehicle {entity:?} is already at the depot"),
            DepotError::NotCharging(entity) => write!(f, "vehicle {entity:?} holds no charger"),
        }
    }
}

impl std::error::Error for DepotError {}

/// Outcome of arriving at the depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A charger was free; charging starts now.
    Charging,
    /// All chargers busy; `position` is the 0-based place in the queue.
    Queued { position: usize },
}

#[derive(Debug, Resource)]
pub struct ChargingDepot {
    capacity: usize,
    charger_power_kw: f64,
    location: Location,
    charging: Vec<Entity>,
    queue: VecDeque<(Entity, u64)>,
    /// Depot cell plus its first ring, sorted.
    service_area: Vec<CellIndex>,
    energy_delivered_kwh: f64,
    charge_events: u64,
    charger_busy_ms: u64,
}

impl ChargingDepot {
    pub fn new(capacity: usize, charger_power_kw: f64, location: Location, resolution: Resolution) -> Self {
        let mut service_area: Vec<CellIndex> = location
            .cell(resolution)
            .map(|cell| cell.grid_disk::<Vec<_>>(1))
            .unwrap_or_default();
        service_area.sort_unstable();
        Self {
            capacity,
            charger_power_kw,
            location,
            charging: Vec::with_capacity(capacity),
            queue: VecDeque::new(),
            service_area,
            energy_delivered_kwh: 0.0,
            charge_events: 0,
            charger_busy_ms: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn charger_power_kw(&self) -> f64 {
        self.charger_power_kw
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn in_use(&self) -> usize {
        self.charging.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_charging(&self, vehicle: Entity) -> bool {
        self.charging.contains(&vehicle)
    }

    pub fn is_queued(&self, vehicle: Entity) -> bool {
        self.queue.iter().any(|(e, _)| *e == vehicle)
    }

    /// Vehicles waiting, head first.
    pub fn queue(&self) -> impl Iterator<Item = Entity> + '_ {
        self.queue.iter().map(|(e, _)| *e)
    }

    pub fn energy_delivered_kwh(&self) -> f64 {
        self.energy_delivered_kwh
    }

    pub fn charge_events(&self) -> u64 {
        self.charge_events
    }

    /// Sum of charge durations over all completed charges.
    pub fn charger_busy_ms(&self) -> u64 {
        self.charger_busy_ms
    }

    /// Time to deliver `energy_kwh` at the charger's rated power.
    pub fn charge_duration_ms(&self, energy_kwh: f64) -> u64 {
        if self.charger_power_kw <= 0.0 {
            return 0;
        }
        hours_to_ms(energy_kwh / self.charger_power_kw)
    }

    /// A vehicle arrives: take a free charger or join the back of the queue.
    pub fn request(&mut self, vehicle: Entity, now: u64) -> Result<Admission, DepotError> {
        if self.is_charging(vehicle) || self.is_queued(vehicle) {
            return Err(DepotError::AlreadyAtDepot(vehicle));
        }
        if self.charging.len() < self.capacity {
            self.charging.push(vehicle);
            self.check_invariants()?;
            return Ok(Admission::Charging);
        }
        self.queue.push_back((vehicle, now));
        Ok(Admission::Queued {
            position: self.queue.len() - 1,
        })
    }

    /// A vehicle finished charging. The charger passes to the head of the queue,
    /// which is returned together with the time it joined the queue.
    pub fn release(&mut self, vehicle: Entity) -> Result<Option<(Entity, u64)>, DepotError> {
        let Some(slot) = self.charging.iter().position(|e| *e == vehicle) else {
            return Err(DepotError::NotCharging(vehicle));
        };
        self.charging.swap_remove(slot);
        let next = self.queue.pop_front();
        if let Some((next_vehicle, _)) = next {
            self.charging.push(next_vehicle);
        }
        self.check_invariants()?;
        Ok(next)
    }

    pub fn record_charge(&mut self, energy_kwh: f64, duration_ms: u64) {
        self.energy_delivered_kwh += energy_kwh;
        self.charge_events += 1;
        self.charger_busy_ms += duration_ms;
    }

    pub fn check_invariants(&self) -> Result<(), DepotError> {
        if self.charging.len() > self.capacity {
            return Err(DepotError::CapacityInvariantViolation {
                in_use: self.charging.len(),
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    pub fn service_area(&self) -> &[CellIndex] {
        &self.service_area
    }

    pub fn is_in_service_area(&self, location: &Location, resolution: Resolution) -> bool {
        location
            .cell(resolution)
            .map(|cell| self.service_area.binary_search(&cell).is_ok())
            .unwrap_or(false)
    }

    /// Vehicles currently indexed in the depot's service area.
    pub fn vehicles_in_range(&self, index: &VehicleIndex) -> Vec<Entity> {
        index.vehicles_in_cells(&self.service_area)
    }
}
