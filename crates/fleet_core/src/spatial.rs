//! Spatial operations: locations, H3 cell indexing and great-circle distances.
//!
//! This module provides:
//!
//! - **Location**: an immutable (lat, lon) pair in degrees
//! - **GeoIndex**: the cell resolution for a run plus an owned LRU cache of grid rings
//! - **VehicleIndex**: H3 cell → vehicle mappings for proximity search during dispatch
//!
//! Default resolution is 7 (~5 km² cells), which groups a city road network into a
//! few dozen cells, each represented by one anchor node in the path cache.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use bevy_ecs::prelude::{Entity, Resource};
use h3o::{CellIndex, LatLng, Resolution};
use lru::LruCache;
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KM_PER_MILE: f64 = 1.60934;
pub const METERS_PER_MILE: f64 = 1609.34;

const RING_CACHE_CAPACITY: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// The H3 cell containing this location, or `None` for invalid coordinates.
    pub fn cell(&self, resolution: Resolution) -> Option<CellIndex> {
        if !self.is_valid() {
            return None;
        }
        LatLng::new(self.lat, self.lon)
            .ok()
            .map(|ll| ll.to_cell(resolution))
    }

    /// Squared Euclidean distance in degree space. Only meaningful for ranking
    /// nearby candidates, never as a physical distance.
    pub fn degree_distance_sq(&self, other: &Location) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        dlat * dlat + dlon * dlon
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

impl From<LatLng> for Location {
    fn from(ll: LatLng) -> Self {
        Self::new(ll.lat(), ll.lng())
    }
}

pub fn haversine_km(a: &Location, b: &Location) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lon.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lon.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn haversine_miles(a: &Location, b: &Location) -> f64 {
    haversine_km(a, b) / KM_PER_MILE
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

/// Cell resolution for a run plus a bounded cache of grid rings.
///
/// The ring cache is owned by the index (one per run) and never invalidated:
/// rings are a pure function of `(cell, k)`.
#[derive(Resource)]
pub struct GeoIndex {
    resolution: Resolution,
    rings: Mutex<LruCache<(CellIndex, u32), Vec<CellIndex>>>,
}

impl GeoIndex {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            rings: Mutex::new(LruCache::new(
                NonZeroUsize::new(RING_CACHE_CAPACITY).expect("cache size must be non-zero"),
            )),
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn cell_of(&self, location: &Location) -> Option<CellIndex> {
        location.cell(self.resolution)
    }

    pub fn grid_disk(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        debug_assert_eq!(
            origin.resolution(),
            self.resolution,
            "origin resolution must match GeoIndex resolution"
        );
        origin.grid_disk::<Vec<_>>(k)
    }

    /// Cells at exactly grid distance `k` from `origin` (`k == 0` is the origin itself).
    pub fn ring(&self, origin: CellIndex, k: u32) -> Vec<CellIndex> {
        let mut cache = match self.rings.lock() {
            Ok(guard) => guard,
            Err(_) => return compute_ring(origin, k), // Fallback: compute without cache if mutex poisoned
        };
        cache
            .get_or_insert((origin, k), || compute_ring(origin, k))
            .clone()
    }
}

fn compute_ring(origin: CellIndex, k: u32) -> Vec<CellIndex> {
    if k == 0 {
        return vec![origin];
    }
    let mut cells: Vec<CellIndex> = origin
        .grid_disk_distances::<Vec<_>>(k)
        .into_iter()
        .filter(|(_, distance)| *distance == k)
        .map(|(cell, _)| cell)
        .collect();
    cells.sort_unstable();
    cells
}

impl Clone for GeoIndex {
    fn clone(&self) -> Self {
        Self::new(self.resolution)
    }
}

impl fmt::Debug for GeoIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoIndex")
            .field("resolution", &self.resolution)
            .finish()
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new(Resolution::Seven)
    }
}

/// Spatial index for vehicle lookups by H3 cell.
///
/// Maintains mappings from H3 cells to vehicle entities so dispatch can search
/// outward ring by ring instead of scanning the whole fleet. Updated incrementally
/// as vehicles move.
#[derive(Debug, Resource, Default)]
pub struct VehicleIndex {
    vehicles_by_cell: HashMap<CellIndex, Vec<Entity>>,
    entity_to_cell: HashMap<Entity, CellIndex>,
}

impl VehicleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity, cell: CellIndex) {
        self.vehicles_by_cell.entry(cell).or_default().push(entity);
        self.entity_to_cell.insert(entity, cell);
    }

    pub fn remove(&mut self, entity: Entity) {
        if let Some(cell) = self.entity_to_cell.remove(&entity) {
            self.detach(entity, cell);
        }
    }

    /// Move a vehicle between cells (no-op when the cell did not change).
    pub fn update(&mut self, entity: Entity, new_cell: CellIndex) {
        match self.entity_to_cell.get(&entity).copied() {
            Some(old_cell) if old_cell == new_cell => {}
            Some(old_cell) => {
                self.detach(entity, old_cell);
                self.insert(entity, new_cell);
            }
            None => self.insert(entity, new_cell),
        }
    }

    fn detach(&mut self, entity: Entity, cell: CellIndex) {
        if let Some(entities) = self.vehicles_by_cell.get_mut(&cell) {
            entities.retain(|&e| e != entity);
            if entities.is_empty() {
                self.vehicles_by_cell.remove(&cell);
            }
        }
    }

    pub fn vehicles_in_cells(&self, cells: &[CellIndex]) -> Vec<Entity> {
        let mut result = Vec::new();
        for cell in cells {
            if let Some(entities) = self.vehicles_by_cell.get(cell) {
                result.extend(entities.iter().copied());
            }
        }
        result
    }

    pub fn cell_of(&self, entity: Entity) -> Option<CellIndex> {
        self.entity_to_cell.get(&entity).copied()
    }

    pub fn len(&self) -> usize {
        self.entity_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_to_cell.is_empty()
    }
}
