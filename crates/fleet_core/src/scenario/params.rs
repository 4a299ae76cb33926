use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graph::NodeId;
use crate::spatial::Location;

/// Simulation end time in milliseconds. The runner stops once the next event would be
/// at or after this timestamp and drops everything still queued.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationEndTimeMs(pub u64);

/// The run's random source. Seeded from config, or from entropy when no seed is given.
#[derive(Debug, Resource)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self(StdRng::seed_from_u64(seed)),
            None => Self(StdRng::from_entropy()),
        }
    }
}

/// Graph nodes inside the service area. Trip origins and destinations are drawn from here.
#[derive(Debug, Clone, Resource)]
pub struct ServiceArea {
    pub center: Location,
    pub radius_miles: f64,
    nodes: Vec<NodeId>,
}

impl ServiceArea {
    pub fn new(center: Location, radius_miles: f64, nodes: Vec<NodeId>) -> Self {
        Self {
            center,
            radius_miles,
            nodes,
        }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn random_node<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeId> {
        if self.nodes.is_empty() {
            return None;
        }
        Some(self.nodes[rng.gen_range(0..self.nodes.len())])
    }
}
