#![allow(dead_code)]

use bevy_ecs::prelude::{Entity, World};
use fleet_core::config::{RoutingConfig, SimConfig};
use fleet_core::ecs::Vehicle;
use fleet_core::graph::RoadGraph;
use fleet_core::runner::initialize_simulation;
use fleet_core::scenario::build_scenario;
use fleet_core::test_helpers::{grid_graph, grid_location, test_config};

/// Spacing of the default 8x8 test grid, in degrees.
pub const SPACING: f64 = 0.004;

/// Helper that builds a ready-to-run world from a small synthetic grid.
#[derive(Debug, Clone)]
pub struct TestWorldBuilder {
    config: SimConfig,
    graph: Option<RoadGraph>,
}

impl Default for TestWorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorldBuilder {
    /// 8x8 grid, depot and service area at its center, config from `test_config`.
    pub fn new() -> Self {
        Self {
            config: test_config(grid_location(4, 4, SPACING)),
            graph: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config = self.config.with_seed(seed);
        self
    }

    pub fn with_fleet_size(mut self, fleet_size: usize) -> Self {
        self.config.fleet.fleet_size = fleet_size;
        self
    }

    pub fn with_chargers(mut self, chargers: usize) -> Self {
        self.config.charging.chargers = chargers;
        self
    }

    pub fn with_duration_hours(mut self, hours: u64) -> Self {
        self.config = self.config.with_duration_hours(hours);
        self
    }

    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.config = self.config.with_routing(routing);
        self
    }

    pub fn with_graph(mut self, graph: RoadGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Arbitrary config edits not covered by the other helpers.
    pub fn configure(mut self, edit: impl FnOnce(&mut SimConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Build the scenario without scheduling anything.
    pub fn build(self) -> World {
        let graph = self.graph.unwrap_or_else(|| grid_graph(8, 8, SPACING));
        let mut world = World::new();
        build_scenario(&mut world, self.config, graph).expect("scenario should build");
        world
    }

    /// Build the scenario and schedule the start event.
    pub fn build_initialized(self) -> World {
        let mut world = self.build();
        initialize_simulation(&mut world);
        world
    }
}

/// Vehicle entities ordered by vehicle id.
pub fn vehicles_by_id(world: &mut World) -> Vec<Entity> {
    let mut query = world.query::<(Entity, &Vehicle)>();
    let mut fleet: Vec<(Entity, u32)> = query.iter(world).map(|(e, v)| (e, v.id)).collect();
    fleet.sort_by_key(|(_, id)| *id);
    fleet.into_iter().map(|(e, _)| e).collect()
}
