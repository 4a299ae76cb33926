#![allow(dead_code)]

use bevy_ecs::prelude::World;
use bevy_ecs::schedule::Schedule;
use fleet_core::runner::{
    run_next_event, run_until_empty, run_until_end, simulation_schedule, SimulationError,
};

/// Helper that owns a reusable `Schedule` so tests can step or drain the event queue.
pub struct ScheduleRunner {
    schedule: Schedule,
}

impl Default for ScheduleRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRunner {
    /// Create a runner with the default simulation schedule.
    pub fn new() -> Self {
        Self {
            schedule: simulation_schedule(),
        }
    }

    /// Run a single event (returns `true` if an event was processed).
    pub fn run_one(&mut self, world: &mut World) -> bool {
        run_next_event(world, &mut self.schedule)
    }

    /// Run multiple events up to `max_steps`, returning the number of steps executed.
    pub fn run_until_empty(&mut self, world: &mut World, max_steps: usize) -> usize {
        run_until_empty(world, &mut self.schedule, max_steps)
    }

    /// Run to the configured end time and drop whatever is left queued.
    pub fn run_to_end(&mut self, world: &mut World) -> Result<usize, SimulationError> {
        run_until_end(world, &mut self.schedule)
    }
}
