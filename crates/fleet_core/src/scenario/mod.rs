//! Scenario setup: validate the config, build routing over the road graph, place the
//! fleet and insert every resource the simulation systems read.

mod build;
mod params;

pub use build::{build_scenario, spawn_vehicle};
pub use params::{ServiceArea, SimRng, SimulationEndTimeMs};
