//! Run a four-hour fleet scenario on a synthetic grid and print the summary as JSON.
//!
//! Run with: RUST_LOG=info cargo run -p fleet_core --example fleet_run

use bevy_ecs::prelude::World;
use fleet_core::runner::{initialize_simulation, run_until_end, simulation_schedule};
use fleet_core::scenario::build_scenario;
use fleet_core::summary::FleetSummary;
use fleet_core::test_helpers::{grid_graph, grid_location, test_config};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    const SIDE: usize = 30;
    const SPACING: f64 = 0.003;
    const SIMULATION_HOURS: u64 = 4;

    let center = grid_location(SIDE / 2, SIDE / 2, SPACING);
    let mut config = test_config(center)
        .with_seed(123)
        .with_duration_hours(SIMULATION_HOURS);
    config.fleet.fleet_size = 25;
    config.fleet.initial_spread_radius_miles = 2.0;
    config.charging.chargers = 3;
    config.geo.service_area_radius_miles = 3.0;

    let mut world = World::new();
    build_scenario(&mut world, config, grid_graph(SIDE, SIDE, SPACING))?;
    initialize_simulation(&mut world);

    let mut schedule = simulation_schedule();
    let steps = run_until_end(&mut world, &mut schedule)?;

    let summary = FleetSummary::from_world(&mut world);
    println!("--- Fleet run ({SIMULATION_HOURS}h, {steps} events, seed 123) ---");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
