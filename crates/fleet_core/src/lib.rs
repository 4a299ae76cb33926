pub mod spatial;
pub mod clock;
pub mod config;
pub mod depot;
pub mod dispatch;
pub mod distributions;
pub mod ecs;
pub mod graph;
pub mod pricing;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod summary;
pub mod systems;
pub mod telemetry;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
