//! Run configuration: every recognized option, its type and its documented default.
//!
//! Sections without `#[serde(default)]` are required, as are fields inside them
//! without a default. Unknown keys are rejected. [`SimConfig::validate`] runs once
//! at startup and fails fast on out-of-range values.

use std::fmt;

use bevy_ecs::prelude::Resource;
use h3o::Resolution;
use serde::{Deserialize, Serialize};

use crate::pricing::PricingConfig;
use crate::spatial::Location;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Parse(String),
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(msg) => write!(f, "config parse error: {msg}"),
            ConfigError::Invalid { field, reason } => write!(f, "invalid `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Virtual run length. Events at or after this bound are dropped.
    pub duration_secs: u64,
    /// Interval at which an idle vehicle re-evaluates (charge / reposition / wait).
    pub time_step_secs: u64,
    /// Seed for every RNG in the run. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_spread_radius() -> f64 {
    2.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    pub fleet_size: usize,
    pub battery_capacity_kwh: f64,
    pub efficiency_mi_per_kwh: f64,
    /// Target trips per vehicle per hour; drives the request arrival rate.
    pub utilization: f64,
    /// Vehicles start at random nodes within this radius of the depot.
    #[serde(default = "default_spread_radius")]
    pub initial_spread_radius_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChargingConfig {
    pub chargers: usize,
    pub charger_power_kw: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeoConfig {
    pub depot: Location,
    pub service_area_center: Location,
    pub service_area_radius_miles: f64,
}

fn default_max_pickup_radius() -> f64 {
    10.0
}

fn default_max_search_rings() -> u32 {
    3
}

fn default_safety_margin() -> f64 {
    1.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Maximum minutes between request and pickup arrival.
    pub pickup_sla_minutes: f64,
    /// Window of the ring search. Vehicles beyond it are still found by the
    /// fleet-wide fallback and judged by the SLA.
    #[serde(default = "default_max_pickup_radius")]
    pub max_pickup_radius_miles: f64,
    /// Rings searched around the request cell (0 = request cell only).
    #[serde(default = "default_max_search_rings")]
    pub max_search_rings: u32,
    /// Energy multiplier applied to every feasibility check.
    #[serde(default = "default_safety_margin")]
    pub battery_safety_margin: f64,
}

impl DispatchConfig {
    pub fn new(pickup_sla_minutes: f64) -> Self {
        Self {
            pickup_sla_minutes,
            max_pickup_radius_miles: default_max_pickup_radius(),
            max_search_rings: default_max_search_rings(),
            battery_safety_margin: default_safety_margin(),
        }
    }
}

fn default_reposition_probability() -> f64 {
    0.3
}

fn default_service_delay_secs() -> u64 {
    120
}

fn default_repositioning_speed() -> f64 {
    35.0
}

fn default_trip_speed() -> f64 {
    30.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(deny_unknown_fields)]
pub struct VehicleBehaviorConfig {
    /// Head to the depot once battery falls below this fraction of capacity.
    pub low_battery_fraction: f64,
    /// Chance that an idle vehicle cruises to a neighbouring cell instead of waiting.
    #[serde(default = "default_reposition_probability")]
    pub reposition_probability: f64,
    #[serde(default = "default_service_delay_secs")]
    pub pickup_delay_secs: u64,
    #[serde(default = "default_service_delay_secs")]
    pub dropoff_delay_secs: u64,
    /// Speed for repositioning, pickup approach and depot runs.
    #[serde(default = "default_repositioning_speed")]
    pub repositioning_speed_mph: f64,
    /// Speed with a rider on board.
    #[serde(default = "default_trip_speed")]
    pub trip_speed_mph: f64,
}

impl VehicleBehaviorConfig {
    pub fn new(low_battery_fraction: f64) -> Self {
        Self {
            low_battery_fraction,
            reposition_probability: default_reposition_probability(),
            pickup_delay_secs: default_service_delay_secs(),
            dropoff_delay_secs: default_service_delay_secs(),
            repositioning_speed_mph: default_repositioning_speed(),
            trip_speed_mph: default_trip_speed(),
        }
    }
}

/// Routing and path-cache precompute knobs. None of these change results except
/// `cell_resolution` (which changes the anchors) and `intra_cell_max_edges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RoutingConfig {
    pub cell_resolution: u8,
    /// Same-cell direct routes with more edges than this go through the cache.
    pub intra_cell_max_edges: usize,
    /// Force parallel (`true`) or single-threaded (`false`) precompute.
    /// `None` = parallel iff the anchor count reaches `parallel_threshold`.
    pub parallel: Option<bool>,
    pub parallel_threshold: usize,
    /// Source anchors per parallel work unit.
    pub batch_size: usize,
    /// Worker threads for the precompute pool; 0 = rayon default.
    pub workers: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cell_resolution: 7,
            intra_cell_max_edges: 12,
            parallel: None,
            parallel_threshold: 64,
            batch_size: 16,
            workers: 0,
        }
    }
}

impl RoutingConfig {
    pub fn resolution(&self) -> Result<Resolution, ConfigError> {
        Resolution::try_from(self.cell_resolution)
            .map_err(|e| ConfigError::invalid("routing.cell_resolution", e.to_string()))
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn with_resolution(mut self, cell_resolution: u8) -> Self {
        self.cell_resolution = cell_resolution;
        self
    }

    /// Whether a build over `anchor_count` anchors runs on the worker pool.
    pub fn use_parallel(&self, anchor_count: usize) -> bool {
        self.parallel
            .unwrap_or(anchor_count >= self.parallel_threshold)
    }
}

/// Operating-cost parameters for the run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Resource)]
#[serde(deny_unknown_fields, default)]
pub struct CostConfig {
    pub energy_price_per_kwh: f64,
    pub vehicle_capex_per_mile: f64,
    pub battery_capex_per_mile: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    pub simulation: SimulationConfig,
    pub fleet: FleetConfig,
    pub charging: ChargingConfig,
    pub pricing: PricingConfig,
    pub geo: GeoConfig,
    pub dispatch: DispatchConfig,
    pub behavior: VehicleBehaviorConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub costs: CostConfig,
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {value}")))
    }
}

fn require_fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be within [0, 1], got {value}")))
    }
}

fn require_location(field: &'static str, location: &Location) -> Result<(), ConfigError> {
    if location.is_valid() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("invalid coordinates {location}")))
    }
}

impl SimConfig {
    /// Parse and validate an in-memory JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.duration_secs == 0 {
            return Err(ConfigError::invalid("simulation.duration_secs", "must be > 0"));
        }
        if self.simulation.time_step_secs == 0 {
            return Err(ConfigError::invalid("simulation.time_step_secs", "must be > 0"));
        }

        if self.fleet.fleet_size == 0 {
            return Err(ConfigError::invalid("fleet.fleet_size", "must be > 0"));
        }
        require_positive("fleet.battery_capacity_kwh", self.fleet.battery_capacity_kwh)?;
        require_positive("fleet.efficiency_mi_per_kwh", self.fleet.efficiency_mi_per_kwh)?;
        require_positive("fleet.utilization", self.fleet.utilization)?;
        if !(self.fleet.initial_spread_radius_miles >= 0.0) {
            return Err(ConfigError::invalid(
                "fleet.initial_spread_radius_miles",
                "must be >= 0",
            ));
        }

        if self.charging.chargers == 0 {
            return Err(ConfigError::invalid("charging.chargers", "must be > 0"));
        }
        require_positive("charging.charger_power_kw", self.charging.charger_power_kw)?;

        if !(self.pricing.base_fee >= 0.0 && self.pricing.per_mile_rate >= 0.0) {
            return Err(ConfigError::invalid("pricing", "fees must be >= 0"));
        }
        require_positive("pricing.default_multiplier", self.pricing.default_multiplier)?;
        for window in &self.pricing.surge_windows {
            if window.start_secs >= window.end_secs {
                return Err(ConfigError::invalid(
                    "pricing.surge_windows",
                    format!("empty window {}..{}", window.start_secs, window.end_secs),
                ));
            }
            require_positive("pricing.surge_windows.multiplier", window.multiplier)?;
        }

        require_location("geo.depot", &self.geo.depot)?;
        require_location("geo.service_area_center", &self.geo.service_area_center)?;
        require_positive("geo.service_area_radius_miles", self.geo.service_area_radius_miles)?;

        require_positive("dispatch.pickup_sla_minutes", self.dispatch.pickup_sla_minutes)?;
        require_positive("dispatch.max_pickup_radius_miles", self.dispatch.max_pickup_radius_miles)?;
        if !(self.dispatch.battery_safety_margin >= 1.0) {
            return Err(ConfigError::invalid(
                "dispatch.battery_safety_margin",
                "must be >= 1.0",
            ));
        }

        require_fraction("behavior.low_battery_fraction", self.behavior.low_battery_fraction)?;
        require_fraction(
            "behavior.reposition_probability",
            self.behavior.reposition_probability,
        )?;
        require_positive(
            "behavior.repositioning_speed_mph",
            self.behavior.repositioning_speed_mph,
        )?;
        require_positive("behavior.trip_speed_mph", self.behavior.trip_speed_mph)?;

        self.routing.resolution()?;
        if self.routing.batch_size == 0 {
            return Err(ConfigError::invalid("routing.batch_size", "must be > 0"));
        }

        for (field, value) in [
            ("costs.energy_price_per_kwh", self.costs.energy_price_per_kwh),
            ("costs.vehicle_capex_per_mile", self.costs.vehicle_capex_per_mile),
            ("costs.battery_capex_per_mile", self.costs.battery_capex_per_mile),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::invalid(field, "must be >= 0"));
            }
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.simulation.seed = Some(seed);
        self
    }

    pub fn with_duration_hours(mut self, hours: u64) -> Self {
        self.simulation.duration_secs = hours * 60 * 60;
        self
    }

    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }
}
