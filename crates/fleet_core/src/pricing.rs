//! Trip fares: base fee plus a per-mile rate scaled by a time-of-day surge multiplier.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::clock::ONE_SEC_MS;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// A surge period in seconds since midnight, `[start_secs, end_secs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurgeWindow {
    pub start_secs: u64,
    pub end_secs: u64,
    pub multiplier: f64,
}

impl SurgeWindow {
    pub fn new(start_secs: u64, end_secs: u64, multiplier: f64) -> Self {
        Self {
            start_secs,
            end_secs,
            multiplier,
        }
    }

    fn contains(&self, secs_of_day: u64) -> bool {
        self.start_secs <= secs_of_day && secs_of_day < self.end_secs
    }
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    pub base_fee: f64,
    pub per_mile_rate: f64,
    /// Checked in order; the first matching window wins.
    #[serde(default)]
    pub surge_windows: Vec<SurgeWindow>,
    /// Multiplier outside every surge window.
    #[serde(default = "default_multiplier")]
    pub default_multiplier: f64,
}

impl PricingConfig {
    pub fn new(base_fee: f64, per_mile_rate: f64) -> Self {
        Self {
            base_fee,
            per_mile_rate,
            surge_windows: Vec::new(),
            default_multiplier: default_multiplier(),
        }
    }

    pub fn with_surge_window(mut self, window: SurgeWindow) -> Self {
        self.surge_windows.push(window);
        self
    }

    /// Surge multiplier at a simulation time. Simulation time 0 is midnight.
    pub fn surge_multiplier(&self, now_ms: u64) -> f64 {
        let secs_of_day = (now_ms / ONE_SEC_MS) % SECS_PER_DAY;
        self.surge_windows
            .iter()
            .find(|w| w.contains(secs_of_day))
            .map(|w| w.multiplier)
            .unwrap_or(self.default_multiplier)
    }

    /// `fare = base_fee + per_mile_rate * distance_miles * surge`
    pub fn calculate_trip_fare(&self, distance_miles: f64, now_ms: u64) -> f64 {
        self.base_fee + self.per_mile_rate * distance_miles.max(0.0) * self.surge_multiplier(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ONE_HOUR_MS;

    fn rush_hour_pricing() -> PricingConfig {
        PricingConfig::new(2.5, 1.5)
            .with_surge_window(SurgeWindow::new(7 * 3600, 9 * 3600, 1.5))
            .with_surge_window(SurgeWindow::new(16 * 3600, 19 * 3600, 2.0))
    }

    #[test]
    fn surge_follows_time_of_day_windows() {
        let pricing = rush_hour_pricing();
        assert_eq!(pricing.surge_multiplier(6 * ONE_HOUR_MS), 1.0);
        assert_eq!(pricing.surge_multiplier(7 * ONE_HOUR_MS), 1.5);
        assert_eq!(pricing.surge_multiplier(9 * ONE_HOUR_MS), 1.0);
        assert_eq!(pricing.surge_multiplier(17 * ONE_HOUR_MS), 2.0);
        // Next day, same hour.
        assert_eq!(pricing.surge_multiplier(31 * ONE_HOUR_MS), 1.5);
    }

    #[test]
    fn fare_includes_base_and_surged_distance() {
        let pricing = rush_hour_pricing();
        let off_peak = pricing.calculate_trip_fare(10.0, 12 * ONE_HOUR_MS);
        assert!((off_peak - 17.5).abs() < 1e-9);
        let evening = pricing.calculate_trip_fare(10.0, 17 * ONE_HOUR_MS);
        assert!((evening - 32.5).abs() < 1e-9);
        assert_eq!(pricing.calculate_trip_fare(0.0, 0), 2.5);
    }
}
