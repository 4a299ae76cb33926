//! Inter-arrival time distributions for the trip generator.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

use crate::clock::ONE_MIN_MS;

/// Trait for sampling inter-arrival times (in milliseconds).
pub trait InterArrivalDistribution: Send + Sync + std::fmt::Debug {
    /// Sample the next inter-arrival time in milliseconds.
    /// `arrival_count` is the number of arrivals generated so far.
    fn sample_ms(&self, arrival_count: u64) -> f64;

    /// Expected inter-arrival time in milliseconds.
    fn mean_ms(&self) -> f64;
}

/// Exponential distribution: Poisson process (constant rate, random inter-arrival times).
#[derive(Debug, Clone)]
pub struct ExponentialInterArrival {
    /// Rate parameter (lambda): expected number of arrivals per minute.
    pub rate_per_min: f64,
    /// Seed for RNG (for reproducibility).
    pub seed: u64,
}

impl ExponentialInterArrival {
    pub fn new(rate_per_min: f64, seed: u64) -> Self {
        Self {
            rate_per_min: rate_per_min.max(0.0),
            seed,
        }
    }

    /// Trip requests for a fleet: mean gap of `60 / (utilization * fleet_size)` minutes,
    /// i.e. `utilization` trips per vehicle per hour.
    pub fn for_fleet(utilization: f64, fleet_size: usize, seed: u64) -> Self {
        let trips_per_hour = utilization * fleet_size as f64;
        Self::new(trips_per_hour / 60.0, seed)
    }

    pub fn mean_minutes(&self) -> f64 {
        if self.rate_per_min <= 0.0 {
            f64::INFINITY
        } else {
            1.0 / self.rate_per_min
        }
    }
}

impl InterArrivalDistribution for ExponentialInterArrival {
    fn sample_ms(&self, arrival_count: u64) -> f64 {
        if self.rate_per_min <= 0.0 {
            return f64::INFINITY;
        }
        // One RNG per draw keyed on the arrival count, so the sequence does not
        // depend on how many other random draws happened in between.
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(arrival_count));
        let u: f64 = rng.gen();
        let u = u.max(1e-10);
        -u.ln() / self.rate_per_min * ONE_MIN_MS as f64
    }

    fn mean_ms(&self) -> f64 {
        self.mean_minutes() * ONE_MIN_MS as f64
    }
}
