use serde::{Deserialize, Serialize};
use crate::config::SimulationMode;

/// Simulation parameters derived from the configuration, read on every checkpoint interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimParams {
    // Time
    pub horizon: f64,
    pub sampling_interval: f64,
    pub max_events_per_interval: u64,

    // Growth & division
    pub mode: SimulationMode,
    pub doubling_time: f64,
    pub mu: f64, // ln(2) / doubling_time
    pub noise_at_division: bool,
    pub birth_size: f64,
    pub stochastic_birth_size: bool,
}

impl SimParams {
    /// Parameters for a plain Gillespie run without growth.
    pub fn classic(horizon: f64, sampling_interval: f64) -> Self {
        SimParams {
            horizon,
            sampling_interval,
            max_events_per_interval: 50_000_000,
            mode: SimulationMode::Classic,
            doubling_time: 18.0,
            mu: std::f64::consts::LN_2 / 18.0,
            noise_at_division: false,
            birth_size: 1.0,
            stochastic_birth_size: false,
        }
    }

    /// Parameters for a growing, dividing cell.
    pub fn division(horizon: f64, sampling_interval: f64, doubling_time: f64) -> Self {
        SimParams {
            mode: SimulationMode::Division,
            doubling_time,
            mu: std::f64::consts::LN_2 / doubling_time,
            ..Self::classic(horizon, sampling_interval)
        }
    }

    pub fn with_division_noise(mut self, noise_at_division: bool) -> Self {
        self.noise_at_division = noise_at_division;
        self
    }

    pub fn with_birth_size(mut self, birth_size: f64, stochastic: bool) -> Self {
        self.birth_size = birth_size;
        self.stochastic_birth_size = stochastic;
        self
    }

    pub fn with_max_events(mut self, max_events_per_interval: u64) -> Self {
        self.max_events_per_interval = max_events_per_interval;
        self
    }
}
