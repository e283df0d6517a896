use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

// Configuration for the checkpoint grid
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub horizon: f64,
    pub sampling_interval: f64,
    #[serde(default = "default_max_events_per_interval")]
    pub max_events_per_interval: u64, // Guard against runaway intervals
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    Classic,
    Division,
}

// Cell growth and division settings. Only read in division mode.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GrowthConfig {
    #[serde(default = "default_mode")]
    pub mode: SimulationMode,
    #[serde(default = "default_doubling_time")]
    pub doubling_time: f64,
    #[serde(default)]
    pub noise_at_division: bool,
    #[serde(default = "default_birth_size")]
    pub birth_size: f64,
    #[serde(default)]
    pub stochastic_birth_size: bool, // Draw the initial size from Normal(birth_size, 0.1)
}

impl Default for GrowthConfig {
    fn default() -> Self {
        GrowthConfig {
            mode: SimulationMode::Classic,
            doubling_time: default_doubling_time(),
            noise_at_division: false,
            birth_size: default_birth_size(),
            stochastic_birth_size: false,
        }
    }
}

// Settings for the batch of independent lineages
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PopulationConfig {
    #[serde(default = "default_cells")]
    pub cells: u32,
    #[serde(default = "default_first_cell_id")]
    pub first_cell_id: u32,
    pub seed: u64,
    #[serde(default)]
    pub threads: Option<usize>,
}

// Configuration for output settings, loaded from config.toml
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    pub format: Option<String>, // Output format: "csv", "json", "bincode", "messagepack"
    #[serde(default = "default_true")]
    pub save_trajectories: bool,
    #[serde(default = "default_true")]
    pub save_stats: bool,
    #[serde(default = "default_stats_window")]
    pub stats_window: usize, // Trailing checkpoints averaged into steady-state values
}

/// A named species column and its initial value.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SpeciesEntry {
    pub name: String,
    #[serde(default)]
    pub initial: f64,
}

/// Declarative propensity laws usable from a config file.
///
/// Each law reads the species listed in [`RateLaw::arguments`], in that order.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum RateLaw {
    /// `k`
    Constant { k: f64 },
    /// `k * x`
    Linear { k: f64, species: String },
    /// `k * x1 * x2 * ...`
    MassAction { k: f64, species: Vec<String> },
    /// `beta * x^n / (k^n + x^n)`
    HillActivation { beta: f64, k: f64, n: f64, species: String },
    /// `beta / (1 + (x / k)^n)`
    HillRepression { beta: f64, k: f64, n: f64, species: String },
}

impl RateLaw {
    /// Names of the species this law depends on.
    pub fn arguments(&self) -> Vec<String> {
        match self {
            RateLaw::Constant { .. } => Vec::new(),
            RateLaw::Linear { species, .. }
            | RateLaw::HillActivation { species, .. }
            | RateLaw::HillRepression { species, .. } => vec![species.clone()],
            RateLaw::MassAction { species, .. } => species.clone(),
        }
    }
}

/// One `[[reactions]]` table. A table without `rate` must be the `division` pseudo-reaction.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ReactionEntry {
    pub name: String,
    #[serde(default)]
    pub rate: Option<RateLaw>,
    #[serde(default)]
    pub create: Vec<String>,
    #[serde(default)]
    pub destroy: Vec<String>,
    #[serde(default)]
    pub burst: Vec<String>,
    #[serde(default)]
    pub segregate: Vec<String>,
    #[serde(default)]
    pub create_mrna: Vec<String>,
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub timing: TimingConfig,
    #[serde(default)]
    pub growth: GrowthConfig,
    pub population: PopulationConfig,
    pub output: OutputConfig,
    pub species: Vec<SpeciesEntry>,
    pub reactions: Vec<ReactionEntry>,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates a configuration held in memory.
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.timing.horizon > 0.0) {
            anyhow::bail!("timing.horizon must be positive.");
        }
        if !(self.timing.sampling_interval > 0.0) {
            anyhow::bail!("timing.sampling_interval must be positive.");
        }
        if self.timing.max_events_per_interval == 0 {
            anyhow::bail!("timing.max_events_per_interval must be greater than 0.");
        }
        if !(self.growth.doubling_time > 0.0) || !self.growth.doubling_time.is_finite() {
            anyhow::bail!("growth.doubling_time must be a positive, finite number.");
        }
        if !(self.growth.birth_size > 0.0) {
            anyhow::bail!("growth.birth_size must be positive.");
        }
        if self.population.cells == 0 {
            anyhow::bail!("population.cells must be greater than 0.");
        }
        if self.output.stats_window == 0 {
            anyhow::bail!("output.stats_window must be greater than 0.");
        }
        // Model structure (reserved columns, species references) is checked by the compiler.
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        SimParams {
            horizon: self.timing.horizon,
            sampling_interval: self.timing.sampling_interval,
            max_events_per_interval: self.timing.max_events_per_interval,
            mode: self.growth.mode,
            doubling_time: self.growth.doubling_time,
            mu: std::f64::consts::LN_2 / self.growth.doubling_time,
            noise_at_division: self.growth.noise_at_division,
            birth_size: self.growth.birth_size,
            stochastic_birth_size: self.growth.stochastic_birth_size,
        }
    }
}

fn default_max_events_per_interval() -> u64 {
    50_000_000
}

fn default_mode() -> SimulationMode {
    SimulationMode::Classic
}

fn default_doubling_time() -> f64 {
    18.0
}

fn default_birth_size() -> f64 {
    1.0
}

fn default_cells() -> u32 {
    1
}

fn default_first_cell_id() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_stats_window() -> usize {
    100
}
