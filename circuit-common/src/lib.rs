pub mod config;
pub mod sim_params;
pub mod trajectory;

// Re-export key types for easier use by dependent crates
pub use config::{SimulationConfig, TimingConfig, GrowthConfig, PopulationConfig, OutputConfig, SimulationMode, SpeciesEntry, ReactionEntry, RateLaw};
pub use sim_params::SimParams;
pub use trajectory::Trajectory;
