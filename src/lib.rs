//! Stochastic simulation of gene circuits in single growing and dividing cells.
//!
//! A reaction network is compiled once into a [`CompiledModel`], then many
//! independent lineages are simulated from it with Gillespie's direct method,
//! optionally with exponential volume growth and binomial partitioning at
//! division.

pub mod checkpoints;
pub mod division;
pub mod driver;
pub mod error;
pub mod network;
pub mod population;
pub mod propensity;
pub mod scheduler;
pub mod state;
pub mod stats;
pub mod storage;

pub use driver::{CellSimulator, LineageSummary};
pub use error::{ConfigurationError, SimulationError};
pub use network::{compile, Change, CompiledModel, ModelSpec, ReactionKind, ReactionSpec, SpeciesSpec};
pub use population::{simulate_population, stream_population};
pub use propensity::Propensity;
pub use stats::{save_summary, EnsembleAccumulator, EnsembleSummary};
pub use storage::{save_trajectories, CsvTrajectoryWriter, OutputFormat};
