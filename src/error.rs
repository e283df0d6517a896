use thiserror::Error;

/// Problems with a model declaration or its parameters. Raised before any simulation work starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("species declaration is empty or lacks the reserved time/cell columns")]
    EmptySpecies,
    #[error("reaction declaration is empty")]
    EmptyReactions,
    #[error("species column {index} must be named '{expected}', found '{found}'")]
    ReservedSpecies {
        index: usize,
        expected: &'static str,
        found: String,
    },
    #[error("species '{0}' is declared more than once")]
    DuplicateSpecies(String),
    #[error("reaction '{reaction}' references undeclared species '{species}'")]
    UnknownSpecies { reaction: String, species: String },
    #[error("reaction '{reaction}' may not change reserved column '{species}'")]
    ReservedColumn { reaction: String, species: String },
    #[error("reaction '{reaction}' has no propensity; only 'division' may omit one")]
    MissingRate { reaction: String },
    #[error("the 'division' reaction cannot carry a propensity")]
    DivisionHasRate,
    #[error("more than one 'division' reaction declared")]
    DuplicateDivision,
    #[error("the 'division' reaction does not segregate any species")]
    NoSegregatedSpecies,
    #[error("division mode requires a 'division' reaction")]
    MissingDivision,
    #[error("division mode requires species column 2 to be 'size'")]
    MissingSizeColumn,
    #[error("invalid value for {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// Conditions that abort a single lineage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("cell {cell} stalled at t={time} before checkpoint {boundary} after {events} events")]
    Stalled {
        cell: u32,
        time: f64,
        boundary: f64,
        events: u64,
    },
    #[error("cannot segregate negative count {value} of species '{species}'")]
    NegativeCount { species: String, value: f64 },
    #[error("invalid sampling distribution: {0}")]
    Distribution(String),
}
