//! Reaction-network compiler.
//!
//! Turns ordered species and reaction declarations into a [`CompiledModel`]:
//! species names resolved to column indices once, a tagged stoichiometry
//! table, and the propensity channels the schedulers iterate over.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use circuit_common::{RateLaw, ReactionEntry, SpeciesEntry};

use crate::error::ConfigurationError;
use crate::propensity::Propensity;
use crate::state::{CELL, SIZE, TIME};

/// Name of the pseudo-reaction that declares segregated species.
pub const DIVISION: &str = "division";

/// Effect a reaction has on one species column.
///
/// Declaration order of the variants is the precedence used when a column is
/// listed under several kinds of the same reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReactionKind {
    Create,
    Destroy,
    Burst,
    Segregate,
    CreateMrna,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 5] = [
        ReactionKind::Create,
        ReactionKind::Destroy,
        ReactionKind::Burst,
        ReactionKind::Segregate,
        ReactionKind::CreateMrna,
    ];
}

/// One entry of the stoichiometry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Change {
    #[default]
    None,
    Create,
    Destroy,
    Burst,
    /// Marks a column for binomial partitioning at division. Never added to the state.
    Segregate,
    CreateMrna,
}

impl Change {
    /// Increment added to the state when the owning reaction fires.
    pub fn delta(self) -> f64 {
        match self {
            Change::None | Change::Segregate => 0.0,
            Change::Create => 1.0,
            Change::Destroy => -1.0,
            Change::Burst => 100.0,
            Change::CreateMrna => 7.0,
        }
    }

    /// Numeric code used by the dense export of the table.
    pub fn code(self) -> f64 {
        match self {
            Change::Segregate => 5.0,
            other => other.delta(),
        }
    }
}

impl From<ReactionKind> for Change {
    fn from(kind: ReactionKind) -> Self {
        match kind {
            ReactionKind::Create => Change::Create,
            ReactionKind::Destroy => Change::Destroy,
            ReactionKind::Burst => Change::Burst,
            ReactionKind::Segregate => Change::Segregate,
            ReactionKind::CreateMrna => Change::CreateMrna,
        }
    }
}

/// Ordered species declaration. Column 0 is `time`, column 1 is `cell`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeciesSpec {
    entries: Vec<(String, f64)>,
}

impl SpeciesSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Species spec with the reserved `time` and `cell` columns already declared.
    pub fn classic() -> Self {
        Self::new().with(TIME_NAME, 0.0).with(CELL_NAME, 0.0)
    }

    /// Species spec with `time`, `cell` and `size` already declared.
    pub fn with_size(birth_size: f64) -> Self {
        Self::classic().with(SIZE_NAME, birth_size)
    }

    pub fn with(mut self, name: impl Into<String>, initial: f64) -> Self {
        self.entries.push((name.into(), initial));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

const TIME_NAME: &str = "time";
const CELL_NAME: &str = "cell";
const SIZE_NAME: &str = "size";

#[derive(Clone)]
enum ReactionRule {
    Channel {
        arguments: Vec<String>,
        propensity: Arc<dyn Propensity>,
    },
    Division,
}

/// A reaction declaration: either a propensity channel or the `division` pseudo-reaction.
#[derive(Clone)]
pub struct ReactionSpec {
    name: String,
    rule: Option<ReactionRule>,
    effects: Vec<(ReactionKind, Vec<String>)>,
}

impl fmt::Debug for ReactionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionSpec")
            .field("name", &self.name)
            .field("effects", &self.effects)
            .finish()
    }
}

impl ReactionSpec {
    /// A channel whose propensity is a declarative rate law.
    pub fn new(name: impl Into<String>, law: RateLaw) -> Self {
        let arguments = law.arguments();
        Self {
            name: name.into(),
            rule: Some(ReactionRule::Channel { arguments, propensity: Arc::new(law) }),
            effects: Vec::new(),
        }
    }

    /// A channel with an arbitrary propensity bound to the named argument species.
    pub fn custom<I, S, P>(name: impl Into<String>, arguments: I, propensity: P) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        P: Propensity + 'static,
    {
        Self {
            name: name.into(),
            rule: Some(ReactionRule::Channel {
                arguments: arguments.into_iter().map(Into::into).collect(),
                propensity: Arc::new(propensity),
            }),
            effects: Vec::new(),
        }
    }

    /// The `division` pseudo-reaction.
    pub fn division() -> Self {
        Self { name: DIVISION.to_string(), rule: Some(ReactionRule::Division), effects: Vec::new() }
    }

    /// A reaction read from a config table. A missing rate is resolved at compile time.
    pub fn from_entry(entry: &ReactionEntry) -> Self {
        let rule = match &entry.rate {
            Some(law) => Some(ReactionRule::Channel {
                arguments: law.arguments(),
                propensity: Arc::new(law.clone()),
            }),
            None if entry.name == DIVISION => Some(ReactionRule::Division),
            None => None,
        };
        let mut spec = Self { name: entry.name.clone(), rule, effects: Vec::new() };
        for (kind, species) in [
            (ReactionKind::Create, &entry.create),
            (ReactionKind::Destroy, &entry.destroy),
            (ReactionKind::Burst, &entry.burst),
            (ReactionKind::Segregate, &entry.segregate),
            (ReactionKind::CreateMrna, &entry.create_mrna),
        ] {
            if !species.is_empty() {
                spec = spec.affects(kind, species.iter().cloned());
            }
        }
        spec
    }

    pub fn affects<I, S>(mut self, kind: ReactionKind, species: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.effects.push((kind, species.into_iter().map(Into::into).collect()));
        self
    }

    pub fn create<I: IntoIterator<Item = S>, S: Into<String>>(self, species: I) -> Self {
        self.affects(ReactionKind::Create, species)
    }

    pub fn destroy<I: IntoIterator<Item = S>, S: Into<String>>(self, species: I) -> Self {
        self.affects(ReactionKind::Destroy, species)
    }

    pub fn burst<I: IntoIterator<Item = S>, S: Into<String>>(self, species: I) -> Self {
        self.affects(ReactionKind::Burst, species)
    }

    pub fn segregate<I: IntoIterator<Item = S>, S: Into<String>>(self, species: I) -> Self {
        self.affects(ReactionKind::Segregate, species)
    }

    pub fn create_mrna<I: IntoIterator<Item = S>, S: Into<String>>(self, species: I) -> Self {
        self.affects(ReactionKind::CreateMrna, species)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change this reaction applies to the named species, after kind precedence.
    fn change_for(&self, species: &str) -> Change {
        self.effects
            .iter()
            .filter(|(_, names)| names.iter().any(|n| n == species))
            .map(|(kind, _)| *kind)
            .min()
            .map(Change::from)
            .unwrap_or_default()
    }
}

/// Species and reaction declarations of one model.
#[derive(Debug, Clone, Default)]
pub struct ModelSpec {
    pub species: SpeciesSpec,
    pub reactions: Vec<ReactionSpec>,
}

impl ModelSpec {
    pub fn from_config(species: &[SpeciesEntry], reactions: &[ReactionEntry]) -> Self {
        let species = species
            .iter()
            .fold(SpeciesSpec::new(), |spec, entry| spec.with(entry.name.clone(), entry.initial));
        let reactions = reactions.iter().map(ReactionSpec::from_entry).collect();
        Self { species, reactions }
    }

    pub fn compile(&self) -> Result<CompiledModel, ConfigurationError> {
        compile(&self.species, &self.reactions)
    }
}

/// Reactions x species table of [`Change`] entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Stoichiometry {
    rows: usize,
    columns: usize,
    entries: Vec<Change>,
}

impl Stoichiometry {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn get(&self, row: usize, column: usize) -> Change {
        self.entries[row * self.columns + column]
    }

    pub fn row(&self, row: usize) -> &[Change] {
        &self.entries[row * self.columns..(row + 1) * self.columns]
    }

    /// Dense numeric view: create 1, destroy -1, burst 100, segregate 5, create_mrna 7.
    pub fn codes(&self) -> Vec<Vec<f64>> {
        self.entries
            .chunks(self.columns.max(1))
            .map(|row| row.iter().map(|c| c.code()).collect())
            .collect()
    }
}

/// A reaction channel with its dependencies resolved to columns.
#[derive(Clone)]
pub struct Channel {
    pub name: String,
    /// Row of this channel in the stoichiometry table.
    pub row: usize,
    pub dependencies: Vec<usize>,
    /// Non-zero increments applied on firing.
    pub changes: Vec<(usize, f64)>,
    propensity: Arc<dyn Propensity>,
}

impl Channel {
    /// Propensity evaluated on the gathered argument values.
    #[inline]
    pub fn rate(&self, args: &[f64]) -> f64 {
        self.propensity.rate(args)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("row", &self.row)
            .field("dependencies", &self.dependencies)
            .field("changes", &self.changes)
            .finish()
    }
}

/// Location of the `division` pseudo-reaction and the columns it partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct DivisionRule {
    pub row: usize,
    pub segregated: Vec<usize>,
}

/// Indexed numeric form of a model.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    species: Vec<String>,
    initial: Vec<f64>,
    stoichiometry: Stoichiometry,
    channels: Vec<Channel>,
    division: Option<DivisionRule>,
}

impl CompiledModel {
    pub fn species(&self) -> &[String] {
        &self.species
    }

    pub fn initial_values(&self) -> &[f64] {
        &self.initial
    }

    pub fn stoichiometry(&self) -> &Stoichiometry {
        &self.stoichiometry
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn division(&self) -> Option<&DivisionRule> {
        self.division.as_ref()
    }

    pub fn division_index(&self) -> Option<usize> {
        self.division.as_ref().map(|d| d.row)
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s == name)
    }

    /// True when column 2 is the reserved `size` column.
    pub fn has_size_column(&self) -> bool {
        self.species.get(SIZE).map(String::as_str) == Some(SIZE_NAME)
    }
}

/// Compiles species and reaction declarations into a [`CompiledModel`].
///
/// Pure: the declarations are only read.
pub fn compile(species: &SpeciesSpec, reactions: &[ReactionSpec]) -> Result<CompiledModel, ConfigurationError> {
    if species.len() < 2 {
        return Err(ConfigurationError::EmptySpecies);
    }
    if reactions.is_empty() {
        return Err(ConfigurationError::EmptyReactions);
    }
    for (index, expected) in [(TIME, TIME_NAME), (CELL, CELL_NAME)] {
        let found = &species.entries[index].0;
        if found != expected {
            return Err(ConfigurationError::ReservedSpecies { index, expected, found: found.clone() });
        }
    }

    let mut columns: HashMap<&str, usize> = HashMap::with_capacity(species.len());
    for (index, (name, _)) in species.entries.iter().enumerate() {
        if columns.insert(name.as_str(), index).is_some() {
            return Err(ConfigurationError::DuplicateSpecies(name.clone()));
        }
    }
    let is_reserved = |column: usize| {
        column == TIME || column == CELL || (column == SIZE && species.entries[SIZE].0 == SIZE_NAME)
    };

    let n_columns = species.len();
    let mut entries = vec![Change::None; reactions.len() * n_columns];
    let mut channels = Vec::new();
    let mut division = None;

    for (row, reaction) in reactions.iter().enumerate() {
        // Every affected name must exist and must not be a reserved column.
        for (_, names) in &reaction.effects {
            for name in names {
                let column = *columns.get(name.as_str()).ok_or_else(|| ConfigurationError::UnknownSpecies {
                    reaction: reaction.name.clone(),
                    species: name.clone(),
                })?;
                if is_reserved(column) {
                    return Err(ConfigurationError::ReservedColumn {
                        reaction: reaction.name.clone(),
                        species: name.clone(),
                    });
                }
            }
        }

        let table_row = &mut entries[row * n_columns..(row + 1) * n_columns];
        for (column, (name, _)) in species.entries.iter().enumerate() {
            table_row[column] = reaction.change_for(name);
        }

        match &reaction.rule {
            Some(ReactionRule::Division) => {
                if division.is_some() {
                    return Err(ConfigurationError::DuplicateDivision);
                }
                let segregated: Vec<usize> = table_row
                    .iter()
                    .enumerate()
                    .filter(|(_, change)| **change == Change::Segregate)
                    .map(|(column, _)| column)
                    .collect();
                if segregated.is_empty() {
                    return Err(ConfigurationError::NoSegregatedSpecies);
                }
                division = Some(DivisionRule { row, segregated });
            }
            Some(ReactionRule::Channel { .. }) if reaction.name == DIVISION => {
                return Err(ConfigurationError::DivisionHasRate);
            }
            Some(ReactionRule::Channel { arguments, propensity }) => {
                let dependencies = arguments
                    .iter()
                    .map(|arg| {
                        columns.get(arg.as_str()).copied().ok_or_else(|| ConfigurationError::UnknownSpecies {
                            reaction: reaction.name.clone(),
                            species: arg.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let changes = table_row
                    .iter()
                    .enumerate()
                    .filter(|(_, change)| change.delta() != 0.0)
                    .map(|(column, change)| (column, change.delta()))
                    .collect();
                channels.push(Channel {
                    name: reaction.name.clone(),
                    row,
                    dependencies,
                    changes,
                    propensity: Arc::clone(propensity),
                });
            }
            None => {
                return Err(ConfigurationError::MissingRate { reaction: reaction.name.clone() });
            }
        }
    }

    Ok(CompiledModel {
        species: species.entries.iter().map(|(name, _)| name.clone()).collect(),
        initial: species.entries.iter().map(|(_, value)| *value).collect(),
        stoichiometry: Stoichiometry { rows: reactions.len(), columns: n_columns, entries },
        channels,
        division,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn birth_death() -> (SpeciesSpec, Vec<ReactionSpec>) {
        let species = SpeciesSpec::classic().with("r", 0.0).with("p", 0.0);
        let reactions = vec![
            ReactionSpec::new("kr", RateLaw::Constant { k: 5.0 }).create(["r"]),
            ReactionSpec::new("kp", RateLaw::Linear { k: 10.0, species: "r".into() }).create(["p"]),
            ReactionSpec::new("gamma_r", RateLaw::Linear { k: 0.2, species: "r".into() }).destroy(["r"]),
            ReactionSpec::new("gamma_p", RateLaw::Linear { k: 0.4, species: "p".into() }).destroy(["p"]),
        ];
        (species, reactions)
    }

    #[test]
    fn builds_birth_death_stoichiometry() {
        let (species, reactions) = birth_death();
        let model = compile(&species, &reactions).unwrap();
        let table = model.stoichiometry();
        assert_eq!((table.rows(), table.columns()), (4, 4));

        let species_block: Vec<Vec<f64>> = table.codes().iter().map(|row| row[2..].to_vec()).collect();
        assert_eq!(
            species_block,
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]]
        );
        // Reserved columns are untouched by every reaction.
        assert!(table.codes().iter().all(|row| row[0] == 0.0 && row[1] == 0.0));
    }

    #[test]
    fn resolves_dependencies_to_columns() {
        let (species, reactions) = birth_death();
        let model = compile(&species, &reactions).unwrap();
        let deps: Vec<Vec<usize>> = model.channels().iter().map(|c| c.dependencies.clone()).collect();
        assert_eq!(deps, vec![vec![], vec![2], vec![2], vec![3]]);
        assert_eq!(model.channels()[2].changes, vec![(2, -1.0)]);
    }

    #[test]
    fn unknown_argument_is_a_configuration_error() {
        let species = SpeciesSpec::classic().with("r", 0.0);
        let reactions = vec![ReactionSpec::custom("bad", ["q"], |x: &[f64]| x[0]).create(["r"])];
        assert_eq!(
            compile(&species, &reactions).unwrap_err(),
            ConfigurationError::UnknownSpecies { reaction: "bad".into(), species: "q".into() }
        );
    }

    #[test]
    fn kind_precedence_resolves_overlaps() {
        let species = SpeciesSpec::classic().with("m", 0.0).with("p", 0.0);
        let reactions = vec![ReactionSpec::new("mixed", RateLaw::Constant { k: 1.0 })
            .create_mrna(["m"])
            .burst(["m", "p"])
            .destroy(["p"])];
        let model = compile(&species, &reactions).unwrap();
        assert_eq!(model.stoichiometry().get(0, 2), Change::Burst);
        assert_eq!(model.stoichiometry().get(0, 3), Change::Destroy);
        assert_eq!(model.channels()[0].changes, vec![(2, 100.0), (3, -1.0)]);
    }

    #[test]
    fn legacy_codes_for_every_kind() {
        let species = SpeciesSpec::with_size(1.0)
            .with("a", 0.0)
            .with("b", 0.0)
            .with("c", 0.0)
            .with("d", 0.0)
            .with("e", 0.0);
        let reactions = vec![
            ReactionSpec::new("all", RateLaw::Constant { k: 1.0 })
                .create(["a"])
                .destroy(["b"])
                .burst(["c"])
                .segregate(["d"])
                .create_mrna(["e"]),
        ];
        let model = compile(&species, &reactions).unwrap();
        assert_eq!(model.stoichiometry().codes()[0], vec![0.0, 0.0, 0.0, 1.0, -1.0, 100.0, 5.0, 7.0]);
        // The segregation flag is never part of the firing increments.
        assert!(model.channels()[0].changes.iter().all(|&(column, _)| column != 6));
    }

    #[test]
    fn separates_division_pseudo_reaction() {
        let species = SpeciesSpec::with_size(1.0).with("r", 0.0).with("p", 0.0);
        let reactions = vec![
            ReactionSpec::new("kr", RateLaw::Constant { k: 5.0 }).create(["r"]),
            ReactionSpec::division().segregate(["r", "p"]),
            ReactionSpec::new("gamma_r", RateLaw::Linear { k: 0.2, species: "r".into() }).destroy(["r"]),
        ];
        let model = compile(&species, &reactions).unwrap();
        assert_eq!(model.stoichiometry().rows(), 3);
        assert_eq!(model.channels().len(), 2);
        assert_eq!(model.channels()[1].row, 2);
        assert_eq!(model.division(), Some(&DivisionRule { row: 1, segregated: vec![3, 4] }));
        assert!(model.has_size_column());
    }

    #[test]
    fn division_must_segregate_something() {
        let species = SpeciesSpec::with_size(1.0).with("r", 0.0);
        let reactions = vec![
            ReactionSpec::new("kr", RateLaw::Constant { k: 5.0 }).create(["r"]),
            ReactionSpec::division(),
        ];
        assert_eq!(compile(&species, &reactions).unwrap_err(), ConfigurationError::NoSegregatedSpecies);
    }

    #[test]
    fn rejects_malformed_declarations() {
        let no_reserved = SpeciesSpec::new().with("r", 0.0).with("p", 0.0);
        let reactions = vec![ReactionSpec::new("kr", RateLaw::Constant { k: 1.0 }).create(["r"])];
        assert!(matches!(
            compile(&no_reserved, &reactions),
            Err(ConfigurationError::ReservedSpecies { index: 0, .. })
        ));

        let species = SpeciesSpec::classic().with("r", 0.0);
        assert_eq!(compile(&species, &[]).unwrap_err(), ConfigurationError::EmptyReactions);

        let duplicate = SpeciesSpec::classic().with("r", 0.0).with("r", 1.0);
        assert_eq!(
            compile(&duplicate, &reactions).unwrap_err(),
            ConfigurationError::DuplicateSpecies("r".into())
        );

        let touches_time = vec![ReactionSpec::new("clock", RateLaw::Constant { k: 1.0 }).create(["time"])];
        assert!(matches!(
            compile(&species, &touches_time),
            Err(ConfigurationError::ReservedColumn { .. })
        ));
    }

    #[test]
    fn config_tables_compile() {
        let species = vec![
            SpeciesEntry { name: "time".into(), initial: 0.0 },
            SpeciesEntry { name: "cell".into(), initial: 0.0 },
            SpeciesEntry { name: "r".into(), initial: 3.0 },
        ];
        let reactions = vec![
            ReactionEntry {
                name: "kr".into(),
                rate: Some(RateLaw::Constant { k: 5.0 }),
                create: vec!["r".into()],
                ..Default::default()
            },
            ReactionEntry { name: "orphan".into(), destroy: vec!["r".into()], ..Default::default() },
        ];
        let spec = ModelSpec::from_config(&species, &reactions);
        assert_eq!(
            spec.compile().unwrap_err(),
            ConfigurationError::MissingRate { reaction: "orphan".into() }
        );

        let spec = ModelSpec::from_config(&species, &reactions[..1]);
        let model = spec.compile().unwrap();
        assert_eq!(model.initial_values(), &[0.0, 0.0, 3.0]);
        assert_eq!(model.column("r"), Some(2));
        assert_eq!(model.division_index(), None);
    }
}
