use crate::checkpoints::CheckpointGrid;
use crate::division::{advance_with_division, draw_birth_size, DivisionClock, Growth};
use crate::error::{ConfigurationError, SimulationError};
use crate::network::{CompiledModel, DivisionRule};
use crate::scheduler::{advance_classic, IntervalOutcome, Scratch};
use crate::state::CellState;
use circuit_common::{SimParams, SimulationMode, Trajectory};
use log::{debug, warn};
use rand::Rng;

/// Per-lineage event totals, reported alongside the trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineageSummary {
    pub reactions: u64,
    pub divisions: u64,
    pub frozen_intervals: u32,
}

impl LineageSummary {
    fn record(&mut self, outcome: IntervalOutcome) {
        self.reactions += outcome.reactions;
        self.divisions += outcome.divisions as u64;
        if outcome.frozen {
            self.frozen_intervals += 1;
        }
    }
}

/// Simulates single lineages of a compiled model over the checkpoint grid.
///
/// Holds no mutable state: every call to [`CellSimulator::simulate`] owns its
/// state vector and draws only from the random stream it is given, so one
/// simulator can be shared by many worker threads.
#[derive(Debug, Clone)]
pub struct CellSimulator {
    model: CompiledModel,
    params: SimParams,
    grid: CheckpointGrid,
    engine: Engine,
}

/// Interval stepper selected from the simulation mode.
#[derive(Debug, Clone)]
enum Engine {
    Classic,
    Division { rule: DivisionRule, growth: Growth },
}

impl CellSimulator {
    /// Checks that `params` and `model` fit together before any simulation work.
    pub fn new(model: CompiledModel, params: SimParams) -> Result<Self, ConfigurationError> {
        let grid = CheckpointGrid::new(params.horizon, params.sampling_interval)?;
        if params.max_events_per_interval == 0 {
            return Err(ConfigurationError::InvalidParameter { name: "max_events_per_interval", value: 0.0 });
        }
        let engine = match params.mode {
            SimulationMode::Classic => Engine::Classic,
            SimulationMode::Division => {
                if !model.has_size_column() {
                    return Err(ConfigurationError::MissingSizeColumn);
                }
                let rule = model.division().cloned().ok_or(ConfigurationError::MissingDivision)?;
                if !(params.mu > 0.0) || !params.mu.is_finite() {
                    return Err(ConfigurationError::InvalidParameter { name: "mu", value: params.mu });
                }
                if !(params.birth_size > 0.0) {
                    return Err(ConfigurationError::InvalidParameter { name: "birth_size", value: params.birth_size });
                }
                let growth = Growth { mu: params.mu, noise_at_division: params.noise_at_division };
                Engine::Division { rule, growth }
            }
        };
        Ok(Self { model, params, grid, engine })
    }

    pub fn model(&self) -> &CompiledModel {
        &self.model
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn grid(&self) -> &CheckpointGrid {
        &self.grid
    }

    /// Simulates one lineage and returns its trajectory.
    pub fn simulate<R: Rng + ?Sized>(&self, cell_id: u32, rng: &mut R) -> Result<Trajectory, SimulationError> {
        self.simulate_with_summary(cell_id, rng).map(|(trajectory, _)| trajectory)
    }

    /// Simulates one lineage, also returning its event totals.
    pub fn simulate_with_summary<R: Rng + ?Sized>(
        &self,
        cell_id: u32,
        rng: &mut R,
    ) -> Result<(Trajectory, LineageSummary), SimulationError> {
        let columns = self.model.species().len();
        let mut trajectory = Trajectory::with_capacity(cell_id, columns, self.grid.len());
        let mut summary = LineageSummary::default();
        let mut scratch = Scratch::for_model(&self.model);
        let mut state = CellState::new(self.model.initial_values(), cell_id);
        let max_events = self.params.max_events_per_interval;

        match &self.engine {
            Engine::Classic => {
                trajectory.push_row(state.as_slice());
                for i in 1..self.grid.len() {
                    let outcome = advance_classic(&self.model, &mut state, self.grid.time(i), max_events, &mut scratch, rng)?;
                    summary.record(outcome);
                    state.set_cell(cell_id);
                    trajectory.push_row(state.as_slice());
                }
            }
            Engine::Division { rule, growth } => {
                let birth_size = draw_birth_size(self.params.birth_size, self.params.stochastic_birth_size, rng)?;
                state.set_size(birth_size);
                let mut clock = DivisionClock::at_birth(growth.mu, birth_size, rng)?;

                trajectory.push_row(state.as_slice());
                for i in 1..self.grid.len() {
                    let outcome = advance_with_division(
                        &self.model,
                        rule,
                        *growth,
                        &mut state,
                        &mut clock,
                        self.grid.time(i),
                        max_events,
                        &mut scratch,
                        rng,
                    )?;
                    summary.record(outcome);
                    state.set_cell(cell_id);
                    trajectory.push_row(state.as_slice());
                }
            }
        }

        if self.params.mode == SimulationMode::Classic && summary.frozen_intervals > 0 {
            warn!(
                "Cell {}: all propensities vanished in {} of {} intervals; state held until the next checkpoint.",
                cell_id,
                summary.frozen_intervals,
                self.grid.len().saturating_sub(1)
            );
        }
        debug!(
            "Cell {} done: {} checkpoints, {} reactions, {} divisions.",
            cell_id,
            trajectory.len(),
            summary.reactions,
            summary.divisions
        );
        Ok((trajectory, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{compile, ReactionSpec, SpeciesSpec};
    use crate::state::{SIZE, TIME};
    use circuit_common::RateLaw;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn birth_death(with_size: bool) -> CompiledModel {
        let base = if with_size { SpeciesSpec::with_size(1.0) } else { SpeciesSpec::classic() };
        let species = base.with("r", 0.0);
        let mut reactions = vec![
            ReactionSpec::new("kr", RateLaw::Constant { k: 5.0 }).create(["r"]),
            ReactionSpec::new("gamma_r", RateLaw::Linear { k: 0.2, species: "r".into() }).destroy(["r"]),
        ];
        if with_size {
            reactions.push(ReactionSpec::division().segregate(["r"]));
        }
        compile(&species, &reactions).unwrap()
    }

    #[test]
    fn classic_birth_death_end_to_end() {
        let sim = CellSimulator::new(birth_death(false), SimParams::classic(40.0, 1.0)).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let trajectory = sim.simulate(1, &mut rng).unwrap();

        assert_eq!(trajectory.len(), 40);
        assert_eq!(trajectory.columns(), 3);
        for (i, t) in trajectory.column(TIME).enumerate() {
            assert_eq!(t, i as f64);
        }
        assert!(trajectory.column(1).all(|c| c == 1.0));
        assert!(trajectory.column(2).all(|r| r >= 0.0));
        assert!(trajectory.column(2).any(|r| r > 0.0));
    }

    #[test]
    fn division_birth_death_end_to_end() {
        let params = SimParams::division(40.0, 1.0, 18.0).with_division_noise(true);
        let sim = CellSimulator::new(birth_death(true), params).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let (trajectory, summary) = sim.simulate_with_summary(3, &mut rng).unwrap();

        assert_eq!(trajectory.len(), 40);
        assert_eq!(trajectory.columns(), 4);
        for (i, t) in trajectory.column(TIME).enumerate() {
            assert_eq!(t, i as f64);
        }
        assert!(trajectory.column(1).all(|c| c == 3.0));
        assert!(trajectory.column(SIZE).all(|s| s > 0.0));
        assert!(trajectory.column(3).all(|r| r >= 0.0));
        assert!(summary.divisions >= 1);
    }

    #[test]
    fn same_seed_same_trajectory() {
        let sim = CellSimulator::new(birth_death(false), SimParams::classic(20.0, 0.5)).unwrap();
        let a = sim.simulate(1, &mut StdRng::seed_from_u64(5)).unwrap();
        let b = sim.simulate(1, &mut StdRng::seed_from_u64(5)).unwrap();
        let c = sim.simulate(1, &mut StdRng::seed_from_u64(6)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn division_mode_requires_division_rule_and_size() {
        let params = SimParams::division(10.0, 1.0, 18.0);
        assert_eq!(
            CellSimulator::new(birth_death(false), params.clone()).unwrap_err(),
            ConfigurationError::MissingSizeColumn
        );

        let species = SpeciesSpec::with_size(1.0).with("r", 0.0);
        let reactions = vec![ReactionSpec::new("kr", RateLaw::Constant { k: 5.0 }).create(["r"])];
        let model = compile(&species, &reactions).unwrap();
        assert_eq!(CellSimulator::new(model, params).unwrap_err(), ConfigurationError::MissingDivision);
    }

    #[test]
    fn classic_mode_ignores_division_row() {
        let sim = CellSimulator::new(birth_death(true), SimParams::classic(10.0, 1.0)).unwrap();
        let trajectory = sim.simulate(1, &mut StdRng::seed_from_u64(1)).unwrap();
        // Size is an ordinary untouched column without growth.
        assert!(trajectory.column(SIZE).all(|s| s == 1.0));
    }

    #[test]
    fn frozen_model_still_fills_the_grid() {
        let species = SpeciesSpec::classic().with("r", 0.0);
        let reactions = vec![
            ReactionSpec::new("gamma_r", RateLaw::Linear { k: 0.2, species: "r".into() }).destroy(["r"]),
        ];
        let model = compile(&species, &reactions).unwrap();
        let sim = CellSimulator::new(model, SimParams::classic(5.0, 1.0)).unwrap();
        let (trajectory, summary) = sim.simulate_with_summary(1, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(trajectory.column(TIME).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(summary.frozen_intervals, 4);
    }
}
