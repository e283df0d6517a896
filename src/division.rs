//! Exponential growth, stochastic division timing and binomial segregation.
//!
//! The division clock competes with the reaction clocks inside each checkpoint
//! interval. Reaction waiting times use the dilution-corrected form from
//! [`growing_volume_waiting_time`], since the reaction volume keeps growing
//! between events.

use log::trace;
use rand::Rng;
use rand_distr::{Beta, Binomial, Distribution, Normal};

use crate::error::SimulationError;
use crate::network::{CompiledModel, DivisionRule};
use crate::propensity::growing_volume_waiting_time;
use crate::scheduler::{stalled, IntervalOutcome, Scratch};
use crate::state::CellState;

/// Standard deviation of the added-growth factor drawn at each birth.
const DIVISION_FACTOR_SD: f64 = 0.05;
/// Shape parameters of the noisy partition fraction.
const PARTITION_BETA: f64 = 50.0;
/// Standard deviation of a stochastic initial birth size.
const BIRTH_SIZE_SD: f64 = 0.1;

/// `size * exp(mu * dt)`.
#[inline(always)]
pub fn grow(size: f64, mu: f64, dt: f64) -> f64 {
    size * (mu * dt).exp()
}

/// Splits the cell. Returns the retained daughter's size and its share `beta`.
///
/// Without noise the split is exactly even; with noise `beta ~ Beta(50, 50)`.
pub fn divide<R: Rng + ?Sized>(size: f64, noise_at_division: bool, rng: &mut R) -> Result<(f64, f64), SimulationError> {
    if !noise_at_division {
        return Ok((size / 2.0, 0.5));
    }
    let beta = Beta::new(PARTITION_BETA, PARTITION_BETA)
        .map_err(|e| SimulationError::Distribution(e.to_string()))?
        .sample(rng);
    Ok((size * beta, beta))
}

/// Resamples every segregated column as `Binomial(count, beta)`.
///
/// Only the retained daughter is kept; the complementary share is dropped.
pub fn segregate<R: Rng + ?Sized>(
    model: &CompiledModel,
    rule: &DivisionRule,
    state: &mut CellState,
    beta: f64,
    rng: &mut R,
) -> Result<(), SimulationError> {
    for &column in &rule.segregated {
        let n = state.count(column, &model.species()[column])?;
        let kept = Binomial::new(n, beta)
            .map_err(|e| SimulationError::Distribution(e.to_string()))?
            .sample(rng);
        state.set(column, kept as f64);
    }
    Ok(())
}

/// Time until the next division for a cell born at `birth_size`:
/// `ln((birth_size + Normal(1, 0.05)) / birth_size) / mu`, clamped at zero.
pub fn time_to_division<R: Rng + ?Sized>(mu: f64, birth_size: f64, rng: &mut R) -> Result<f64, SimulationError> {
    let added = Normal::new(1.0, DIVISION_FACTOR_SD)
        .map_err(|e| SimulationError::Distribution(e.to_string()))?
        .sample(rng);
    let t = ((birth_size + added) / birth_size).ln() / mu;
    // NaN (a non-positive ratio) also lands on zero.
    Ok(t.max(0.0))
}

/// Initial size of a lineage: fixed, or `Normal(mean, 0.1)` redrawn until positive.
pub fn draw_birth_size<R: Rng + ?Sized>(mean: f64, stochastic: bool, rng: &mut R) -> Result<f64, SimulationError> {
    if !stochastic {
        return Ok(mean);
    }
    let normal = Normal::new(mean, BIRTH_SIZE_SD).map_err(|e| SimulationError::Distribution(e.to_string()))?;
    loop {
        let size = normal.sample(rng);
        if size > 0.0 {
            return Ok(size);
        }
    }
}

/// Ties between the division clock and the next reaction go to division.
#[inline(always)]
pub fn division_first(division_time: f64, tau: f64) -> bool {
    division_time <= tau
}

/// Growth constants of a dividing lineage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Growth {
    pub mu: f64,
    pub noise_at_division: bool,
}

/// Remaining time until the next division.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivisionClock {
    remaining: f64,
}

impl DivisionClock {
    /// Draws a fresh clock for a cell born at `birth_size`.
    pub fn at_birth<R: Rng + ?Sized>(mu: f64, birth_size: f64, rng: &mut R) -> Result<Self, SimulationError> {
        Ok(Self { remaining: time_to_division(mu, birth_size, rng)? })
    }

    pub fn with_remaining(remaining: f64) -> Self {
        Self { remaining }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }
}

/// Advances a growing, dividing cell to `boundary`.
///
/// Micro-steps continue while the next reaction would still land before the
/// boundary. At each step the earlier of the reaction and the division clock
/// fires. At the boundary the cell grows over the residual time, the clock is
/// decremented by it (floored at zero), and time is set to the boundary.
#[allow(clippy::too_many_arguments)]
pub fn advance_with_division<R: Rng + ?Sized>(
    model: &CompiledModel,
    rule: &DivisionRule,
    growth: Growth,
    state: &mut CellState,
    clock: &mut DivisionClock,
    boundary: f64,
    max_events: u64,
    scratch: &mut Scratch,
    rng: &mut R,
) -> Result<IntervalOutcome, SimulationError> {
    let mu = growth.mu;
    let mut outcome = IntervalOutcome::default();
    let mut events: u64 = 0;

    let mut next = {
        let size = state.size();
        scratch.sample_next(model, state, |a| growing_volume_waiting_time(a, mu, size, &mut *rng))
    };
    outcome.frozen = next.is_none();

    while let Some((q, tau)) = next {
        if state.time() + tau >= boundary {
            break;
        }
        if events >= max_events {
            return Err(stalled(state, boundary, events));
        }
        events += 1;

        if division_first(clock.remaining, tau) {
            let dt = clock.remaining;
            let (daughter_size, beta) = divide(state.size(), growth.noise_at_division, rng)?;
            segregate(model, rule, state, beta, rng)?;
            state.set_size(grow(daughter_size, mu, dt));
            state.advance_time(dt);
            clock.remaining = time_to_division(mu, daughter_size, rng)?;
            outcome.divisions += 1;
        } else {
            state.apply(&model.channels()[q].changes);
            state.set_size(grow(state.size(), mu, tau));
            clock.remaining -= tau;
            state.advance_time(tau);
            outcome.reactions += 1;
        }

        let size = state.size();
        next = scratch.sample_next(model, state, |a| growing_volume_waiting_time(a, mu, size, &mut *rng));
    }

    let residual = boundary - state.time();
    state.set_size(grow(state.size(), mu, residual));
    clock.remaining = (clock.remaining - residual).max(0.0);
    state.set_time(boundary);

    trace!(
        "division interval -> t={} ({} reactions, {} divisions, size {:.4}, next division in {:.4})",
        boundary,
        outcome.reactions,
        outcome.divisions,
        state.size(),
        clock.remaining
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{compile, ReactionSpec, SpeciesSpec};
    use circuit_common::RateLaw;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dividing_birth_death(initial_r: f64) -> CompiledModel {
        let species = SpeciesSpec::with_size(1.0).with("r", initial_r);
        let reactions = vec![
            ReactionSpec::new("kr", RateLaw::Constant { k: 5.0 }).create(["r"]),
            ReactionSpec::new("gamma_r", RateLaw::Linear { k: 0.2, species: "r".into() }).destroy(["r"]),
            ReactionSpec::division().segregate(["r"]),
        ];
        compile(&species, &reactions).unwrap()
    }

    #[test]
    fn pure_growth_is_exponential() {
        for &(mu, dt) in &[(0.0, 3.0), (0.05, 0.0), (std::f64::consts::LN_2 / 18.0, 18.0), (0.3, 2.5)] {
            let size = grow(1.7, mu, dt);
            assert!((size - 1.7 * (mu * dt).exp()).abs() < 1e-12);
        }
        assert!((grow(1.0, std::f64::consts::LN_2 / 18.0, 18.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn noiseless_division_halves() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(divide(2.4, false, &mut rng).unwrap(), (1.2, 0.5));
    }

    #[test]
    fn noisy_division_stays_near_half() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let (size, beta) = divide(2.0, true, &mut rng).unwrap();
            assert!(beta > 0.2 && beta < 0.8);
            assert!((size - 2.0 * beta).abs() < 1e-12);
        }
    }

    #[test]
    fn segregation_mean_converges_to_half() {
        let model = dividing_birth_death(0.0);
        let rule = model.division().unwrap().clone();
        let mut rng = StdRng::seed_from_u64(21);
        let trials = 20_000;
        let mut total = 0.0;
        for _ in 0..trials {
            let mut state = CellState::new(&[0.0, 0.0, 2.0, 400.0], 1);
            let (_, beta) = divide(state.size(), false, &mut rng).unwrap();
            segregate(&model, &rule, &mut state, beta, &mut rng).unwrap();
            let kept = state.get(3);
            assert!(kept >= 0.0 && kept <= 400.0);
            total += kept;
        }
        let mean = total / trials as f64;
        assert!((mean - 200.0).abs() < 0.5, "mean was {}", mean);
    }

    #[test]
    fn segregation_rejects_negative_counts() {
        let model = dividing_birth_death(0.0);
        let rule = model.division().unwrap().clone();
        let mut state = CellState::new(&[0.0, 0.0, 2.0, -3.0], 1);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            segregate(&model, &rule, &mut state, 0.5, &mut rng),
            Err(SimulationError::NegativeCount { .. })
        ));
    }

    #[test]
    fn division_time_targets_one_added_unit() {
        let mu = std::f64::consts::LN_2 / 18.0;
        let mut rng = StdRng::seed_from_u64(2);
        let n = 10_000;
        let mean: f64 = (0..n).map(|_| time_to_division(mu, 1.0, &mut rng).unwrap()).sum::<f64>() / n as f64;
        // A unit-size cell adding ~1 unit takes about one doubling time.
        assert!((mean - 18.0).abs() < 0.3, "mean was {}", mean);
    }

    #[test]
    fn ties_go_to_division() {
        assert!(division_first(0.5, 0.5));
        assert!(division_first(0.4, 0.5));
        assert!(!division_first(0.6, 0.5));
    }

    #[test]
    fn stochastic_birth_size_is_positive() {
        let mut rng = StdRng::seed_from_u64(8);
        assert_eq!(draw_birth_size(1.0, false, &mut rng).unwrap(), 1.0);
        for _ in 0..1000 {
            assert!(draw_birth_size(1.0, true, &mut rng).unwrap() > 0.0);
        }
    }

    #[test]
    fn lineage_keeps_clock_and_size_valid() {
        let model = dividing_birth_death(20.0);
        let rule = model.division().unwrap().clone();
        let growth = Growth { mu: std::f64::consts::LN_2 / 18.0, noise_at_division: true };
        let mut rng = StdRng::seed_from_u64(99);
        let mut state = CellState::new(model.initial_values(), 1);
        let mut clock = DivisionClock::at_birth(growth.mu, state.size(), &mut rng).unwrap();
        let mut scratch = Scratch::for_model(&model);

        let mut divisions = 0;
        for step in 1..=200 {
            let outcome = advance_with_division(
                &model, &rule, growth, &mut state, &mut clock, step as f64, 1_000_000, &mut scratch, &mut rng,
            )
            .unwrap();
            divisions += outcome.divisions;
            assert_eq!(state.time(), step as f64);
            assert!(clock.remaining() >= 0.0);
            assert!(state.size() > 0.0);
            assert!(state.get(3) >= 0.0);
        }
        // 200 time units at an 18-unit doubling time.
        assert!(divisions >= 5, "only {} divisions", divisions);
    }

    #[test]
    fn silent_cell_still_grows_to_boundary() {
        let species = SpeciesSpec::with_size(1.0).with("r", 0.0);
        let reactions = vec![
            ReactionSpec::new("gamma_r", RateLaw::Linear { k: 0.2, species: "r".into() }).destroy(["r"]),
            ReactionSpec::division().segregate(["r"]),
        ];
        let model = compile(&species, &reactions).unwrap();
        let rule = model.division().unwrap().clone();
        let growth = Growth { mu: 0.1, noise_at_division: false };
        let mut state = CellState::new(model.initial_values(), 1);
        let mut clock = DivisionClock::with_remaining(0.5);
        let mut scratch = Scratch::for_model(&model);
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = advance_with_division(
            &model, &rule, growth, &mut state, &mut clock, 2.0, 10, &mut scratch, &mut rng,
        )
        .unwrap();
        assert!(outcome.frozen);
        assert!((state.size() - (0.2f64).exp()).abs() < 1e-12);
        assert_eq!(clock.remaining(), 0.0);
        assert_eq!(state.time(), 2.0);
    }
}
