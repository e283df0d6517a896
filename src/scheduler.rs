//! Classic Gillespie scheduler: one competing exponential clock per channel.

use log::trace;
use rand::Rng;

use crate::error::SimulationError;
use crate::network::CompiledModel;
use crate::propensity::{exponential_waiting_time, next_reaction};
use crate::state::{CellState, CELL};

/// What happened while advancing one checkpoint interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntervalOutcome {
    pub reactions: u64,
    pub divisions: u32,
    /// Every propensity was zero, so the state was held until the checkpoint.
    pub frozen: bool,
}

/// Buffers reused across micro-steps so the hot loop does not allocate.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    taus: Vec<f64>,
    args: Vec<f64>,
}

impl Scratch {
    pub fn for_model(model: &CompiledModel) -> Self {
        Self {
            taus: Vec::with_capacity(model.channels().len()),
            args: Vec::new(),
        }
    }

    /// Evaluates every channel's propensity, draws one waiting time per channel
    /// and returns the winner.
    pub(crate) fn sample_next<F>(&mut self, model: &CompiledModel, state: &CellState, mut waiting_time: F) -> Option<(usize, f64)>
    where
        F: FnMut(f64) -> f64,
    {
        self.taus.clear();
        for channel in model.channels() {
            state.gather(&channel.dependencies, &mut self.args);
            let a = channel.rate(&self.args);
            self.taus.push(waiting_time(a));
        }
        next_reaction(&self.taus)
    }
}

pub(crate) fn stalled(state: &CellState, boundary: f64, events: u64) -> SimulationError {
    SimulationError::Stalled {
        cell: state.get(CELL) as u32,
        time: state.time(),
        boundary,
        events,
    }
}

/// Advances `state` to `boundary` with the classic direct-sampling loop.
///
/// An event whose time would reach or pass the boundary is not applied; the
/// state is sampled as-is and the clock set to the boundary. Because every
/// waiting time is redrawn on each step, discarding the overshooting draw does
/// not bias the next interval.
pub fn advance_classic<R: Rng + ?Sized>(
    model: &CompiledModel,
    state: &mut CellState,
    boundary: f64,
    max_events: u64,
    scratch: &mut Scratch,
    rng: &mut R,
) -> Result<IntervalOutcome, SimulationError> {
    let mut outcome = IntervalOutcome::default();

    while state.time() < boundary {
        let Some((q, tau)) = scratch.sample_next(model, state, |a| exponential_waiting_time(a, &mut *rng)) else {
            outcome.frozen = true;
            break;
        };
        if state.time() + tau >= boundary {
            break;
        }
        if outcome.reactions >= max_events {
            return Err(stalled(state, boundary, outcome.reactions));
        }
        state.apply(&model.channels()[q].changes);
        state.advance_time(tau);
        outcome.reactions += 1;
    }

    state.set_time(boundary);
    trace!(
        "classic interval -> t={} ({} reactions{})",
        boundary,
        outcome.reactions,
        if outcome.frozen { ", frozen" } else { "" }
    );
    Ok(outcome)
}
