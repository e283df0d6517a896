//! Batches of independent lineages, simulated in parallel with Rayon.
//!
//! Every cell draws from its own `StdRng`, seeded from the run seed and the
//! cell id, so results do not depend on thread count or scheduling order.

use std::ops::Range;
use std::sync::mpsc::sync_channel;

use anyhow::{Context, Result};
use log::{error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::driver::CellSimulator;
use circuit_common::Trajectory;

/// Trajectories buffered between the workers and the writer.
const CHANNEL_CAPACITY: usize = 64;

/// Seed of the random stream for `cell_id` (SplitMix64 over the run seed).
pub fn derive_seed(seed: u64, cell_id: u32) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;
    let mut z = seed ^ (cell_id as u64).wrapping_mul(GOLDEN_GAMMA);
    z = z.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Independent random stream for one lineage.
pub fn cell_rng(seed: u64, cell_id: u32) -> StdRng {
    StdRng::seed_from_u64(derive_seed(seed, cell_id))
}

/// Simulates every cell in `cells` in parallel and returns the trajectories in cell-id order.
pub fn simulate_population(sim: &CellSimulator, cells: Range<u32>, seed: u64) -> Result<Vec<Trajectory>> {
    info!("Simulating {} cells on {} Rayon threads...", cells.len(), rayon::current_num_threads());
    cells
        .into_par_iter()
        .map(|cell_id| {
            sim.simulate(cell_id, &mut cell_rng(seed, cell_id))
                .with_context(|| format!("cell {} failed", cell_id))
        })
        .collect()
}

/// Simulates every cell in `cells` and hands each finished trajectory to `sink`.
///
/// Workers only send; `sink` runs on the calling thread, so it is the single
/// writer for whatever output it owns. Delivery order follows completion, not
/// cell id. Returns the number of trajectories delivered.
pub fn stream_population<F>(sim: &CellSimulator, cells: Range<u32>, seed: u64, mut sink: F) -> Result<usize>
where
    F: FnMut(Trajectory) -> Result<()>,
{
    let (sender, receiver) = sync_channel::<Trajectory>(CHANNEL_CAPACITY);
    info!("Streaming {} cells on {} Rayon threads...", cells.len(), rayon::current_num_threads());

    std::thread::scope(|scope| {
        let producer = scope.spawn(move || -> Result<()> {
            cells.into_par_iter().try_for_each_with(sender, |tx, cell_id| {
                let trajectory = sim
                    .simulate(cell_id, &mut cell_rng(seed, cell_id))
                    .with_context(|| format!("cell {} failed", cell_id))?;
                tx.send(trajectory)
                    .map_err(|_| anyhow::anyhow!("trajectory writer stopped before cell {}", cell_id))
            })
        });

        let mut delivered = 0usize;
        let mut sink_result = Ok(());
        for trajectory in receiver.iter() {
            if let Err(e) = sink(trajectory) {
                error!("Trajectory sink failed after {} trajectories: {}", delivered, e);
                sink_result = Err(e);
                break;
            }
            delivered += 1;
        }
        // Dropping the receiver makes any still-running workers fail fast.
        drop(receiver);

        let produced = producer
            .join()
            .map_err(|_| anyhow::anyhow!("simulation worker panicked"))?;
        sink_result?;
        produced?;
        Ok(delivered)
    })
}
