//! Ensemble statistics over completed trajectories.
//!
//! Moments are accumulated per checkpoint and column with Welford's update,
//! so trajectories can be folded in one at a time as they stream out of the
//! population driver.

use anyhow::{Context, Result};
use circuit_common::Trajectory;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::state::{CELL, SIZE, TIME};

/// Noise strength `var / mean^2` (squared coefficient of variation).
pub fn noise(mean: f64, variance: f64) -> f64 {
    variance / (mean * mean)
}

/// Mean of the last `window` values (all of them if fewer).
pub fn trailing_mean(series: &[f64], window: usize) -> f64 {
    let start = series.len().saturating_sub(window);
    let tail = &series[start..];
    if tail.is_empty() {
        return f64::NAN;
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// Per-checkpoint statistics of one species column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSummary {
    pub name: String,
    pub mean: Vec<f64>,
    /// Population variance across cells.
    pub variance: Vec<f64>,
    pub noise: Vec<f64>,
    /// Mean of count / size, present when the model has a size column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concentration_mean: Option<Vec<f64>>,
    pub steady_mean: f64,
    pub steady_variance: f64,
    pub steady_noise: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleSummary {
    pub cells: u64,
    pub checkpoints: usize,
    pub window: usize,
    pub species: Vec<SpeciesSummary>,
}

/// Streaming accumulator of per-checkpoint moments.
#[derive(Debug, Clone)]
pub struct EnsembleAccumulator {
    species: Vec<String>,
    checkpoints: usize,
    size_column: Option<usize>,
    cells: u64,
    mean: Vec<f64>,
    m2: Vec<f64>,
    concentration: Vec<f64>,
}

impl EnsembleAccumulator {
    /// `size_column` enables the concentration mean (count / size).
    pub fn new(species: &[String], checkpoints: usize, size_column: Option<usize>) -> Self {
        let cells = checkpoints * species.len();
        Self {
            species: species.to_vec(),
            checkpoints,
            size_column,
            cells: 0,
            mean: vec![0.0; cells],
            m2: vec![0.0; cells],
            concentration: if size_column.is_some() { vec![0.0; cells] } else { Vec::new() },
        }
    }

    /// Accumulator matching a model's columns, tracking concentration when column 2 is `size`.
    pub fn for_species(species: &[String], checkpoints: usize) -> Self {
        let size_column = (species.get(SIZE).map(String::as_str) == Some("size")).then_some(SIZE);
        Self::new(species, checkpoints, size_column)
    }

    pub fn cells(&self) -> u64 {
        self.cells
    }

    pub fn push(&mut self, trajectory: &Trajectory) -> Result<()> {
        let columns = self.species.len();
        if trajectory.columns() != columns || trajectory.len() != self.checkpoints {
            anyhow::bail!(
                "Trajectory of cell {} is {}x{}, expected {}x{}",
                trajectory.cell_id,
                trajectory.len(),
                trajectory.columns(),
                self.checkpoints,
                columns
            );
        }
        self.cells += 1;
        let n = self.cells as f64;
        for (i, x) in trajectory.as_slice().iter().enumerate() {
            let delta = x - self.mean[i];
            self.mean[i] += delta / n;
            self.m2[i] += delta * (x - self.mean[i]);
        }
        if let Some(size_col) = self.size_column {
            for (t, row) in trajectory.rows().enumerate() {
                let size = row[size_col];
                for (c, x) in row.iter().enumerate() {
                    let i = t * columns + c;
                    self.concentration[i] += (x / size - self.concentration[i]) / n;
                }
            }
        }
        Ok(())
    }

    fn series(&self, values: &[f64], column: usize) -> Vec<f64> {
        let columns = self.species.len();
        (0..self.checkpoints).map(|t| values[t * columns + column]).collect()
    }

    /// Summaries of every column except `time` and `cell`.
    pub fn finish(&self, window: usize) -> EnsembleSummary {
        let n = self.cells.max(1) as f64;
        let species = (0..self.species.len())
            .filter(|&c| c != TIME && c != CELL)
            .map(|c| {
                let mean = self.series(&self.mean, c);
                let variance: Vec<f64> = self.series(&self.m2, c).into_iter().map(|m2| m2 / n).collect();
                let noise_series = mean.iter().zip(&variance).map(|(m, v)| noise(*m, *v)).collect();
                let steady_mean = trailing_mean(&mean, window);
                let steady_variance = trailing_mean(&variance, window);
                SpeciesSummary {
                    name: self.species[c].clone(),
                    concentration_mean: self.size_column.map(|_| self.series(&self.concentration, c)),
                    steady_noise: noise(steady_mean, steady_variance),
                    mean,
                    variance,
                    noise: noise_series,
                    steady_mean,
                    steady_variance,
                }
            })
            .collect();
        EnsembleSummary { cells: self.cells, checkpoints: self.checkpoints, window, species }
    }
}

/// Writes `summary` to `<base>_stats.json`. Undefined values (e.g. noise at zero mean) become `null`.
pub fn save_summary(base_filename: &str, summary: &EnsembleSummary) -> Result<PathBuf> {
    let filename = PathBuf::from(format!("{}_stats.json", base_filename));
    let file = File::create(&filename)
        .with_context(|| format!("Error creating stats file '{}'", filename.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, summary).context("Error serializing ensemble statistics")?;
    out.flush()?;
    info!("Ensemble statistics over {} cells saved to {}", summary.cells, filename.display());
    Ok(filename)
}
