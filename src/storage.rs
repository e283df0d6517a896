//! Trajectory persistence.

use anyhow::{Context, Result};
use circuit_common::Trajectory;
use log::{info, warn};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serialized formats for in-memory batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Bincode,
    MessagePack,
}

impl OutputFormat {
    /// Parses a config value, falling back to CSV for unknown names.
    pub fn from_config(name: Option<&str>) -> Self {
        match name.unwrap_or("csv") {
            "csv" => OutputFormat::Csv,
            "json" => OutputFormat::Json,
            "bincode" => OutputFormat::Bincode,
            "messagepack" => OutputFormat::MessagePack,
            other => {
                warn!("Unknown output format: {}. Using CSV instead.", other);
                OutputFormat::Csv
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Bincode => "bin",
            OutputFormat::MessagePack => "msgpack",
        }
    }
}

/// Appends trajectories to one CSV file with a single species-name header.
///
/// Meant to be owned by exactly one writer; see `population::stream_population`.
pub struct CsvTrajectoryWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    columns: usize,
    rows_written: u64,
}

impl CsvTrajectoryWriter {
    /// Creates (or truncates) `path` and writes the header line.
    pub fn create<P: AsRef<Path>>(path: P, species: &[String]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create trajectory file '{}'", path.display()))?;
        writer.write_record(species)?;
        Ok(Self { writer, path, columns: species.len(), rows_written: 0 })
    }

    /// Writes one row per checkpoint of `trajectory`.
    pub fn append(&mut self, trajectory: &Trajectory) -> Result<()> {
        if trajectory.columns() != self.columns {
            anyhow::bail!(
                "Trajectory of cell {} has {} columns, file '{}' has {}",
                trajectory.cell_id,
                trajectory.columns(),
                self.path.display(),
                self.columns
            );
        }
        for row in trajectory.rows() {
            self.writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        self.rows_written += trajectory.len() as u64;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flushes buffered rows and returns the file path.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        info!("{} trajectory rows saved to {}", self.rows_written, self.path.display());
        Ok(self.path)
    }
}

/// Saves a batch of trajectories to `<base>.<ext>` in the requested format.
pub fn save_trajectories(base_filename: &str, format: OutputFormat, species: &[String], trajectories: &[Trajectory]) -> Result<PathBuf> {
    let filename = PathBuf::from(format!("{}.{}", base_filename, format.extension()));
    match format {
        OutputFormat::Csv => {
            let mut writer = CsvTrajectoryWriter::create(&filename, species)?;
            for trajectory in trajectories {
                writer.append(trajectory)?;
            }
            writer.finish()?;
        }
        OutputFormat::Json => {
            let file = File::create(&filename)
                .with_context(|| format!("Error creating trajectory file '{}'", filename.display()))?;
            let mut out = BufWriter::new(file);
            serde_json::to_writer(&mut out, trajectories).context("Error serializing trajectories to JSON")?;
            out.flush()?;
            info!("All trajectories saved to {}", filename.display());
        }
        OutputFormat::Bincode => {
            let file = File::create(&filename)
                .with_context(|| format!("Error creating trajectory file '{}'", filename.display()))?;
            let mut out = BufWriter::new(file);
            bincode::serialize_into(&mut out, trajectories)
                .context("Error serializing trajectories to bincode")?;
            out.flush()?;
            info!("All trajectories saved to {} (binary format)", filename.display());
        }
        OutputFormat::MessagePack => {
            let file = File::create(&filename)
                .with_context(|| format!("Error creating trajectory file '{}'", filename.display()))?;
            let mut out = BufWriter::new(file);
            rmp_serde::encode::write(&mut out, trajectories)
                .context("Error serializing trajectories to MessagePack")?;
            out.flush()?;
            info!("All trajectories saved to {} (MessagePack format)", filename.display());
        }
    }
    Ok(filename)
}
