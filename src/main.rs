use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use std::path::PathBuf;
use std::time::Instant;

use circuit_common::SimulationConfig;
use circuit_sim::{
    save_summary, save_trajectories, simulate_population, stream_population, CellSimulator, CsvTrajectoryWriter,
    EnsembleAccumulator, ModelSpec, OutputFormat,
};

/// Command-line arguments for the circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config.toml file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Number of cells to simulate (overrides population.cells)
    #[arg(long)]
    cells: Option<u32>,

    /// Base random seed (overrides population.seed)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Circuit Simulator...");

    // --- Load Configuration ---
    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(cells) = args.cells {
        if cells == 0 {
            anyhow::bail!("--cells must be greater than 0.");
        }
        config.population.cells = cells;
    }
    if let Some(seed) = args.seed {
        config.population.seed = seed;
    }
    info!("Loaded configuration from {}.", args.config.display());

    // --- Configure Rayon Thread Pool (Optional) ---
    if let Some(threads) = config.population.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the Rayon thread pool")?;
    }
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Compile Model ---
    let model = ModelSpec::from_config(&config.species, &config.reactions)
        .compile()
        .context("Failed to compile the reaction network")?;
    info!(
        "Compiled {} columns and {} reactions.",
        model.species().len(),
        model.stoichiometry().rows()
    );
    debug!("Stoichiometry codes: {:?}", model.stoichiometry().codes());

    let params = config.get_sim_params();
    debug!("Simulation Parameters: {:#?}", params);
    let sim = CellSimulator::new(model, params).context("Simulation parameters do not fit the model")?;
    info!(
        "{:?} mode: {} checkpoints every {} time units.",
        sim.params().mode,
        sim.grid().len(),
        sim.grid().interval()
    );

    // --- Run Population ---
    let first = config.population.first_cell_id;
    let last = first
        .checked_add(config.population.cells)
        .context("Cell id range overflows u32")?;
    let cells = first..last;
    let seed = config.population.seed;
    let species = sim.model().species().to_vec();
    let base = config.output.base_filename.clone();
    let format = OutputFormat::from_config(config.output.format.as_deref());
    let mut accumulator = EnsembleAccumulator::for_species(&species, sim.grid().len());

    let progress_bar = ProgressBar::new(config.population.cells as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} cells ({percent}%) [{eta}]")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );

    info!("Simulating cells {}..{} with seed {}...", first, last, seed);
    let start_time = Instant::now();

    if config.output.save_trajectories && format != OutputFormat::Csv {
        // Non-CSV formats are written as a single batch.
        let trajectories = match simulate_population(&sim, cells, seed) {
            Ok(trajectories) => trajectories,
            Err(e) => {
                error!("Population simulation failed: {:#}", e);
                anyhow::bail!("Simulation failed.");
            }
        };
        for trajectory in &trajectories {
            accumulator.push(trajectory)?;
        }
        progress_bar.inc(trajectories.len() as u64);
        save_trajectories(&base, format, &species, &trajectories)?;
    } else {
        let mut writer = if config.output.save_trajectories {
            Some(CsvTrajectoryWriter::create(format!("{}.{}", base, format.extension()), &species)?)
        } else {
            None
        };
        let streamed = stream_population(&sim, cells, seed, |trajectory| {
            if let Some(writer) = writer.as_mut() {
                writer.append(&trajectory)?;
            }
            accumulator.push(&trajectory)?;
            progress_bar.inc(1);
            Ok(())
        });
        if let Err(e) = streamed {
            error!("Population simulation failed: {:#}", e);
            anyhow::bail!("Simulation failed.");
        }
        if let Some(writer) = writer {
            writer.finish()?;
        }
    }
    progress_bar.finish();

    let total_duration = start_time.elapsed();
    info!(
        "Simulated {} cells in {:.3} seconds.",
        accumulator.cells(),
        total_duration.as_secs_f64()
    );

    // --- Ensemble Statistics ---
    if config.output.save_stats {
        let summary = accumulator.finish(config.output.stats_window);
        for species in &summary.species {
            info!(
                "{}: steady mean {:.3}, variance {:.3}, noise {:.4}",
                species.name, species.steady_mean, species.steady_variance, species.steady_noise
            );
        }
        save_summary(&base, &summary)?;
    }

    info!("Simulation complete.");
    Ok(())
}
