use std::fs;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, LevelFilter};

use film_deskew::{collect_inputs, run_batch, Cli};

fn init_logging(verbose: bool) {
    let default = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = cli.batch_options();
    options
        .detect
        .validate()
        .context("Invalid detection settings")?;

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("Failed to size the worker pool")?;
    }

    let inputs = collect_inputs(&cli.input, &cli.ext)?;
    if inputs.is_empty() {
        bail!("No files ending in {:?} found in {:?}", cli.ext, cli.input);
    }

    info!("Processing {} scans from {:?}", inputs.len(), cli.input);
    debug!(
        "Threshold {}, edge margin {}, canvas {}, interpolation {}, bounds {}",
        cli.threshold, cli.edge_margin, cli.canvas, cli.interpolation, cli.bounds
    );

    let output_dir = cli.output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let outcomes = run_batch(&inputs, &options, &output_dir);
    let saved = outcomes.iter().filter(|o| o.result.is_ok()).count();

    info!(
        "Cropped {} of {} scans into {:?}",
        saved,
        outcomes.len(),
        output_dir
    );

    if saved == 0 {
        bail!("Every scan failed; try a different --threshold");
    }

    Ok(())
}
