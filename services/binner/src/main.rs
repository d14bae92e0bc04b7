//! Level-3 binner.
//!
//! Bins product files onto the configured grid, reprojects the temporal
//! bins onto a global raster and prints a JSON summary of the run.

mod input;

use std::path::PathBuf;

use anyhow::{Context, Result};
use binning::{
    default_raster_width, AggregatorDescriptor, BandStats, BinningConfig, BinningGrid, BinningJob,
    FeatureRaster, JobReport,
};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "binner")]
#[command(about = "Spatial and temporal binning of observation products")]
struct Args {
    /// Binning configuration file (YAML)
    #[arg(short, long, env = "BINNING_CONFIG")]
    config: PathBuf,

    /// Product files (JSON)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Raster width in pixels (default: twice the grid rows)
    #[arg(long)]
    width: Option<usize>,

    /// Write the summary here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    job: JobReport,
    aggregators: Vec<AggregatorDescriptor>,
    raster: RasterSummary,
}

#[derive(Debug, Serialize)]
struct RasterSummary {
    width: usize,
    height: usize,
    covered_pixels: usize,
    bands: Vec<BandStats>,
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .json()
        .with_writer(std::io::stderr)
        .init();

    let summary = run(&args)?;
    let json = serde_json::to_string_pretty(&summary)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

fn run(args: &Args) -> Result<RunSummary> {
    let config = BinningConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    info!(
        num_rows = config.num_rows,
        variables = ?config.variables,
        aggregators = config.aggregators.len(),
        partitions = config.num_partitions,
        "Loaded configuration"
    );

    let job = BinningJob::from_config(&config)?;
    let products = input::load_products(&args.inputs, job.context())?;
    info!(products = products.len(), "Starting binning");

    let output = job.run(products)?;
    for failure in &output.report.failed_products {
        warn!(product = %failure.product, errors = ?failure.errors, "Product had failing slices");
    }

    let context = output.context();
    let width = args
        .width
        .unwrap_or_else(|| default_raster_width(context.grid()));
    let height = context.grid().num_rows();
    let names = context.manager().output_feature_names().to_vec();
    let raster = output.reproject(FeatureRaster::new(names, width, height), width, None)?;
    info!(
        width,
        height,
        covered = raster.covered_count(),
        "Reprojection finished"
    );

    Ok(RunSummary {
        aggregators: context.manager().descriptors(),
        raster: RasterSummary {
            width,
            height,
            covered_pixels: raster.covered_count(),
            bands: raster.band_stats(),
        },
        job: output.report.clone(),
    })
}
