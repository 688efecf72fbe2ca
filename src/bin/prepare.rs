//! Dataset preparation CLI.
//!
//! Indexes a BraTS dataset, accumulates the training tensors, and runs the
//! dry-run driver over them: an end-to-end validation of the data before a
//! real training driver is pointed at it.

use anyhow::Context;
use clap::Parser;
use neuroprep::{pipeline, DryRunDriver, PipelineConfig, SubjectStatus};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "prepare", about = "Index and preprocess a BraTS dataset")]
struct Args {
    /// Dataset root containing the *GG/<subject>/ directories.
    #[arg(long)]
    root: PathBuf,
    /// Directory run artifacts are written under.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Target voxel shape: slices rows columns.
    #[arg(long, num_args = 3, default_values_t = [80usize, 96, 64])]
    target_shape: Vec<usize>,
    /// Cap on the number of subjects loaded.
    #[arg(long)]
    sample_limit: Option<usize>,
    /// Epoch count handed to the driver.
    #[arg(long, default_value_t = 100)]
    epochs: usize,
    /// Mini-batch size handed to the driver.
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    /// Debug preset: 4 subjects, 3 epochs, batch size 1.
    #[arg(long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let shape: [usize; 3] = args
        .target_shape
        .as_slice()
        .try_into()
        .context("--target-shape takes exactly three extents")?;

    let mut config = PipelineConfig::new(&args.root)
        .target_shape(shape)
        .batch_size(args.batch_size)
        .epochs(args.epochs)
        .output_dir(&args.output_dir);
    if let Some(limit) = args.sample_limit {
        config = config.sample_limit(limit);
    }
    if args.debug {
        config = config.debug();
    }

    let mut driver = DryRunDriver::new();
    let summary = pipeline::run(&config, &mut driver)
        .with_context(|| format!("pipeline failed for {}", args.root.display()))?;

    print!("{}", summary.data);
    for outcome in summary.data.outcomes() {
        if let SubjectStatus::Skipped(reason) = &outcome.status {
            println!("  skipped {}: {}", outcome.subject, reason);
        }
    }
    println!("History:");
    print!("{}", summary.artifacts.history);
    println!("Model dir: {}", summary.artifacts.model_dir.display());
    println!("History file: {}", summary.artifacts.history_path.display());

    Ok(())
}
