//! End-to-end pipeline entry point.

use crate::config::PipelineConfig;
use crate::dataset::batch::{load_training_set, TrainingSet};
use crate::dataset::index_dataset;
use crate::error::Result;
use crate::training::{train_and_save, FitOptions, RunArtifacts, TrainingDriver};
use tracing::info;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// The accumulated tensors and per-subject outcomes.
    pub data: TrainingSet,
    /// Model directory, history file, and the history itself.
    pub artifacts: RunArtifacts,
}

/// Index the dataset, accumulate training tensors, fit the driver, and
/// write run artifacts.
pub fn run(config: &PipelineConfig, driver: &mut dyn TrainingDriver) -> Result<RunSummary> {
    let mut entries = index_dataset(&config.root)?;
    if let Some(limit) = config.sample_limit {
        entries.truncate(limit);
    }
    info!(
        root = %config.root.display(),
        subjects = entries.len(),
        shape = ?config.target_shape,
        "dataset indexed"
    );

    let data = load_training_set(&entries, config.target_shape)?;
    info!(
        loaded = data.loaded(),
        skipped = data.skipped(),
        "training tensors accumulated"
    );

    let options = FitOptions {
        epochs: config.epochs,
        batch_size: config.batch_size,
    };
    let artifacts = train_and_save(driver, &data, &options, &config.output_dir)?;

    Ok(RunSummary { data, artifacts })
}
