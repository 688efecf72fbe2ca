//! Pipeline configuration.
//!
//! Every knob the pipeline honors lives in one explicit struct passed to the
//! entry point; there is no global state.

use std::path::{Path, PathBuf};

/// Full configuration for a preparation-and-training run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dataset root containing the `*GG/<subject>/` directories.
    pub root: PathBuf,
    /// Optional cap on the number of subjects loaded (debug runs).
    pub sample_limit: Option<usize>,
    /// Voxel shape every volume is resampled to, (slice, row, column).
    pub target_shape: [usize; 3],
    /// Mini-batch size handed to the training driver.
    pub batch_size: usize,
    /// Epoch count handed to the training driver.
    pub epochs: usize,
    /// Directory run artifacts are written under.
    pub output_dir: PathBuf,
}

impl PipelineConfig {
    /// Default configuration for a dataset root.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            sample_limit: None,
            target_shape: [80, 96, 64],
            batch_size: 32,
            epochs: 100,
            output_dir: PathBuf::from("."),
        }
    }

    /// Cap the number of subjects loaded.
    pub fn sample_limit(mut self, limit: usize) -> Self {
        self.sample_limit = Some(limit);
        self
    }

    /// Set the resampling target shape.
    pub fn target_shape(mut self, shape: [usize; 3]) -> Self {
        self.target_shape = shape;
        self
    }

    /// Set the driver mini-batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the driver epoch count.
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the artifact output directory.
    pub fn output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Debug preset: 4 subjects, 3 epochs, batch size 1.
    pub fn debug(self) -> Self {
        self.sample_limit(4).epochs(3).batch_size(1)
    }
}
