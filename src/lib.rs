//! BraTS brain-MRI preprocessing and training-tensor assembly.
//!
//! The pipeline indexes a BraTS-layout dataset on disk, decodes each
//! subject's four scan modalities and ground-truth segmentation from NIfTI,
//! resamples and z-score-normalizes the scans, splits the segmentation into
//! per-class binary mask channels, and accumulates everything into two dense
//! training tensors. A pluggable [`training::TrainingDriver`] consumes the
//! tensors with a dual objective: the label masks and the inputs themselves
//! (reconstruction) as targets.
//!
//! ```ignore
//! use neuroprep::{pipeline, PipelineConfig, DryRunDriver};
//!
//! let config = PipelineConfig::new("/data/brats").target_shape([80, 96, 64]);
//! let mut driver = DryRunDriver::new();
//! let summary = pipeline::run(&config, &mut driver)?;
//! println!("{}", summary.artifacts.history);
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod nifti;
pub mod pipeline;
pub mod training;
pub mod transforms;

pub use config::PipelineConfig;
pub use dataset::batch::{load_training_set, SubjectOutcome, SubjectStatus, TrainingSet};
pub use dataset::stream::{SubjectSample, SubjectStream};
pub use dataset::{index_dataset, Modality, SubjectEntry};
pub use error::{Error, Result};
pub use nifti::Volume;
pub use training::{DryRunDriver, FitOptions, TrainingDriver, TrainingHistory};
pub use transforms::{preprocess_volume, resize, split_labels, z_normalization, Interpolation};
