//! Batch accumulation of training tensors.
//!
//! Loads every indexed subject into two preallocated dense tensors: inputs
//! (subjects x 4 scan channels x target shape, f32) and labels (subjects x 3
//! class channels x target shape, u8). A failure while processing one
//! subject is recorded as a typed outcome and that row stays zeroed; the
//! rest of the dataset still loads.

use crate::dataset::{Modality, SubjectEntry};
use crate::error::{Error, Result};
use crate::nifti;
use crate::transforms;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array4, Array5, Axis};
use rayon::prelude::*;
use tracing::{debug, warn};

/// What happened to one subject during loading.
#[derive(Debug)]
pub enum SubjectStatus {
    /// Volumes decoded, preprocessed, and written to the tensor row.
    Loaded,
    /// Subject skipped; its tensor row is all zeros.
    Skipped(Error),
}

/// Per-subject load outcome, in row order.
#[derive(Debug)]
pub struct SubjectOutcome {
    /// Subject identifier.
    pub subject: String,
    /// Load or skip result for this subject's row.
    pub status: SubjectStatus,
}

/// The accumulated training tensors plus per-row outcomes.
#[derive(Debug)]
pub struct TrainingSet {
    /// Normalized scan intensities, (subjects, 4, D, H, W).
    pub inputs: Array5<f32>,
    /// Per-class binary masks, (subjects, 3, D, H, W).
    pub labels: Array5<u8>,
    outcomes: Vec<SubjectOutcome>,
}

impl TrainingSet {
    /// Number of tensor rows (loaded or not).
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True when no subjects were indexed.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Per-row validity: `true` where the row holds real data.
    pub fn row_validity(&self) -> Vec<bool> {
        self.outcomes
            .iter()
            .map(|o| matches!(o.status, SubjectStatus::Loaded))
            .collect()
    }

    /// Number of successfully loaded rows.
    pub fn loaded(&self) -> usize {
        self.row_validity().iter().filter(|&&v| v).count()
    }

    /// Number of skipped rows.
    pub fn skipped(&self) -> usize {
        self.len() - self.loaded()
    }

    /// Per-subject outcomes, in row order.
    pub fn outcomes(&self) -> &[SubjectOutcome] {
        &self.outcomes
    }
}

impl std::fmt::Display for TrainingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Training set:")?;
        writeln!(f, "  Subjects: {}", self.len())?;
        writeln!(f, "  Loaded: {}", self.loaded())?;
        writeln!(f, "  Skipped: {}", self.skipped())?;
        writeln!(f, "  Inputs: {:?} f32", self.inputs.shape())?;
        writeln!(f, "  Labels: {:?} u8", self.labels.shape())?;
        Ok(())
    }
}

/// Load one subject: four normalized scan channels plus split label masks.
///
/// Scan modalities load and preprocess in parallel; any failure among them
/// fails the whole subject.
pub fn load_subject(
    entry: &SubjectEntry,
    target_shape: [usize; 3],
) -> Result<(Array4<f32>, Array4<u8>)> {
    let [td, th, tw] = target_shape;

    let channels: Vec<Result<_>> = Modality::SCANS
        .par_iter()
        .map(|&modality| {
            let volume = nifti::load(entry.path(modality))?;
            transforms::preprocess_volume(&volume.to_f32(), Some(&target_shape[..]))
        })
        .collect();

    let mut inputs = Array4::<f32>::zeros((Modality::SCANS.len(), td, th, tw));
    for (channel, result) in channels.into_iter().enumerate() {
        inputs.index_axis_mut(Axis(0), channel).assign(&result?);
    }

    let seg = nifti::load(entry.path(Modality::Seg))?;
    let labels = transforms::split_labels(&seg.to_labels()?, Some(&target_shape[..]))?;

    Ok((inputs, labels))
}

/// Load every subject into preallocated, zero-initialized tensors.
///
/// Per-subject decode and preprocessing failures are recorded and skipped;
/// a malformed `target_shape` is fatal before any file is touched. Progress
/// is reported on stderr as a textual bar, one tick per subject.
pub fn load_training_set(
    entries: &[SubjectEntry],
    target_shape: [usize; 3],
) -> Result<TrainingSet> {
    let [td, th, tw] = transforms::check_target(&target_shape)?;

    let n = entries.len();
    let mut inputs = Array5::<f32>::zeros((n, Modality::SCANS.len(), td, th, tw));
    let mut labels = Array5::<u8>::zeros((n, transforms::TUMOR_CLASSES.len(), td, th, tw));
    let mut outcomes = Vec::with_capacity(n);

    let progress = ProgressBar::new(n as u64).with_style(
        ProgressStyle::with_template("[{bar:25}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    for (row, entry) in entries.iter().enumerate() {
        progress.set_message(entry.id().to_string());
        let status = match load_subject(entry, target_shape) {
            Ok((subject_inputs, subject_labels)) => {
                inputs.index_axis_mut(Axis(0), row).assign(&subject_inputs);
                labels.index_axis_mut(Axis(0), row).assign(&subject_labels);
                debug!(subject = entry.id(), row, "subject loaded");
                SubjectStatus::Loaded
            }
            Err(e) => {
                warn!(
                    subject = entry.id(),
                    path = %entry.primary_path().display(),
                    error = %e,
                    "skipping subject"
                );
                SubjectStatus::Skipped(e)
            }
        };
        outcomes.push(SubjectOutcome {
            subject: entry.id().to_string(),
            status,
        });
        progress.inc(1);
    }
    progress.finish_and_clear();

    Ok(TrainingSet {
        inputs,
        labels,
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::index_dataset;
    use crate::nifti::Volume;
    use ndarray::Array3;
    use std::path::Path;
    use tempfile::tempdir;

    /// Shape every synthetic fixture volume uses, (slice, row, column).
    const FIXTURE_SHAPE: (usize, usize, usize) = (6, 6, 6);

    fn write_subject(root: &Path, subject: &str, seed: f32) {
        let dir = root.join("HGG").join(subject);
        std::fs::create_dir_all(&dir).unwrap();

        let numel = FIXTURE_SHAPE.0 * FIXTURE_SHAPE.1 * FIXTURE_SHAPE.2;
        for modality in Modality::SCANS {
            let data: Vec<f32> = (0..numel).map(|i| seed + i as f32).collect();
            let vol = Volume::from_f32(Array3::from_shape_vec(FIXTURE_SHAPE, data).unwrap());
            crate::nifti::save(
                &vol,
                dir.join(format!("{subject}_{}.nii.gz", modality.suffix())),
            )
            .unwrap();
        }

        let seg: Vec<u8> = (0..numel).map(|i| [0u8, 1, 2, 4][i % 4]).collect();
        let vol = Volume::from_u8(Array3::from_shape_vec(FIXTURE_SHAPE, seg).unwrap());
        crate::nifti::save(&vol, dir.join(format!("{subject}_seg.nii.gz"))).unwrap();
    }

    #[test]
    fn loads_all_subjects_into_rows() {
        let dir = tempdir().unwrap();
        for (i, subject) in ["s1", "s2", "s3"].iter().enumerate() {
            write_subject(dir.path(), subject, i as f32);
        }

        let entries = index_dataset(dir.path()).unwrap();
        let set = load_training_set(&entries, [4, 4, 4]).unwrap();

        assert_eq!(set.inputs.shape(), &[3, 4, 4, 4, 4]);
        assert_eq!(set.labels.shape(), &[3, 3, 4, 4, 4]);
        assert_eq!(set.loaded(), 3);
        assert_eq!(set.skipped(), 0);
        assert!(set.row_validity().iter().all(|&v| v));
        assert!(set.inputs.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn corrupt_subject_is_skipped_with_zeroed_row() {
        let dir = tempdir().unwrap();
        write_subject(dir.path(), "bad", 0.0);
        write_subject(dir.path(), "good", 1.0);

        // Corrupt the bad subject's t1 after indexing-compatible layout exists
        let t1 = dir.path().join("HGG/bad/bad_t1.nii.gz");
        std::fs::write(&t1, b"garbage").unwrap();

        let entries = index_dataset(dir.path()).unwrap();
        let set = load_training_set(&entries, [4, 4, 4]).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.loaded(), 1);
        assert_eq!(set.skipped(), 1);

        // Sorted order puts "bad" first; its row must be all zeros
        assert_eq!(set.row_validity(), vec![false, true]);
        assert!(set
            .inputs
            .index_axis(Axis(0), 0)
            .iter()
            .all(|&v| v == 0.0));
        assert!(matches!(
            set.outcomes()[0].status,
            SubjectStatus::Skipped(_)
        ));
    }

    #[test]
    fn uniform_scan_is_a_typed_skip() {
        let dir = tempdir().unwrap();
        let subject = "flat";
        let dir_path = dir.path().join("HGG").join(subject);
        std::fs::create_dir_all(&dir_path).unwrap();

        let numel = 4 * 4 * 4;
        for modality in Modality::SCANS {
            // Zero variance: z-score normalization is undefined
            let vol = Volume::from_f32(Array3::from_elem((4, 4, 4), 5.0f32));
            crate::nifti::save(
                &vol,
                dir_path.join(format!("{subject}_{}.nii.gz", modality.suffix())),
            )
            .unwrap();
        }
        let seg: Vec<u8> = (0..numel).map(|i| [0u8, 1, 2, 4][i % 4]).collect();
        let vol = Volume::from_u8(Array3::from_shape_vec((4, 4, 4), seg).unwrap());
        crate::nifti::save(&vol, dir_path.join(format!("{subject}_seg.nii.gz"))).unwrap();

        let entries = index_dataset(dir.path()).unwrap();
        let set = load_training_set(&entries, [4, 4, 4]).unwrap();

        assert_eq!(set.skipped(), 1);
        match &set.outcomes()[0].status {
            SubjectStatus::Skipped(Error::DegenerateVolume) => {}
            other => panic!("expected DegenerateVolume skip, got {other:?}"),
        }
    }

    #[test]
    fn bad_target_shape_is_fatal() {
        let entries: Vec<SubjectEntry> = Vec::new();
        assert!(load_training_set(&entries, [4, 0, 4]).is_err());
    }

    #[test]
    fn empty_dataset_yields_empty_tensors() {
        let set = load_training_set(&[], [4, 4, 4]).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.inputs.shape(), &[0, 4, 4, 4, 4]);
    }
}
