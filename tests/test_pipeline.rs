//! End-to-end pipeline tests over synthetic on-disk datasets.
//!
//! Fixtures are real `.nii.gz` files written with the crate's own writer, so
//! these tests exercise the full decode -> preprocess -> accumulate path.

use ndarray::{Array3, Axis};
use neuroprep::{
    index_dataset, pipeline, DryRunDriver, Modality, PipelineConfig, SubjectStatus, TrainingSet,
    Volume,
};
use std::path::Path;
use tempfile::tempdir;

const VOLUME_SHAPE: (usize, usize, usize) = (6, 6, 6);
const TARGET: [usize; 3] = [4, 4, 4];

fn write_subject(root: &Path, grade: &str, subject: &str, seed: f32) {
    let dir = root.join(grade).join(subject);
    std::fs::create_dir_all(&dir).unwrap();

    let numel = VOLUME_SHAPE.0 * VOLUME_SHAPE.1 * VOLUME_SHAPE.2;
    for modality in Modality::SCANS {
        // Non-degenerate intensities, different per subject and modality
        let offset = seed + modality as usize as f32 * 10.0;
        let data: Vec<f32> = (0..numel).map(|i| offset + (i % 23) as f32).collect();
        let vol = Volume::from_f32(Array3::from_shape_vec(VOLUME_SHAPE, data).unwrap());
        neuroprep::nifti::save(
            &vol,
            dir.join(format!("{subject}_{}.nii.gz", modality.suffix())),
        )
        .unwrap();
    }

    // Labels cycle through the real code set {0, 1, 2, 4}
    let seg: Vec<u8> = (0..numel).map(|i| [0u8, 1, 2, 4][i % 4]).collect();
    let vol = Volume::from_u8(Array3::from_shape_vec(VOLUME_SHAPE, seg).unwrap());
    neuroprep::nifti::save(&vol, dir.join(format!("{subject}_seg.nii.gz"))).unwrap();
}

fn assert_no_nans(set: &TrainingSet) {
    assert!(
        set.inputs.iter().all(|v| v.is_finite()),
        "inputs contain non-finite values"
    );
}

#[test]
fn four_subjects_end_to_end() {
    let dir = tempdir().unwrap();
    for (i, subject) in ["s0", "s1", "s2", "s3"].iter().enumerate() {
        write_subject(dir.path(), "HGG", subject, i as f32);
    }

    let entries = index_dataset(dir.path()).unwrap();
    assert_eq!(entries.len(), 4);

    let set = neuroprep::load_training_set(&entries, TARGET).unwrap();
    assert_eq!(set.inputs.shape(), &[4, 4, 4, 4, 4]);
    assert_eq!(set.labels.shape(), &[4, 3, 4, 4, 4]);
    assert_eq!(set.loaded(), 4);
    assert_no_nans(&set);

    // Label channels stay mutually exclusive after resampling
    for row in 0..4 {
        let per_subject = set.labels.index_axis(Axis(0), row);
        let summed = per_subject.sum_axis(Axis(0));
        assert!(summed.iter().all(|&s| s <= 1));
    }
}

#[test]
fn normalized_rows_have_zero_mean() {
    let dir = tempdir().unwrap();
    write_subject(dir.path(), "HGG", "solo", 3.0);

    let entries = index_dataset(dir.path()).unwrap();
    let set = neuroprep::load_training_set(&entries, TARGET).unwrap();

    for channel in 0..4 {
        let volume = set.inputs.index_axis(Axis(0), 0);
        let volume = volume.index_axis(Axis(0), channel);
        let mean: f64 = volume.iter().map(|&v| f64::from(v)).sum::<f64>() / volume.len() as f64;
        assert!(mean.abs() < 1e-4, "channel {channel} mean {mean}");
    }
}

#[test]
fn subjects_from_both_grades_are_indexed() {
    let dir = tempdir().unwrap();
    write_subject(dir.path(), "HGG", "high", 0.0);
    write_subject(dir.path(), "LGG", "low", 1.0);

    let entries = index_dataset(dir.path()).unwrap();
    let ids: Vec<&str> = entries.iter().map(|e| e.id()).collect();
    assert_eq!(ids, vec!["high", "low"]);
}

#[test]
fn corrupt_volume_skips_only_that_subject() {
    let dir = tempdir().unwrap();
    write_subject(dir.path(), "HGG", "ok_a", 0.0);
    write_subject(dir.path(), "HGG", "broken", 1.0);
    write_subject(dir.path(), "HGG", "ok_b", 2.0);
    std::fs::write(dir.path().join("HGG/broken/broken_t1ce.nii.gz"), b"nope").unwrap();

    let entries = index_dataset(dir.path()).unwrap();
    let set = neuroprep::load_training_set(&entries, TARGET).unwrap();

    assert_eq!(set.len(), 3);
    assert_eq!(set.loaded(), 2);
    assert_eq!(set.skipped(), 1);

    // "broken" sorts first; its row is zeroed, valid rows carry data
    let validity = set.row_validity();
    assert_eq!(validity, vec![false, true, true]);
    assert!(set
        .inputs
        .index_axis(Axis(0), 0)
        .iter()
        .all(|&v| v == 0.0));
    assert!(set
        .inputs
        .index_axis(Axis(0), 1)
        .iter()
        .any(|&v| v != 0.0));
    assert_no_nans(&set);
}

#[test]
fn full_run_writes_artifacts() {
    let data_dir = tempdir().unwrap();
    let out_dir = tempdir().unwrap();
    for (i, subject) in ["a", "b", "c", "d"].iter().enumerate() {
        write_subject(data_dir.path(), "HGG", subject, i as f32);
    }

    let config = PipelineConfig::new(data_dir.path())
        .target_shape(TARGET)
        .output_dir(out_dir.path())
        .debug();

    let mut driver = DryRunDriver::new();
    let summary = pipeline::run(&config, &mut driver).unwrap();

    assert_eq!(summary.data.len(), 4);
    assert_eq!(summary.data.loaded(), 4);
    assert!(summary
        .data
        .outcomes()
        .iter()
        .all(|o| matches!(o.status, SubjectStatus::Loaded)));

    assert!(summary.artifacts.model_dir.is_dir());
    assert!(summary.artifacts.history_path.is_file());
    assert_eq!(summary.artifacts.history.series("valid_rows"), Some(&[4.0][..]));
    assert_eq!(
        summary.artifacts.history.series("non_finite_inputs"),
        Some(&[0.0][..])
    );

    // Labels cycle 0,1,2,4 so every class has foreground somewhere
    for name in ["foreground_ncr_net", "foreground_ed", "foreground_et"] {
        let series = summary.artifacts.history.series(name).unwrap();
        assert!(series[0] > 0.0, "{name} recorded no foreground");
    }
}

#[test]
fn missing_modality_fails_the_whole_index() {
    let dir = tempdir().unwrap();
    write_subject(dir.path(), "HGG", "whole", 0.0);
    write_subject(dir.path(), "HGG", "partial", 1.0);
    std::fs::remove_file(dir.path().join("HGG/partial/partial_t2.nii.gz")).unwrap();

    let err = index_dataset(dir.path()).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("partial"));
    assert!(text.contains("t2"));
}
