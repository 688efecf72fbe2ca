//! Training driver seam and run artifacts.
//!
//! Model fitting is an external concern: this crate prepares the tensors and
//! defines the interface a driver plugs into. The segmentation masks are one
//! fit target and the inputs themselves are the second, so the downstream
//! model trains with a dual segmentation + reconstruction objective.

use crate::dataset::batch::TrainingSet;
use crate::error::{Error, Result};
use chrono::Local;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Fit hyperparameters handed to the driver.
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    /// Number of passes over the dataset.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
}

/// Named per-epoch metric series recorded during a fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    metrics: BTreeMap<String, Vec<f64>>,
}

impl TrainingHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value to a named series.
    pub fn record(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    /// One series by name.
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(Vec::as_slice)
    }

    /// All series, sorted by name.
    pub fn metrics(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.metrics.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl std::fmt::Display for TrainingHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.metrics.is_empty() {
            return write!(f, "(no metrics recorded)");
        }
        for (name, series) in &self.metrics {
            match series.last() {
                Some(last) => writeln!(f, "  {name}: {last:.6} ({} entries)", series.len())?,
                None => writeln!(f, "  {name}: (empty)")?,
            }
        }
        Ok(())
    }
}

/// External model-fitting collaborator.
pub trait TrainingDriver {
    /// Short driver name, used in logs and artifact metadata.
    fn name(&self) -> &str;

    /// Fit on the prepared tensors.
    ///
    /// `data.labels` is the segmentation target; `data.inputs` doubles as
    /// the reconstruction target. Rows where `data.row_validity()` is false
    /// hold zeros and should be excluded from fitting.
    fn fit(&mut self, data: &TrainingSet, options: &FitOptions) -> Result<TrainingHistory>;

    /// Persist the fitted model into `dir`.
    fn save(&self, dir: &Path) -> Result<()>;
}

/// Dataset-validation driver: fits nothing, records tensor statistics.
///
/// Lets the pipeline run end to end, artifact writing included, before a
/// real model driver is wired in, and doubles as a data sanity check.
#[derive(Debug, Default)]
pub struct DryRunDriver {
    fitted: bool,
}

impl DryRunDriver {
    /// New, unfitted driver.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingDriver for DryRunDriver {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn fit(&mut self, data: &TrainingSet, options: &FitOptions) -> Result<TrainingHistory> {
        if options.batch_size == 0 {
            return Err(Error::Configuration(
                "batch_size must be positive".to_string(),
            ));
        }

        let mut history = TrainingHistory::new();
        history.record("subjects", data.len() as f64);
        history.record("valid_rows", data.loaded() as f64);
        history.record("skipped_rows", data.skipped() as f64);

        let non_finite = data.inputs.iter().filter(|v| !v.is_finite()).count();
        history.record("non_finite_inputs", non_finite as f64);

        // Foreground fraction per class channel, over valid rows only
        let validity = data.row_validity();
        let valid_rows = validity.iter().filter(|&&v| v).count();
        for (channel, name) in ["ncr_net", "ed", "et"].iter().enumerate() {
            let mut foreground = 0usize;
            let mut total = 0usize;
            for (row, valid) in validity.iter().enumerate() {
                if !valid {
                    continue;
                }
                let mask = data.labels.index_axis(Axis(0), row);
                let mask = mask.index_axis(Axis(0), channel);
                foreground += mask.iter().filter(|&&v| v > 0).count();
                total += mask.len();
            }
            let fraction = if total == 0 {
                0.0
            } else {
                foreground as f64 / total as f64
            };
            history.record(&format!("foreground_{name}"), fraction);
        }

        info!(
            subjects = data.len(),
            valid = valid_rows,
            non_finite,
            "dry-run fit complete"
        );
        self.fitted = true;
        Ok(history)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let marker = serde_json::json!({
            "driver": self.name(),
            "fitted": self.fitted,
        });
        let file = File::create(dir.join("driver.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &marker)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(())
    }
}

/// Artifacts produced by one training run.
#[derive(Debug)]
pub struct RunArtifacts {
    /// Directory the driver saved the model into.
    pub model_dir: PathBuf,
    /// Serialized training history, sibling of the model directory.
    pub history_path: PathBuf,
    /// The history itself.
    pub history: TrainingHistory,
}

/// Fit the driver on `data` and write run artifacts under `output_dir`.
///
/// The model directory is named `model_ae_<epochs>_<timestamp>`; the history
/// lands next to it as `model_ae_<epochs>_<timestamp>_history.json`.
pub fn train_and_save(
    driver: &mut dyn TrainingDriver,
    data: &TrainingSet,
    options: &FitOptions,
    output_dir: &Path,
) -> Result<RunArtifacts> {
    let history = driver.fit(data, options)?;

    let timestamp = Local::now().format("%Y-%m-%d-%H%M");
    let stem = format!("model_ae_{}_{}", options.epochs, timestamp);

    let model_dir = output_dir.join(&stem);
    fs::create_dir_all(&model_dir)?;
    driver.save(&model_dir)?;

    let history_path = output_dir.join(format!("{stem}_history.json"));
    let file = File::create(&history_path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &history)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

    info!(
        driver = driver.name(),
        model_dir = %model_dir.display(),
        history = %history_path.display(),
        "run artifacts written"
    );

    Ok(RunArtifacts {
        model_dir,
        history_path,
        history,
    })
}
