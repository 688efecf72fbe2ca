//! BraTS dataset discovery.
//!
//! Subjects live at `<root>/<grade>GG/<subject>/`, each directory holding
//! five files named `<subject>_<modality>.nii.gz`. Files are grouped by the
//! subject identifier taken from the containing directory, so a missing or
//! extra file can never silently shift another subject's volumes.

pub mod batch;
pub mod stream;

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One MRI acquisition protocol (or the ground-truth segmentation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum Modality {
    /// T1-weighted scan
    T1 = 0,
    /// T2-weighted scan
    T2 = 1,
    /// T1-weighted contrast-enhanced scan
    T1ce = 2,
    /// Fluid-attenuated inversion recovery scan
    Flair = 3,
    /// Ground-truth segmentation
    Seg = 4,
}

impl Modality {
    /// Every modality a complete subject must provide.
    pub const ALL: [Modality; 5] = [
        Modality::T1,
        Modality::T2,
        Modality::T1ce,
        Modality::Flair,
        Modality::Seg,
    ];

    /// The four scan modalities, in input-tensor channel order.
    pub const SCANS: [Modality; 4] = [
        Modality::T1,
        Modality::T2,
        Modality::T1ce,
        Modality::Flair,
    ];

    /// Filename suffix identifying this modality.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::T1 => "t1",
            Self::T2 => "t2",
            Self::T1ce => "t1ce",
            Self::Flair => "flair",
            Self::Seg => "seg",
        }
    }

    /// Parse from a filename suffix.
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "t1" => Some(Self::T1),
            "t2" => Some(Self::T2),
            "t1ce" => Some(Self::T1ce),
            "flair" => Some(Self::Flair),
            "seg" => Some(Self::Seg),
            _ => None,
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// A complete per-subject modality-to-path mapping.
///
/// Only [`index_dataset`] constructs these, after verifying all five
/// modalities resolved, so lookups are infallible.
#[derive(Debug, Clone)]
pub struct SubjectEntry {
    id: String,
    paths: [PathBuf; 5],
}

impl SubjectEntry {
    /// Subject identifier (the containing directory name).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of one modality's file.
    pub fn path(&self, modality: Modality) -> &Path {
        &self.paths[modality as usize]
    }

    /// The T1 path, used as the subject's primary path in diagnostics.
    pub fn primary_path(&self) -> &Path {
        self.path(Modality::T1)
    }
}

/// Extract the modality suffix from a `..._<modality>.nii.gz` filename.
fn modality_from_filename(name: &str) -> Option<Modality> {
    let stem = name.strip_suffix(".nii.gz")?;
    let (_, suffix) = stem.rsplit_once('_')?;
    Modality::from_suffix(suffix)
}

/// Discover all complete subjects beneath `root`.
///
/// Entries come back sorted by subject id for a deterministic load order. A
/// subject directory that matched some modalities but not all five fails the
/// whole index with [`Error::MissingModality`] naming the first gap; a
/// nonexistent root simply yields an empty index.
pub fn index_dataset(root: &Path) -> Result<Vec<SubjectEntry>> {
    let mut grouped: BTreeMap<String, BTreeMap<Modality, PathBuf>> = BTreeMap::new();

    for modality in Modality::ALL {
        let pattern = root
            .join(format!("*GG/*/*_{}.nii.gz", modality.suffix()))
            .to_string_lossy()
            .into_owned();
        let matches = glob::glob(&pattern)
            .map_err(|e| Error::Configuration(format!("bad glob pattern '{pattern}': {e}")))?;

        for entry in matches {
            let path = entry.map_err(glob::GlobError::into_error)?;

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            // The glob already selects on suffix; the parse is authoritative.
            if modality_from_filename(name) != Some(modality) {
                continue;
            }
            let Some(subject) = path
                .parent()
                .and_then(Path::file_name)
                .and_then(|n| n.to_str())
            else {
                continue;
            };

            let slot = grouped
                .entry(subject.to_string())
                .or_default()
                .entry(modality);
            match slot {
                std::collections::btree_map::Entry::Vacant(v) => {
                    v.insert(path);
                }
                std::collections::btree_map::Entry::Occupied(existing) => {
                    warn!(
                        subject,
                        modality = %modality,
                        kept = %existing.get().display(),
                        ignored = %path.display(),
                        "duplicate modality file, keeping first match"
                    );
                }
            }
        }
    }

    let mut entries = Vec::with_capacity(grouped.len());
    for (id, mut paths) in grouped {
        let mut resolved: Vec<PathBuf> = Vec::with_capacity(Modality::ALL.len());
        for modality in Modality::ALL {
            match paths.remove(&modality) {
                Some(path) => resolved.push(path),
                None => {
                    return Err(Error::MissingModality {
                        subject: id,
                        modality: modality.suffix(),
                    })
                }
            }
        }
        let paths: [PathBuf; 5] = resolved
            .try_into()
            .map_err(|_| Error::Configuration("modality count mismatch".to_string()))?;
        entries.push(SubjectEntry { id, paths });
    }

    Ok(entries)
}
