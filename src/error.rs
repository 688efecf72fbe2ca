//! Crate-wide error type.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while indexing, decoding, or preprocessing volumes.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem or stream failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file did not carry a recognizable NIfTI-1 magic value.
    #[error("invalid NIfTI magic: {0:?}")]
    InvalidMagic([u8; 4]),

    /// The header declares a voxel data type this crate does not read.
    #[error("unsupported data type code: {0}")]
    UnsupportedDataType(i16),

    /// A shape contract was violated (wrong rank, zero extent, mismatch).
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Gzip payload could not be decoded.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Structurally broken container (extensions, truncation, bad offsets).
    #[error("invalid file format: {0}")]
    InvalidFileFormat(String),

    /// A subject's file group lacks one of the required modalities.
    #[error("subject '{subject}' is missing modality '{modality}'")]
    MissingModality {
        /// Subject identifier derived from the directory structure.
        subject: String,
        /// The modality suffix that resolved to no file.
        modality: &'static str,
    },

    /// Volume has zero variance; z-score normalization is undefined.
    #[error("degenerate volume: zero variance, cannot z-score normalize")]
    DegenerateVolume,

    /// A segmentation volume holds a value that is not a valid class code.
    #[error("unexpected label value {0} in segmentation volume")]
    UnexpectedLabel(f64),

    /// Bad runtime configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
