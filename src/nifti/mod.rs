//! NIfTI file format support.
//!
//! Reading and writing of the `.nii` and `.nii.gz` volumes that make up the
//! BraTS archives, decoded into (slice, row, column) arrays.

pub(crate) mod header;
pub mod io;
pub(crate) mod volume;

pub use header::{DataType, NiftiHeader};
pub use io::{load, save};
pub use volume::{Volume, VoxelData};
