//! Volumetric preprocessing transforms.
//!
//! Resampling to a target grid, z-score intensity normalization, and
//! decomposition of integer-coded segmentation volumes into per-class binary
//! mask channels.

use crate::error::{Error, Result};
use ndarray::{Array3, Array4, Axis};

/// Tumor class codes in channel order: NCR/NET, ED, ET.
///
/// Code 3 is unused by the dataset; the set is {1, 2, 4}, not a range.
pub const TUMOR_CLASSES: [u8; 3] = [1, 2, 4];

/// Interpolation method for [`resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Continuous interpolation for intensity volumes.
    Trilinear,
    /// Nearest-neighbor, for label and mask volumes.
    Nearest,
}

/// Validate a target shape: exactly three positive extents.
pub(crate) fn check_target(target: &[usize]) -> Result<[usize; 3]> {
    if target.len() != 3 {
        return Err(Error::InvalidDimensions(format!(
            "target shape must have exactly 3 dimensions, got {}",
            target.len()
        )));
    }
    if target.iter().any(|&t| t == 0) {
        return Err(Error::InvalidDimensions(format!(
            "target shape must have positive extents, got {:?}",
            target
        )));
    }
    Ok([target[0], target[1], target[2]])
}

/// Source coordinates for one axis, endpoint-aligned.
///
/// Scale factors derive from the actual input extent, so inputs of any shape
/// resample correctly (not just the dataset-canonical 155x240x240 volumes).
fn axis_coords(out_extent: usize, in_extent: usize) -> Vec<f32> {
    if out_extent == 1 {
        return vec![(in_extent - 1) as f32 / 2.0];
    }
    let scale = (in_extent - 1) as f32 / (out_extent - 1) as f32;
    (0..out_extent).map(|i| i as f32 * scale).collect()
}

/// Resample a volume to `target` shape.
///
/// Fails with a shape-validation error unless `target` has exactly three
/// positive extents. The output always has exactly the requested shape.
pub fn resize(input: &Array3<f32>, target: &[usize], method: Interpolation) -> Result<Array3<f32>> {
    match method {
        Interpolation::Trilinear => resize_trilinear(input, target),
        Interpolation::Nearest => resize_nearest(input, target),
    }
}

fn resize_trilinear(input: &Array3<f32>, target: &[usize]) -> Result<Array3<f32>> {
    let [td, th, tw] = check_target(target)?;
    let (d, h, w) = input.dim();
    if d == 0 || h == 0 || w == 0 {
        return Err(Error::InvalidDimensions(
            "cannot resample an empty volume".to_string(),
        ));
    }

    let zs = axis_coords(td, d);
    let ys = axis_coords(th, h);
    let xs = axis_coords(tw, w);

    let mut out = Array3::<f32>::zeros((td, th, tw));
    for (k, &z) in zs.iter().enumerate() {
        let z0 = z.floor() as usize;
        let z1 = (z0 + 1).min(d - 1);
        let wz = z - z0 as f32;
        for (j, &y) in ys.iter().enumerate() {
            let y0 = y.floor() as usize;
            let y1 = (y0 + 1).min(h - 1);
            let wy = y - y0 as f32;
            for (i, &x) in xs.iter().enumerate() {
                let x0 = x.floor() as usize;
                let x1 = (x0 + 1).min(w - 1);
                let wx = x - x0 as f32;

                let c00 = input[[z0, y0, x0]] * (1.0 - wx) + input[[z0, y0, x1]] * wx;
                let c01 = input[[z0, y1, x0]] * (1.0 - wx) + input[[z0, y1, x1]] * wx;
                let c10 = input[[z1, y0, x0]] * (1.0 - wx) + input[[z1, y0, x1]] * wx;
                let c11 = input[[z1, y1, x0]] * (1.0 - wx) + input[[z1, y1, x1]] * wx;

                let c0 = c00 * (1.0 - wy) + c01 * wy;
                let c1 = c10 * (1.0 - wy) + c11 * wy;
                out[[k, j, i]] = c0 * (1.0 - wz) + c1 * wz;
            }
        }
    }
    Ok(out)
}

fn resize_nearest(input: &Array3<f32>, target: &[usize]) -> Result<Array3<f32>> {
    resize_nearest_of(input, target)
}

/// Nearest-neighbor resampling, generic over voxel type.
pub(crate) fn resize_nearest_of<T: Copy + Default>(
    input: &Array3<T>,
    target: &[usize],
) -> Result<Array3<T>> {
    let [td, th, tw] = check_target(target)?;
    let (d, h, w) = input.dim();
    if d == 0 || h == 0 || w == 0 {
        return Err(Error::InvalidDimensions(
            "cannot resample an empty volume".to_string(),
        ));
    }

    let zs = axis_coords(td, d);
    let ys = axis_coords(th, h);
    let xs = axis_coords(tw, w);

    let mut out = Array3::<T>::from_elem((td, th, tw), T::default());
    for (k, &z) in zs.iter().enumerate() {
        let zi = (z.round() as usize).min(d - 1);
        for (j, &y) in ys.iter().enumerate() {
            let yi = (y.round() as usize).min(h - 1);
            for (i, &x) in xs.iter().enumerate() {
                let xi = (x.round() as usize).min(w - 1);
                out[[k, j, i]] = input[[zi, yi, xi]];
            }
        }
    }
    Ok(out)
}

/// Z-score normalize over the whole array, population mean and std.
///
/// Zero-variance (uniform) volumes are rejected rather than dividing by
/// zero and feeding NaN into training tensors.
pub fn z_normalization(input: &Array3<f32>) -> Result<Array3<f32>> {
    let n = input.len();
    if n == 0 {
        return Err(Error::InvalidDimensions(
            "cannot normalize an empty volume".to_string(),
        ));
    }

    let mean = input.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let var = input
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    let std = var.sqrt();

    if !std.is_finite() || std == 0.0 {
        return Err(Error::DegenerateVolume);
    }

    let mean = mean as f32;
    let std = std as f32;
    Ok(input.mapv(|v| (v - mean) / std))
}

/// Standard intensity preprocessing: optional trilinear resample, then
/// z-score normalization.
pub fn preprocess_volume(input: &Array3<f32>, out_shape: Option<&[usize]>) -> Result<Array3<f32>> {
    match out_shape {
        Some(shape) => {
            let resized = resize(input, shape, Interpolation::Trilinear)?;
            z_normalization(&resized)
        }
        None => z_normalization(input),
    }
}

/// Split an integer-coded segmentation into per-class binary mask channels.
///
/// Channel order is fixed: NCR/NET (code 1), ED (code 2), ET (code 4). Each
/// mask is resampled independently with nearest-neighbor interpolation when
/// `out_shape` is given, then the three are stacked along a leading channel
/// axis as u8.
pub fn split_labels(labels: &Array3<u8>, out_shape: Option<&[usize]>) -> Result<Array4<u8>> {
    let (d, h, w) = labels.dim();
    let [od, oh, ow] = match out_shape {
        Some(shape) => check_target(shape)?,
        None => [d, h, w],
    };

    let mut out = Array4::<u8>::zeros((TUMOR_CLASSES.len(), od, oh, ow));
    for (channel, &code) in TUMOR_CLASSES.iter().enumerate() {
        let mask = labels.mapv(|v| u8::from(v == code));
        debug_assert_eq!(mask.len(), labels.len());

        let mask = match out_shape {
            Some(shape) => resize_nearest_of(&mask, shape)?,
            None => mask,
        };
        out.index_axis_mut(Axis(0), channel).assign(&mask);
    }
    Ok(out)
}
