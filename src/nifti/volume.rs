//! In-memory volume representation.
//!
//! Voxels are held in (slice, row, column) axis order, the reverse of the
//! on-disk Fortran layout. Reversing the axes makes the raw file payload a
//! valid C-order buffer, so decoding is a straight element-wise read with no
//! index shuffling.

use crate::error::{Error, Result};
use crate::nifti::header::{DataType, NiftiHeader};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use ndarray::Array3;

/// Dtype-tagged dense voxel payload.
#[derive(Debug, Clone)]
pub enum VoxelData {
    /// Unsigned 8-bit voxels (typical for segmentation volumes).
    U8(Array3<u8>),
    /// Signed 16-bit voxels (typical for scan modalities).
    I16(Array3<i16>),
    /// Unsigned 16-bit voxels.
    U16(Array3<u16>),
    /// Signed 32-bit voxels.
    I32(Array3<i32>),
    /// 32-bit float voxels.
    F32(Array3<f32>),
    /// 64-bit float voxels.
    F64(Array3<f64>),
}

impl VoxelData {
    /// Shape as (slice, row, column).
    pub fn shape(&self) -> [usize; 3] {
        macro_rules! dims {
            ($a:expr) => {{
                let (d, h, w) = $a.dim();
                [d, h, w]
            }};
        }
        match self {
            Self::U8(a) => dims!(a),
            Self::I16(a) => dims!(a),
            Self::U16(a) => dims!(a),
            Self::I32(a) => dims!(a),
            Self::F32(a) => dims!(a),
            Self::F64(a) => dims!(a),
        }
    }

    /// Data type tag matching the header vocabulary.
    pub fn dtype(&self) -> DataType {
        match self {
            Self::U8(_) => DataType::UInt8,
            Self::I16(_) => DataType::Int16,
            Self::U16(_) => DataType::UInt16,
            Self::I32(_) => DataType::Int32,
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
        }
    }
}

/// A decoded volume: header plus voxel payload.
#[derive(Debug, Clone)]
pub struct Volume {
    header: NiftiHeader,
    data: VoxelData,
}

impl Volume {
    /// Decode the voxel payload that follows `header` in a NIfTI file.
    ///
    /// `bytes` must be exactly the payload slice (`header.data_size()` long).
    pub fn from_bytes(header: NiftiHeader, bytes: &[u8]) -> Result<Self> {
        let expected = header.data_size();
        if bytes.len() != expected {
            return Err(Error::InvalidFileFormat(format!(
                "voxel payload is {} bytes, header expects {}",
                bytes.len(),
                expected
            )));
        }

        let [d, h, w] = spatial_shape(&header)?;

        let data = if header.little_endian {
            decode::<LittleEndian>(header.datatype, bytes, [d, h, w])?
        } else {
            decode::<BigEndian>(header.datatype, bytes, [d, h, w])?
        };

        Ok(Self { header, data })
    }

    /// Wrap an f32 array (slice, row, column) in a default header.
    pub fn from_f32(array: Array3<f32>) -> Self {
        let (d, h, w) = array.dim();
        let header = header_for([d, h, w], DataType::Float32);
        Self {
            header,
            data: VoxelData::F32(array),
        }
    }

    /// Wrap a u8 label array (slice, row, column) in a default header.
    pub fn from_u8(array: Array3<u8>) -> Self {
        let (d, h, w) = array.dim();
        let header = header_for([d, h, w], DataType::UInt8);
        Self {
            header,
            data: VoxelData::U8(array),
        }
    }

    /// The header this volume was decoded from (or synthesized with).
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// Shape as (slice, row, column).
    pub fn shape(&self) -> [usize; 3] {
        self.data.shape()
    }

    /// Voxel data type.
    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    /// Borrow the raw payload.
    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    /// Materialize as f32, applying the header's slope/intercept scaling.
    ///
    /// A slope of 0 means "unscaled" per the NIfTI standard.
    pub fn to_f32(&self) -> Array3<f32> {
        let slope = if self.header.scl_slope == 0.0 {
            1.0
        } else {
            self.header.scl_slope
        };
        let inter = self.header.scl_inter;

        macro_rules! scale {
            ($a:expr) => {
                $a.mapv(|v| v as f32 * slope + inter)
            };
        }
        match &self.data {
            VoxelData::U8(a) => scale!(a),
            VoxelData::I16(a) => scale!(a),
            VoxelData::U16(a) => scale!(a),
            VoxelData::I32(a) => scale!(a),
            VoxelData::F32(a) => scale!(a),
            VoxelData::F64(a) => scale!(a),
        }
    }

    /// Materialize as integer class codes.
    ///
    /// Fails on fractional or out-of-range values so a miswritten
    /// segmentation file surfaces as a typed error instead of a silently
    /// wrong mask.
    pub fn to_labels(&self) -> Result<Array3<u8>> {
        let scaled = self.to_f32();
        let mut out = Array3::<u8>::zeros(scaled.dim());
        for (dst, &v) in out.iter_mut().zip(scaled.iter()) {
            if !v.is_finite() || v.fract() != 0.0 || !(0.0..=255.0).contains(&v) {
                return Err(Error::UnexpectedLabel(f64::from(v)));
            }
            *dst = v as u8;
        }
        Ok(out)
    }

    /// Serialize the payload in file (Fortran) order, little endian.
    pub(crate) fn data_to_bytes(&self) -> Vec<u8> {
        macro_rules! encode {
            ($a:expr, $width:expr, $write:path) => {{
                let contiguous = $a.as_standard_layout();
                let mut bytes = vec![0u8; contiguous.len() * $width];
                for (chunk, &v) in bytes.chunks_exact_mut($width).zip(contiguous.iter()) {
                    $write(chunk, v);
                }
                bytes
            }};
        }
        match &self.data {
            VoxelData::U8(a) => a.as_standard_layout().iter().copied().collect(),
            VoxelData::I16(a) => encode!(a, 2, LittleEndian::write_i16),
            VoxelData::U16(a) => encode!(a, 2, LittleEndian::write_u16),
            VoxelData::I32(a) => encode!(a, 4, LittleEndian::write_i32),
            VoxelData::F32(a) => encode!(a, 4, LittleEndian::write_f32),
            VoxelData::F64(a) => encode!(a, 8, LittleEndian::write_f64),
        }
    }
}

/// Extract the three spatial extents, requiring any trailing dims to be 1.
fn spatial_shape(header: &NiftiHeader) -> Result<[usize; 3]> {
    let shape = header.shape();
    if shape.len() < 3 {
        return Err(Error::InvalidDimensions(format!(
            "expected a 3D volume, got {}D",
            shape.len()
        )));
    }
    if shape[3..].iter().any(|&d| d > 1) {
        return Err(Error::InvalidDimensions(format!(
            "expected a 3D volume, got non-trivial extra dimensions: {:?}",
            shape
        )));
    }
    // Reverse file order (i, j, k) into (slice, row, column)
    Ok([shape[2], shape[1], shape[0]])
}

/// Default header for a synthesized array, dims reversed back to file order.
fn header_for(shape: [usize; 3], datatype: DataType) -> NiftiHeader {
    let mut header = NiftiHeader {
        datatype,
        ..NiftiHeader::default()
    };
    header.ndim = 3;
    header.dim[0] = shape[2] as i64;
    header.dim[1] = shape[1] as i64;
    header.dim[2] = shape[0] as i64;
    header
}

fn decode<E: ByteOrder>(
    datatype: DataType,
    bytes: &[u8],
    shape: [usize; 3],
) -> Result<VoxelData> {
    let [d, h, w] = shape;
    let numel = d * h * w;

    fn shape_mismatch(_: ndarray::ShapeError) -> Error {
        Error::InvalidDimensions("payload length does not match header shape".to_string())
    }

    macro_rules! decode_wide {
        ($t:ty, $read_into:path, $variant:ident) => {{
            let mut elems = vec![<$t>::default(); numel];
            $read_into(bytes, &mut elems);
            Ok(VoxelData::$variant(
                Array3::from_shape_vec((d, h, w), elems).map_err(shape_mismatch)?,
            ))
        }};
    }

    match datatype {
        DataType::UInt8 => Ok(VoxelData::U8(
            Array3::from_shape_vec((d, h, w), bytes.to_vec()).map_err(shape_mismatch)?,
        )),
        DataType::Int16 => decode_wide!(i16, E::read_i16_into, I16),
        DataType::UInt16 => decode_wide!(u16, E::read_u16_into, U16),
        DataType::Int32 => decode_wide!(i32, E::read_i32_into, I32),
        DataType::Float32 => decode_wide!(f32, E::read_f32_into, F32),
        DataType::Float64 => decode_wide!(f64, E::read_f64_into, F64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;

    #[test]
    fn decode_reverses_axis_order() {
        // File dims (2, 3, 4): i fastest. Element (i, j, k) = i + 2j + 6k.
        let mut header = NiftiHeader {
            ndim: 3,
            dim: [2, 3, 4, 1, 1, 1, 1],
            datatype: DataType::UInt8,
            ..NiftiHeader::default()
        };
        header.scl_slope = 1.0;
        let bytes: Vec<u8> = (0..24).collect();

        let vol = Volume::from_bytes(header, &bytes).unwrap();
        assert_eq!(vol.shape(), [4, 3, 2]);

        let f = vol.to_f32();
        // (slice k, row j, col i) must read the file element (i, j, k)
        assert_eq!(f[[0, 0, 1]], 1.0);
        assert_eq!(f[[0, 1, 0]], 2.0);
        assert_eq!(f[[1, 0, 0]], 6.0);
        assert_eq!(f[[3, 2, 1]], 23.0);
    }

    #[test]
    fn scaling_applied_on_materialize() {
        let mut header = NiftiHeader {
            ndim: 3,
            dim: [2, 1, 1, 1, 1, 1, 1],
            datatype: DataType::Int16,
            ..NiftiHeader::default()
        };
        header.scl_slope = 2.0;
        header.scl_inter = -1.0;
        let mut bytes = vec![0u8; 4];
        LittleEndian::write_i16(&mut bytes[0..2], 3);
        LittleEndian::write_i16(&mut bytes[2..4], 5);

        let vol = Volume::from_bytes(header, &bytes).unwrap();
        let f = vol.to_f32();
        assert_abs_diff_eq!(f[[0, 0, 0]], 5.0);
        assert_abs_diff_eq!(f[[0, 0, 1]], 9.0);
    }

    #[test]
    fn zero_slope_means_unscaled() {
        let mut header = NiftiHeader {
            ndim: 3,
            dim: [1, 1, 1, 1, 1, 1, 1],
            datatype: DataType::UInt8,
            ..NiftiHeader::default()
        };
        header.scl_slope = 0.0;

        let vol = Volume::from_bytes(header, &[7]).unwrap();
        assert_eq!(vol.to_f32()[[0, 0, 0]], 7.0);
    }

    #[test]
    fn labels_reject_fractional_values() {
        let arr = Array3::from_shape_vec((1, 1, 2), vec![1.0f32, 2.5]).unwrap();
        let vol = Volume::from_f32(arr);
        assert!(matches!(
            vol.to_labels(),
            Err(Error::UnexpectedLabel(v)) if v == 2.5
        ));
    }

    #[test]
    fn labels_roundtrip_codes() {
        let arr = Array3::from_shape_vec((1, 2, 2), vec![0u8, 1, 2, 4]).unwrap();
        let vol = Volume::from_u8(arr.clone());
        assert_eq!(vol.to_labels().unwrap(), arr);
    }

    #[test]
    fn payload_size_mismatch_is_an_error() {
        let header = NiftiHeader {
            ndim: 3,
            dim: [2, 2, 2, 1, 1, 1, 1],
            datatype: DataType::UInt8,
            ..NiftiHeader::default()
        };
        assert!(Volume::from_bytes(header, &[0u8; 7]).is_err());
    }

    #[test]
    fn four_dim_with_unit_tail_is_accepted() {
        let header = NiftiHeader {
            ndim: 4,
            dim: [2, 2, 2, 1, 1, 1, 1],
            datatype: DataType::UInt8,
            ..NiftiHeader::default()
        };
        let vol = Volume::from_bytes(header, &[0u8; 8]).unwrap();
        assert_eq!(vol.shape(), [2, 2, 2]);
    }
}
