//! NIfTI-1 header parsing and serialization.
//!
//! BraTS archives ship NIfTI-1 volumes only, so this module reads exactly
//! that: the 348-byte header, either endianness, and the voxel data types
//! the dataset actually contains.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte offsets of the NIfTI-1 header fields used by this crate.
mod offsets {
    pub const SIZEOF_HDR: usize = 0;
    pub const DIM: usize = 40;
    pub const DATATYPE: usize = 70;
    pub const BITPIX: usize = 72;
    pub const PIXDIM: usize = 76;
    pub const VOX_OFFSET: usize = 108;
    pub const SCL_SLOPE: usize = 112;
    pub const SCL_INTER: usize = 116;
    pub const DESCRIP: usize = 148;
    pub const AUX_FILE: usize = 228;
    pub const MAGIC: usize = 344;
}

/// Voxel data type codes found in BraTS volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    /// Unsigned 8-bit integer
    UInt8 = 2,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Signed 32-bit integer
    Int32 = 8,
    /// 32-bit floating point
    Float32 = 16,
    /// 64-bit floating point
    Float64 = 64,
    /// Unsigned 16-bit integer
    UInt16 = 512,
}

impl DataType {
    /// Parse from a NIfTI datatype code.
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(Self::UInt8),
            4 => Ok(Self::Int16),
            8 => Ok(Self::Int32),
            16 => Ok(Self::Float32),
            64 => Ok(Self::Float64),
            512 => Ok(Self::UInt16),
            _ => Err(Error::UnsupportedDataType(code)),
        }
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Rust name of the element type.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::UInt8 => "u8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Parsed NIfTI-1 header.
///
/// Dimensions are kept in file order (fastest-varying axis first); the
/// in-memory (slice, row, column) reversal happens when the voxel payload is
/// materialized, not here.
#[derive(Debug, Clone)]
pub struct NiftiHeader {
    /// Number of dimensions (1-7).
    pub ndim: u8,
    /// Size along each dimension, file order.
    pub dim: [i64; 7],
    /// Voxel data type.
    pub datatype: DataType,
    /// Voxel sizes; pixdim[1..=ndim] are the grid spacings.
    pub pixdim: [f32; 8],
    /// Offset of the voxel payload in the file.
    pub vox_offset: i64,
    /// Data scaling slope (0 means "no scaling" per the standard).
    pub scl_slope: f32,
    /// Data scaling intercept.
    pub scl_inter: f32,
    /// Free-form description string.
    pub descrip: String,
    /// File endianness (true = little endian).
    pub(crate) little_endian: bool,
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            ndim: 3,
            dim: [1, 1, 1, 1, 1, 1, 1],
            datatype: DataType::Float32,
            pixdim: [1.0; 8],
            vox_offset: 352,
            scl_slope: 1.0,
            scl_inter: 0.0,
            descrip: String::new(),
            little_endian: true,
        }
    }
}

impl NiftiHeader {
    /// Size of a NIfTI-1 header in bytes.
    pub const SIZE: usize = 348;

    /// Read a header from bytes with automatic endianness detection.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "header too short: got {} bytes, need {}",
                    bytes.len(),
                    Self::SIZE
                ),
            )));
        }

        // sizeof_hdr doubles as the endianness probe
        let sizeof_le = LittleEndian::read_i32(&bytes[offsets::SIZEOF_HDR..4]);
        let sizeof_be = BigEndian::read_i32(&bytes[offsets::SIZEOF_HDR..4]);

        if sizeof_le == 348 {
            Self::parse::<LittleEndian>(bytes, true)
        } else if sizeof_be == 348 {
            Self::parse::<BigEndian>(bytes, false)
        } else {
            Err(Error::InvalidMagic([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]))
        }
    }

    #[allow(clippy::wildcard_imports)]
    fn parse<E: ByteOrder>(bytes: &[u8], little_endian: bool) -> Result<Self> {
        use offsets::*;

        let magic = &bytes[MAGIC..MAGIC + 4];
        if magic != b"n+1\0" && magic != b"ni1\0" {
            return Err(Error::InvalidMagic([
                magic[0], magic[1], magic[2], magic[3],
            ]));
        }

        let ndim_raw = E::read_i16(&bytes[DIM..DIM + 2]);
        if !(1..=7).contains(&ndim_raw) {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {}",
                ndim_raw
            )));
        }
        let ndim = ndim_raw as u8;

        let mut dim = [0i64; 7];
        for (i, dim_val) in dim.iter_mut().enumerate() {
            let offset = DIM + 2 + i * 2;
            let dim_raw = E::read_i16(&bytes[offset..offset + 2]);
            if dim_raw < 0 {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {} has negative value: {}",
                    i, dim_raw
                )));
            }
            *dim_val = i64::from(dim_raw);
        }

        let datatype = DataType::from_code(E::read_i16(&bytes[DATATYPE..DATATYPE + 2]))?;
        let bitpix = E::read_i16(&bytes[BITPIX..BITPIX + 2]);
        let expected_bitpix = (datatype.byte_size() * 8) as i16;
        if bitpix != expected_bitpix {
            return Err(Error::InvalidDimensions(format!(
                "bitpix {} does not match datatype {} (expected {})",
                bitpix,
                datatype.type_name(),
                expected_bitpix
            )));
        }

        let mut pixdim = [0.0f32; 8];
        for (i, pix_val) in pixdim.iter_mut().enumerate() {
            let offset = PIXDIM + i * 4;
            *pix_val = E::read_f32(&bytes[offset..offset + 4]);
        }

        let vox_offset_raw = E::read_f32(&bytes[VOX_OFFSET..VOX_OFFSET + 4]);
        if !vox_offset_raw.is_finite() || vox_offset_raw.fract() != 0.0 || vox_offset_raw < 0.0 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset must be a non-negative integer, got {}",
                vox_offset_raw
            )));
        }

        let descrip = String::from_utf8_lossy(&bytes[DESCRIP..AUX_FILE])
            .trim_end_matches('\0')
            .to_string();

        Ok(Self {
            ndim,
            dim,
            datatype,
            pixdim,
            vox_offset: vox_offset_raw as i64,
            scl_slope: E::read_f32(&bytes[SCL_SLOPE..SCL_SLOPE + 4]),
            scl_inter: E::read_f32(&bytes[SCL_INTER..SCL_INTER + 4]),
            descrip,
            little_endian,
        })
    }

    /// Serialize to a 348-byte NIfTI-1 header (always little endian).
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        use offsets::{
            AUX_FILE, DATATYPE, BITPIX, DESCRIP, DIM, MAGIC, PIXDIM, SCL_INTER, SCL_SLOPE,
            SIZEOF_HDR, VOX_OFFSET,
        };

        let mut bytes = [0u8; Self::SIZE];
        LittleEndian::write_i32(&mut bytes[SIZEOF_HDR..4], 348);

        LittleEndian::write_i16(&mut bytes[DIM..DIM + 2], i16::from(self.ndim));
        for (i, &d) in self.dim.iter().enumerate() {
            let offset = DIM + 2 + i * 2;
            LittleEndian::write_i16(&mut bytes[offset..offset + 2], d.max(1) as i16);
        }

        LittleEndian::write_i16(&mut bytes[DATATYPE..DATATYPE + 2], self.datatype as i16);
        LittleEndian::write_i16(
            &mut bytes[BITPIX..BITPIX + 2],
            (self.datatype.byte_size() * 8) as i16,
        );

        for (i, &p) in self.pixdim.iter().enumerate() {
            let offset = PIXDIM + i * 4;
            LittleEndian::write_f32(&mut bytes[offset..offset + 4], p);
        }

        LittleEndian::write_f32(
            &mut bytes[VOX_OFFSET..VOX_OFFSET + 4],
            self.vox_offset as f32,
        );
        LittleEndian::write_f32(&mut bytes[SCL_SLOPE..SCL_SLOPE + 4], self.scl_slope);
        LittleEndian::write_f32(&mut bytes[SCL_INTER..SCL_INTER + 4], self.scl_inter);

        let descrip_bytes = self.descrip.as_bytes();
        let n = descrip_bytes.len().min(AUX_FILE - DESCRIP - 1);
        bytes[DESCRIP..DESCRIP + n].copy_from_slice(&descrip_bytes[..n]);

        bytes[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");
        bytes
    }

    /// Shape in file order, trimmed to `ndim` entries.
    pub fn shape(&self) -> Vec<usize> {
        self.dim[..self.ndim as usize]
            .iter()
            .map(|&d| d as usize)
            .collect()
    }

    /// Total voxel payload size in bytes.
    pub fn data_size(&self) -> usize {
        let numel: i64 = self.dim[..self.ndim as usize].iter().product();
        numel as usize * self.datatype.byte_size()
    }

    /// Check that the header can be written as NIfTI-1.
    pub fn validate(&self) -> Result<()> {
        if !(1..=7).contains(&self.ndim) {
            return Err(Error::InvalidDimensions(format!(
                "ndim must be 1..=7, got {}",
                self.ndim
            )));
        }
        for (i, &d) in self.dim[..self.ndim as usize].iter().enumerate() {
            if d < 1 || d > i64::from(i16::MAX) {
                return Err(Error::InvalidDimensions(format!(
                    "dimension {} out of NIfTI-1 range: {}",
                    i, d
                )));
            }
        }
        if self.vox_offset < Self::SIZE as i64 + 4 {
            return Err(Error::InvalidDimensions(format!(
                "vox_offset {} overlaps the header",
                self.vox_offset
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> NiftiHeader {
        NiftiHeader {
            ndim: 3,
            dim: [4, 5, 6, 1, 1, 1, 1],
            datatype: DataType::Int16,
            pixdim: [1.0, 1.0, 1.0, 2.5, 1.0, 1.0, 1.0, 1.0],
            descrip: "synthetic".to_string(),
            ..NiftiHeader::default()
        }
    }

    #[test]
    fn roundtrip_preserves_fields() {
        let header = sample_header();
        let parsed = NiftiHeader::from_bytes(&header.to_bytes()).unwrap();

        assert_eq!(parsed.ndim, 3);
        assert_eq!(parsed.dim[..3], [4, 5, 6]);
        assert_eq!(parsed.datatype, DataType::Int16);
        assert_eq!(parsed.pixdim[3], 2.5);
        assert_eq!(parsed.descrip, "synthetic");
        assert!(parsed.little_endian);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[offsets::MAGIC..offsets::MAGIC + 4].copy_from_slice(b"BAD!");

        let err = NiftiHeader::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("invalid NIfTI magic"));
    }

    #[test]
    fn rejects_unsupported_datatype() {
        let mut bytes = sample_header().to_bytes();
        LittleEndian::write_i16(&mut bytes[offsets::DATATYPE..offsets::DATATYPE + 2], 9999);

        let err = NiftiHeader::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported data type"));
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(NiftiHeader::from_bytes(&[0u8; 100]).is_err());
    }

    #[test]
    fn big_endian_detection() {
        let le = sample_header().to_bytes();
        let mut be = [0u8; NiftiHeader::SIZE];
        be.copy_from_slice(&le);
        BigEndian::write_i32(&mut be[0..4], 348);
        for i in 0..8 {
            let off = offsets::DIM + i * 2;
            let v = LittleEndian::read_i16(&le[off..off + 2]);
            BigEndian::write_i16(&mut be[off..off + 2], v);
        }
        BigEndian::write_i16(
            &mut be[offsets::DATATYPE..offsets::DATATYPE + 2],
            DataType::Int16 as i16,
        );
        BigEndian::write_i16(&mut be[offsets::BITPIX..offsets::BITPIX + 2], 16);
        for i in 0..8 {
            let off = offsets::PIXDIM + i * 4;
            let v = LittleEndian::read_f32(&le[off..off + 4]);
            BigEndian::write_f32(&mut be[off..off + 4], v);
        }
        BigEndian::write_f32(&mut be[offsets::VOX_OFFSET..offsets::VOX_OFFSET + 4], 352.0);
        BigEndian::write_f32(&mut be[offsets::SCL_SLOPE..offsets::SCL_SLOPE + 4], 1.0);

        let parsed = NiftiHeader::from_bytes(&be).unwrap();
        assert!(!parsed.little_endian);
        assert_eq!(parsed.dim[..3], [4, 5, 6]);
    }

    #[test]
    fn data_size_counts_all_dims() {
        assert_eq!(sample_header().data_size(), 4 * 5 * 6 * 2);
    }

    #[test]
    fn validate_rejects_zero_extent() {
        let mut header = sample_header();
        header.dim[0] = 0;
        assert!(header.validate().is_err());
    }
}
