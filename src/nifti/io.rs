//! NIfTI file I/O.
//!
//! Optimizations:
//! - Memory-mapped reading for uncompressed `.nii` files
//! - Single-pass libdeflate decompression for `.nii.gz`, sized from the gzip
//!   ISIZE trailer, with a streaming flate2 fallback for multi-member files

use crate::error::{Error, Result};
use crate::nifti::header::NiftiHeader;
use crate::nifti::volume::Volume;
use flate2::bufread::MultiGzDecoder;
use libdeflater::{DecompressionError, Decompressor};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

thread_local! {
    static DECOMPRESSOR: std::cell::RefCell<Decompressor> =
        std::cell::RefCell::new(Decompressor::new());
}

const GZIP_BUFFER_SIZE: usize = 256 * 1024;

#[cfg(target_os = "linux")]
fn read_file_with_readahead(path: &Path) -> Result<Vec<u8>> {
    use std::os::unix::io::AsRawFd;

    let file = File::open(path)?;
    let fd = file.as_raw_fd();
    let len = file.metadata()?.len() as usize;

    // POSIX_FADV_SEQUENTIAL = hint that we'll read front to back
    unsafe {
        libc::posix_fadvise(fd, 0, len as libc::off_t, libc::POSIX_FADV_SEQUENTIAL);
    }

    let mut buffer = Vec::with_capacity(len);
    let mut reader = BufReader::with_capacity(GZIP_BUFFER_SIZE, file);
    reader.read_to_end(&mut buffer)?;
    Ok(buffer)
}

#[cfg(not(target_os = "linux"))]
fn read_file_with_readahead(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

fn ensure_no_extensions(bytes: &[u8], header: &NiftiHeader) -> Result<()> {
    let vox_offset = header.vox_offset as usize;
    if vox_offset >= NiftiHeader::SIZE + 4 && bytes.len() >= NiftiHeader::SIZE + 4 {
        let extension_flag = bytes[NiftiHeader::SIZE];
        if extension_flag != 0 {
            return Err(Error::InvalidFileFormat(
                "NIfTI extensions are not supported".to_string(),
            ));
        }
    }
    Ok(())
}

/// Load a volume from file.
///
/// Supports both `.nii` and `.nii.gz` with automatic detection.
#[must_use = "this function returns a loaded volume that should be used"]
pub fn load<P: AsRef<Path>>(path: P) -> Result<Volume> {
    let path = path.as_ref();
    let is_gzipped = path.extension().is_some_and(|e| e == "gz");

    if is_gzipped {
        load_gzipped(path)
    } else {
        load_uncompressed(path)
    }
}

fn estimate_gzip_uncompressed_size(compressed: &[u8]) -> usize {
    // ISIZE per RFC 1952: "original input size modulo 2^32".
    // Only reliable for single-member gzip < 4GB, which is what BraTS ships.
    if compressed.len() >= 4 {
        let trailer = &compressed[compressed.len() - 4..];
        u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize
    } else {
        compressed.len() * 4
    }
}

fn decompress_gzip_streaming(compressed: &[u8]) -> Result<Vec<u8>> {
    let cursor = std::io::Cursor::new(compressed);
    let mut decoder = MultiGzDecoder::new(BufReader::with_capacity(GZIP_BUFFER_SIZE, cursor));

    let estimated = estimate_gzip_uncompressed_size(compressed);
    let mut output = Vec::with_capacity(estimated);

    decoder
        .read_to_end(&mut output)
        .map_err(|e| Error::Decompression(format!("gzip stream decode failed: {e}")))?;
    Ok(output)
}

#[allow(clippy::uninit_vec)]
fn decompress_gzip_with_fallback(compressed: &[u8]) -> Result<(Vec<u8>, bool)> {
    let estimated_size = estimate_gzip_uncompressed_size(compressed);
    let buffer_size = estimated_size.max(NiftiHeader::SIZE);

    // SAFETY: libdeflate writes the buffer front to back and reports the
    // written length; we truncate to it before the buffer is ever read. On
    // failure the buffer is dropped unread.
    let mut output = Vec::with_capacity(buffer_size);
    unsafe {
        output.set_len(buffer_size);
    }

    let result = DECOMPRESSOR.with(|d| d.borrow_mut().gzip_decompress(compressed, &mut output));

    match result {
        Ok(written) => {
            output.truncate(written);
            Ok((output, false))
        }
        Err(DecompressionError::InsufficientSpace) => {
            drop(output);
            let output = decompress_gzip_streaming(compressed)?;
            Ok((output, true))
        }
        Err(e) => Err(Error::Decompression(format!("{}", e))),
    }
}

fn parse_decompressed(bytes: &[u8]) -> Result<(NiftiHeader, usize, usize)> {
    if bytes.len() < NiftiHeader::SIZE {
        return Err(Error::Decompression(format!(
            "decompressed data too small for NIfTI header: {} bytes (need at least {})",
            bytes.len(),
            NiftiHeader::SIZE
        )));
    }
    let header = NiftiHeader::from_bytes(bytes)?;
    ensure_no_extensions(bytes, &header)?;
    let offset = header.vox_offset as usize;
    let data_size = header.data_size();
    Ok((header, offset, data_size))
}

/// Load a gzipped `.nii.gz` file with single-pass decompression.
///
/// Falls back to streaming decode if the ISIZE estimate is insufficient
/// (multi-member gzip or payloads over 4GB).
fn load_gzipped(path: &Path) -> Result<Volume> {
    let compressed = read_file_with_readahead(path)?;
    let (mut output, used_streaming) = decompress_gzip_with_fallback(&compressed)?;

    let (mut header, mut offset, mut data_size) = parse_decompressed(&output)?;
    let mut expected_size = offset + data_size;

    if output.len() != expected_size {
        if used_streaming {
            return Err(Error::Decompression(format!(
                "decompressed size {} did not match expected {} (header offset {} + data size {})",
                output.len(),
                expected_size,
                offset,
                data_size
            )));
        }

        // ISIZE lied; redo with the streaming decoder before giving up.
        output = decompress_gzip_streaming(&compressed)?;
        let parsed = parse_decompressed(&output)?;
        header = parsed.0;
        offset = parsed.1;
        data_size = parsed.2;
        expected_size = offset + data_size;

        if output.len() != expected_size {
            return Err(Error::Decompression(format!(
                "decompressed size {} did not match expected {} (header offset {} + data size {})",
                output.len(),
                expected_size,
                offset,
                data_size
            )));
        }
    }

    Volume::from_bytes(header, &output[offset..offset + data_size])
}

/// Load an uncompressed `.nii` file using memory mapping.
#[allow(unsafe_code)]
fn load_uncompressed(path: &Path) -> Result<Volume> {
    let file = File::open(path)?;
    // SAFETY: the mapping is read-only and dropped before this function
    // returns; external modification can tear the data but not cause UB.
    let mmap = unsafe { Mmap::map(&file)? };

    let header = NiftiHeader::from_bytes(&mmap)?;
    ensure_no_extensions(&mmap[..], &header)?;
    let offset = header.vox_offset as usize;
    let data_size = header.data_size();

    if mmap.len() < offset + data_size {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "file truncated",
        )));
    }

    Volume::from_bytes(header, &mmap[offset..offset + data_size])
}

/// Save a volume to file.
///
/// Format is determined by the extension (`.nii` or `.nii.gz`).
pub fn save<P: AsRef<Path>>(volume: &Volume, path: P) -> Result<()> {
    volume.header().validate()?;

    let path = path.as_ref();
    let is_gzipped = path.extension().is_some_and(|e| e == "gz");

    if is_gzipped {
        save_gzipped(volume, path)
    } else {
        save_uncompressed(volume, path)
    }
}

fn serialize(volume: &Volume) -> Vec<u8> {
    let header_bytes = volume.header().to_bytes();
    let padding = volume.header().vox_offset as usize - NiftiHeader::SIZE;
    let data = volume.data_to_bytes();

    let mut bytes = Vec::with_capacity(header_bytes.len() + padding + data.len());
    bytes.extend_from_slice(&header_bytes);
    bytes.resize(bytes.len() + padding, 0u8);
    bytes.extend_from_slice(&data);
    bytes
}

fn save_uncompressed(volume: &Volume, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);
    writer.write_all(&serialize(volume))?;
    writer.flush()?;
    Ok(())
}

fn save_gzipped(volume: &Volume, path: &Path) -> Result<()> {
    let uncompressed = serialize(volume);

    // Level 1 = fastest; these are throwaway training inputs, not archives.
    let mut compressor = libdeflater::Compressor::new(libdeflater::CompressionLvl::fastest());
    let max_compressed_size = compressor.gzip_compress_bound(uncompressed.len());
    let mut compressed = vec![0u8; max_compressed_size];

    let actual_size = compressor
        .gzip_compress(&uncompressed, &mut compressed)
        .map_err(|e| Error::Io(std::io::Error::other(format!("compression failed: {e:?}"))))?;
    compressed.truncate(actual_size);

    let mut file = File::create(path)?;
    file.write_all(&compressed)?;
    Ok(())
}
