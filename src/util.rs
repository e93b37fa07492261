//! Bounds-checked primitives for binary data processing.
//!
//! Every reader in this module validates `offset + len` against the buffer
//! before touching it, so header parsers can follow untrusted offsets and
//! surface [`Error::OutOfBounds`] instead of panicking.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use zerocopy::FromBytes;

use crate::error::{Error, Result};

// =============================================================================
// Slicing
// =============================================================================

/// Returns `data[offset..offset + len]`, or an out of bounds error.
#[inline]
pub fn slice_at(data: &[u8], offset: u64, len: u64) -> Result<&[u8]> {
    let size = data.len() as u64;
    let end = offset
        .checked_add(len)
        .ok_or_else(|| Error::out_of_bounds(offset, len, size))?;
    if end > size {
        return Err(Error::out_of_bounds(offset, len, size));
    }
    Ok(&data[offset as usize..end as usize])
}

/// Returns `data[offset..]`, or an out of bounds error.
#[inline]
pub fn tail_at(data: &[u8], offset: u64) -> Result<&[u8]> {
    let size = data.len() as u64;
    if offset > size {
        return Err(Error::out_of_bounds(offset, 0, size));
    }
    Ok(&data[offset as usize..])
}

/// Reads a fixed-size on-disk record at `offset`.
#[inline]
pub fn read_record<T: FromBytes>(data: &[u8], offset: u64) -> Result<T> {
    let bytes = slice_at(data, offset, std::mem::size_of::<T>() as u64)?;
    T::read_from_bytes(bytes).map_err(|_| {
        Error::parse(
            offset as usize,
            format!("failed to read {}", std::any::type_name::<T>()),
        )
    })
}

// =============================================================================
// Byte Order
// =============================================================================

/// Byte order declared by an executable header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Least significant byte first
    Little,
    /// Most significant byte first
    Big,
}

impl Endian {
    /// Decodes a u16 field.
    #[inline]
    pub fn u16(self, field: [u8; 2]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(&field),
            Endian::Big => BigEndian::read_u16(&field),
        }
    }

    /// Decodes a u32 field.
    #[inline]
    pub fn u32(self, field: [u8; 4]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(&field),
            Endian::Big => BigEndian::read_u32(&field),
        }
    }

    /// Decodes a u64 field.
    #[inline]
    pub fn u64(self, field: [u8; 8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(&field),
            Endian::Big => BigEndian::read_u64(&field),
        }
    }

    /// Encodes a u16 field.
    #[inline]
    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    /// Encodes a u32 field.
    #[inline]
    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }

    /// Encodes a u64 field.
    #[inline]
    pub fn u64_bytes(self, value: u64) -> [u8; 8] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

// =============================================================================
// Little-endian Reads
// =============================================================================

/// Reads a little-endian u64 at the given offset.
#[inline]
pub fn read_u64_le_at(data: &[u8], offset: u64) -> Result<u64> {
    Ok(LittleEndian::read_u64(slice_at(data, offset, 8)?))
}

/// Appends a little-endian u64 to a buffer.
#[inline]
pub fn write_u64_le(out: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    out.extend_from_slice(&buf);
}

// =============================================================================
// Strings
// =============================================================================

/// Finds the position of the first null byte in a slice.
#[inline(always)]
pub fn memchr_null(data: &[u8]) -> usize {
    memchr::memchr(0, data).unwrap_or(data.len())
}

/// Reads a NUL-terminated string starting at `offset`.
///
/// The string ends at the first NUL or at the end of `data`. Invalid UTF-8 is
/// replaced rather than rejected, since library names are opaque to us.
pub fn c_str_at(data: &[u8], offset: u64) -> Result<String> {
    let bytes = tail_at(data, offset)?;
    let end = memchr_null(bytes);
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/// Trims trailing NUL bytes.
#[inline]
pub fn trim_nul(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}
