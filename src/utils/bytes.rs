use crate::err::ParseError;

use byteorder::{ByteOrder, LittleEndian};

/// Bounds-checked random access reads, little-endian unless noted.
/// These mirror the access pattern of the orphan-record decoders, which
/// jump around a record without a running stream.

fn checked_slice(buf: &[u8], offset: u64, size: usize) -> Result<&[u8], ParseError> {
    let start = usize::try_from(offset).map_err(|_| ParseError::BufferOverrun { offset, size })?;
    let end = start
        .checked_add(size)
        .ok_or(ParseError::BufferOverrun { offset, size })?;

    buf.get(start..end)
        .ok_or(ParseError::BufferOverrun { offset, size })
}

pub fn read_u8_at(buf: &[u8], offset: u64) -> Result<u8, ParseError> {
    Ok(checked_slice(buf, offset, 1)?[0])
}

pub fn read_u16_at(buf: &[u8], offset: u64) -> Result<u16, ParseError> {
    Ok(LittleEndian::read_u16(checked_slice(buf, offset, 2)?))
}

pub fn read_u32_at(buf: &[u8], offset: u64) -> Result<u32, ParseError> {
    Ok(LittleEndian::read_u32(checked_slice(buf, offset, 4)?))
}

pub fn read_u64_at(buf: &[u8], offset: u64) -> Result<u64, ParseError> {
    Ok(LittleEndian::read_u64(checked_slice(buf, offset, 8)?))
}

pub fn slice_at(buf: &[u8], offset: u64, size: usize) -> Result<&[u8], ParseError> {
    checked_slice(buf, offset, size)
}
