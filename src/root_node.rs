//! Parses the root node of a record that has lost its chunk.
//!
//! A root node normally references its template by offset within the parent
//! chunk. Without the chunk that offset is meaningless, so the substitution
//! array has to be recovered on its own: guess whether the template bytes
//! are resident (inlined after the header fields) or non-resident (only the
//! descriptor array follows), position past whichever layout applies, then
//! decode the descriptors and values directly from the buffer.

use crate::binxml::value_variant::{
    hex_from_reversed_bytes, is_valid_substitution_type, wstring_array_from_bytes, BinXmlValue,
    Substitution,
};
use crate::carver;
use crate::err::{ExtractError, ParseError, Result};
use crate::guid::Guid;
use crate::ntsid::Sid;
use crate::utils::{
    decode_utf16le_bytes, escape_angle_brackets, read_u16_at, read_u32_at, read_u64_at, read_u8_at,
    slice_at, timestamp_from_filetime, timestamp_from_systemtime,
};

use jiff::Timestamp;
use log::debug;

/// Root nodes carry at most a few dozen substitutions; anything above this
/// is not a substitution count.
pub const MAX_SUBSTITUTIONS: u32 = 100;

const MAX_BXML_DEPTH: u8 = 16;

/// A record recovered without chunk context. Only the offset, event id and
/// substitutions flow into the final output; the record number and header
/// timestamp are kept for callers that want them.
#[derive(Debug, PartialEq)]
pub struct OrphanRecord {
    pub offset: u64,
    pub record_num: u64,
    pub timestamp: Timestamp,
    pub substitutions: Vec<Substitution>,
}

/// Parses a record at `offset`, previously vetted by [`carver::is_record`],
/// into its header fields and substitution array.
pub fn extract_record(buf: &[u8], offset: u64) -> Result<OrphanRecord> {
    if !carver::is_record(buf, offset) {
        return Err(ExtractError::InvalidArgument {
            action: "parse an EVTX record",
            offset,
        });
    }

    let record_size = read_u32_at(buf, offset + 0x4)?;
    let record_num = read_u64_at(buf, offset + 0x8)?;
    let ticks = read_u64_at(buf, offset + 0x10)?;
    let timestamp = timestamp_from_filetime(ticks, offset + 0x10)?;

    debug!(
        "Extracting lost record at {:#x}, num {:#x}, time {}",
        offset, record_num, timestamp
    );

    let substitutions =
        extract_root_substitutions(buf, offset + 0x18, offset + u64::from(record_size), 0)?;

    Ok(OrphanRecord {
        offset,
        record_num,
        timestamp,
        substitutions,
    })
}

/// Guesses whether the root node at `offset` carries a resident template,
/// without reading past `max_offset`.
///
/// The template offset field cannot be interpreted without the chunk, so the
/// guess works from what follows it. A resident template begins with a
/// next-offset dword, a GUID and a length dword; a non-resident root goes
/// straight to `num_subs` and its descriptor array. Descriptor-shaped
/// windows (`u16 size, u8 type in the valid set, u8 zero`) right after the
/// candidate count therefore indicate a non-resident root.
pub fn root_has_resident_template(buf: &[u8], offset: u64, max_offset: u64) -> Result<bool> {
    let mut ofs = offset;

    let token = read_u8_at(buf, ofs)?;
    if token == 0x0f {
        // stream start
        ofs += 4;
    }

    ofs += 6; // token, unknown, template id
    ofs += 4; // template offset

    let maybe_num_subs = read_u32_at(buf, ofs)?;
    if maybe_num_subs > MAX_SUBSTITUTIONS {
        debug!("More than 100 subs, resident template");
        return Ok(true);
    }

    ofs += 4; // template guid or first descriptor

    let probes = u64::from(
        match maybe_num_subs {
            0 => 2,
            n => n,
        }
        .min(4),
    );

    if max_offset < ofs + 4 + 4 * probes {
        return Ok(false);
    }

    for i in 0..probes {
        if read_u8_at(buf, ofs + 3 + i * 4)? != 0 {
            debug!("Non-zero zero field, resident template");
            return Ok(true);
        }
    }

    for i in 0..probes {
        if !is_valid_substitution_type(read_u8_at(buf, ofs + 2 + i * 4)?) {
            debug!("Type field not a valid type, resident template");
            return Ok(true);
        }
    }

    debug!("All conditions satisfied, non-resident template");
    Ok(false)
}

/// Parses a root node at `offset` into its substitutions, not reading
/// values past `max_offset`. Nested BXml fragments contribute their own
/// substitutions in place.
pub fn extract_root_substitutions(
    buf: &[u8],
    offset: u64,
    max_offset: u64,
    depth: u8,
) -> Result<Vec<Substitution>> {
    if depth > MAX_BXML_DEPTH {
        return Err(ParseError::NestedTooDeeply {
            offset,
            limit: MAX_BXML_DEPTH,
        }
        .into());
    }

    debug!("Extracting root node at {:#x}", offset);

    let mut ofs = offset;

    let token = read_u8_at(buf, ofs)?;
    if token == 0x0f {
        // stream start
        ofs += 4;
    }

    ofs += 6; // token, unknown, template id

    if root_has_resident_template(buf, offset, max_offset)? {
        debug!("resident template");
        ofs += 4; // template offset
        ofs += 4; // next template offset
        ofs += 0x10; // guid

        let template_length = read_u32_at(buf, ofs)?;
        ofs += 4;
        ofs += u64::from(template_length);
    } else {
        debug!("non-resident template");
        ofs += 4; // template offset
    }

    let num_subs = read_u32_at(buf, ofs)?;
    if num_subs > MAX_SUBSTITUTIONS {
        return Err(ParseError::UnexpectedSubstitutionCount {
            count: num_subs,
            offset: ofs,
        }
        .into());
    }
    ofs += 4; // begin descriptor list

    debug!("There are {} substitutions", num_subs);

    let mut descriptors = Vec::with_capacity(num_subs as usize);

    for _ in 0..num_subs {
        let size = read_u16_at(buf, ofs)?;
        let value_type = read_u8_at(buf, ofs + 2)?;

        if !is_valid_substitution_type(value_type) {
            return Err(ParseError::InvalidSubstitutionType {
                value: value_type,
                offset: ofs + 2,
            }
            .into());
        }

        descriptors.push((value_type, size));
        ofs += 4;
    }

    let mut substitutions: Vec<Substitution> = Vec::with_capacity(num_subs as usize);

    for (i, &(value_type, size)) in descriptors.iter().enumerate() {
        if ofs > max_offset {
            return Err(ExtractError::MaxOffsetReached {
                offset: ofs,
                max_offset,
            });
        }

        debug!(
            "[{}/{}] substitution type {:#x} at {:#x} length {:#x}",
            i + 1,
            num_subs,
            value_type,
            ofs,
            size
        );

        if value_type == 0x21 {
            // A nested fragment's substitutions are inlined, not nested.
            substitutions.extend(extract_root_substitutions(buf, ofs, max_offset, depth + 1)?);
        } else {
            let value = decode_substitution_value(buf, offset, ofs, value_type, size)?;
            substitutions.push(Substitution { value_type, value });
        }

        ofs += u64::from(size);
    }

    Ok(substitutions)
}

/// Decodes one substitution value of `value_type` at `ofs`, sized by its
/// descriptor. `root_offset` is the start of the enclosing root node.
fn decode_substitution_value(
    buf: &[u8],
    root_offset: u64,
    ofs: u64,
    value_type: u8,
    size: u16,
) -> Result<BinXmlValue> {
    let value = match value_type {
        0x00 => BinXmlValue::Null,
        0x01 => {
            let raw = slice_at(buf, ofs, size as usize)?;
            let s = decode_utf16le_bytes(raw)
                .map_err(|_| ExtractError::FailedToDecodeUTF16String { offset: ofs })?;
            BinXmlValue::WString(escape_angle_brackets(&s).into_owned())
        }
        0x02 => {
            let raw = slice_at(buf, ofs, size as usize)?;
            let s = String::from_utf8(raw.to_vec())
                .map_err(|e| ExtractError::FailedToDecodeUTF8String {
                    source: e,
                    offset: ofs,
                })?;
            BinXmlValue::Utf8String(escape_angle_brackets(&s).into_owned())
        }
        0x03 => BinXmlValue::Int8(read_u8_at(buf, ofs)? as i8),
        0x04 => BinXmlValue::UInt8(read_u8_at(buf, ofs)?),
        0x05 => BinXmlValue::Int16(read_u16_at(buf, ofs)? as i16),
        0x06 => BinXmlValue::UInt16(read_u16_at(buf, ofs)?),
        0x07 => BinXmlValue::Int32(read_u32_at(buf, ofs)? as i32),
        0x08 => BinXmlValue::UInt32(read_u32_at(buf, ofs)?),
        0x09 => BinXmlValue::Int64(read_u64_at(buf, ofs)? as i64),
        0x0a => BinXmlValue::UInt64(read_u64_at(buf, ofs)?),
        0x0b => BinXmlValue::Real32(f32::from_bits(read_u32_at(buf, ofs)?)),
        0x0c => BinXmlValue::Real64(f64::from_bits(read_u64_at(buf, ofs)?)),
        0x0d => BinXmlValue::Bool(read_u32_at(buf, ofs)? > 1),
        0x0e => BinXmlValue::Binary(slice_at(buf, ofs, size as usize)?.to_vec()),
        // The GUID bytes are taken from the root node's start, not the
        // running cursor.
        0x0f => BinXmlValue::Guid(Guid::from_buffer_at(buf, root_offset)?),
        0x10 => match size {
            4 => BinXmlValue::SizeT(u64::from(read_u32_at(buf, ofs)?)),
            8 => BinXmlValue::SizeT(read_u64_at(buf, ofs)?),
            _ => {
                return Err(ParseError::InvalidSizeTypeSize { size, offset: ofs }.into());
            }
        },
        0x11 => BinXmlValue::FileTime(timestamp_from_filetime(read_u64_at(buf, ofs)?, ofs)?),
        0x12 => {
            let mut fields = [0u16; 8];
            for (i, field) in fields.iter_mut().enumerate() {
                *field = read_u16_at(buf, ofs + 2 * i as u64)?;
            }
            BinXmlValue::SysTime(timestamp_from_systemtime(fields, ofs)?)
        }
        0x13 => {
            // Probe the fixed part before handing the tail to the reader.
            let _ = slice_at(buf, ofs, 8)?;
            let mut reader = &buf[ofs as usize..];
            let sid = Sid::from_stream(&mut reader).map_err(|_| ParseError::BufferOverrun {
                offset: ofs,
                size: size as usize,
            })?;
            BinXmlValue::Sid(sid)
        }
        0x14 => BinXmlValue::HexInt32(hex_from_reversed_bytes(slice_at(buf, ofs, size as usize)?)),
        0x15 => BinXmlValue::HexInt64(hex_from_reversed_bytes(slice_at(buf, ofs, size as usize)?)),
        0x81 => {
            BinXmlValue::WStringArray(wstring_array_from_bytes(slice_at(buf, ofs, size as usize)?, ofs)?)
        }
        _ => {
            return Err(ParseError::InvalidSubstitutionType {
                value: value_type,
                offset: ofs,
            }
            .into());
        }
    };

    Ok(value)
}
