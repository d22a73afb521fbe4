use crate::binxml::deserializer::read_binxml_fragment;
use crate::binxml::model::BinXmlToken;
use crate::err::{ExtractError, ParseError, Result};
use crate::evtx_chunk::EvtxChunk;
use crate::guid::Guid;
use crate::ntsid::Sid;
use crate::utils::{
    decode_utf16le_bytes, escape_angle_brackets, read_len_prefixed_utf16_string,
    timestamp_from_filetime, timestamp_from_systemtime,
};

use byteorder::ReadBytesExt;
use jiff::Timestamp;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt::Write;
use std::io::{Cursor, Read};

/// A single decoded substitution value. String variants are stored with
/// their angle brackets already escaped.
#[derive(Debug, PartialEq, Clone)]
pub enum BinXmlValue {
    Null,
    WString(String),
    Utf8String(String),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Real32(f32),
    Real64(f64),
    Bool(bool),
    Binary(Vec<u8>),
    Guid(Guid),
    SizeT(u64),
    FileTime(Timestamp),
    SysTime(Timestamp),
    Sid(Sid),
    HexInt32(String),
    HexInt64(String),
    // A nested binary xml fragment carrying its own template instance.
    BinXml(Vec<BinXmlToken>),
    WStringArray(Vec<String>),
}

/// A `(type, value)` pair filling one template slot.
#[derive(Debug, PartialEq, Clone)]
pub struct Substitution {
    pub value_type: u8,
    pub value: BinXmlValue,
}

pub const VALUE_TYPE_NULL: u8 = 0x00;
pub const VALUE_TYPE_BXML: u8 = 0x21;
pub const VALUE_TYPE_WSTRING_ARRAY: u8 = 0x81;

/// The set of value types that may appear in a substitution descriptor.
pub fn is_valid_substitution_type(value_type: u8) -> bool {
    value_type <= 0x15 || value_type == VALUE_TYPE_BXML || value_type == VALUE_TYPE_WSTRING_ARRAY
}

impl BinXmlValue {
    /// Decodes a value of `value_type` from a substitution array, where the
    /// byte budget comes from the value descriptor. The cursor is left
    /// wherever the decode stopped; the caller advances by the descriptor
    /// size.
    pub fn deserialize_sized(
        value_type: u8,
        size: u16,
        cursor: &mut Cursor<&[u8]>,
        chunk: Option<&EvtxChunk>,
        depth: u8,
    ) -> Result<BinXmlValue> {
        let offset = cursor.position();

        let value = match value_type {
            0x00 => BinXmlValue::Null,
            0x01 => {
                let raw = read_sized(cursor, size)?;
                let s = decode_utf16le_bytes(&raw)
                    .map_err(|_| ExtractError::FailedToDecodeUTF16String { offset })?;
                BinXmlValue::WString(escape_angle_brackets(&s).into_owned())
            }
            0x02 => {
                let raw = read_sized(cursor, size)?;
                let s = String::from_utf8(raw)
                    .map_err(|e| ExtractError::FailedToDecodeUTF8String { source: e, offset })?;
                BinXmlValue::Utf8String(escape_angle_brackets(&s).into_owned())
            }
            0x03 => BinXmlValue::Int8(try_read!(cursor, i8)),
            0x04 => BinXmlValue::UInt8(try_read!(cursor, u8)),
            0x05 => BinXmlValue::Int16(try_read!(cursor, i16)),
            0x06 => BinXmlValue::UInt16(try_read!(cursor, u16)),
            0x07 => BinXmlValue::Int32(try_read!(cursor, i32)),
            0x08 => BinXmlValue::UInt32(try_read!(cursor, u32)),
            0x09 => BinXmlValue::Int64(try_read!(cursor, i64)),
            0x0a => BinXmlValue::UInt64(try_read!(cursor, u64)),
            0x0b => BinXmlValue::Real32(try_read!(cursor, f32)),
            0x0c => BinXmlValue::Real64(try_read!(cursor, f64)),
            0x0d => BinXmlValue::Bool(try_read!(cursor, u32) > 1),
            0x0e => BinXmlValue::Binary(read_sized(cursor, size)?),
            0x0f => BinXmlValue::Guid(
                Guid::from_stream(cursor)
                    .map_err(|_| ParseError::BufferOverrun { offset, size: 16 })?,
            ),
            0x10 => match size {
                4 => BinXmlValue::SizeT(u64::from(try_read!(cursor, u32))),
                8 => BinXmlValue::SizeT(try_read!(cursor, u64)),
                _ => return Err(ParseError::InvalidSizeTypeSize { size, offset }.into()),
            },
            0x11 => BinXmlValue::FileTime(timestamp_from_filetime(try_read!(cursor, u64), offset)?),
            0x12 => {
                let mut fields = [0u16; 8];
                for field in fields.iter_mut() {
                    *field = try_read!(cursor, u16);
                }
                BinXmlValue::SysTime(timestamp_from_systemtime(fields, offset)?)
            }
            0x13 => BinXmlValue::Sid(
                Sid::from_stream(cursor)
                    .map_err(|_| ParseError::BufferOverrun { offset, size: size as usize })?,
            ),
            0x14 => BinXmlValue::HexInt32(hex_from_reversed_bytes(&read_sized(cursor, size)?)),
            0x15 => BinXmlValue::HexInt64(hex_from_reversed_bytes(&read_sized(cursor, size)?)),
            VALUE_TYPE_BXML => BinXmlValue::BinXml(read_binxml_fragment(
                cursor,
                chunk,
                Some(u32::from(size)),
                depth + 1,
            )?),
            VALUE_TYPE_WSTRING_ARRAY => {
                BinXmlValue::WStringArray(wstring_array_from_bytes(&read_sized(cursor, size)?, offset)?)
            }
            _ => {
                return Err(ParseError::InvalidSubstitutionType {
                    value: value_type,
                    offset,
                }
                .into());
            }
        };

        Ok(value)
    }

    /// Decodes a value appearing directly in the token stream (a `0x05`
    /// value token), where sizes are intrinsic to the type.
    pub fn deserialize_unsized(value_type: u8, cursor: &mut Cursor<&[u8]>) -> Result<BinXmlValue> {
        let offset = cursor.position();

        let value = match value_type {
            0x00 => BinXmlValue::Null,
            0x01 => {
                let s = read_len_prefixed_utf16_string(cursor, false)
                    .map_err(|_| ExtractError::FailedToDecodeUTF16String { offset })?
                    .unwrap_or_default();
                BinXmlValue::WString(escape_angle_brackets(&s).into_owned())
            }
            0x02 => {
                return Err(ExtractError::UnimplementedValueVariant {
                    name: "Utf8String",
                    offset,
                });
            }
            0x03 => BinXmlValue::Int8(try_read!(cursor, i8)),
            0x04 => BinXmlValue::UInt8(try_read!(cursor, u8)),
            0x05 => BinXmlValue::Int16(try_read!(cursor, i16)),
            0x06 => BinXmlValue::UInt16(try_read!(cursor, u16)),
            0x07 => BinXmlValue::Int32(try_read!(cursor, i32)),
            0x08 => BinXmlValue::UInt32(try_read!(cursor, u32)),
            0x09 => BinXmlValue::Int64(try_read!(cursor, i64)),
            0x0a => BinXmlValue::UInt64(try_read!(cursor, u64)),
            0x0b => BinXmlValue::Real32(try_read!(cursor, f32)),
            0x0c => BinXmlValue::Real64(try_read!(cursor, f64)),
            0x0d => BinXmlValue::Bool(try_read!(cursor, u32) > 1),
            0x0e => {
                return Err(ExtractError::UnimplementedValueVariant {
                    name: "Binary",
                    offset,
                });
            }
            0x0f => BinXmlValue::Guid(
                Guid::from_stream(cursor)
                    .map_err(|_| ParseError::BufferOverrun { offset, size: 16 })?,
            ),
            0x10 => {
                return Err(ExtractError::UnimplementedValueVariant {
                    name: "SizeT",
                    offset,
                });
            }
            0x11 => BinXmlValue::FileTime(timestamp_from_filetime(try_read!(cursor, u64), offset)?),
            0x12 => {
                let mut fields = [0u16; 8];
                for field in fields.iter_mut() {
                    *field = try_read!(cursor, u16);
                }
                BinXmlValue::SysTime(timestamp_from_systemtime(fields, offset)?)
            }
            0x13 => BinXmlValue::Sid(
                Sid::from_stream(cursor).map_err(|_| ParseError::BufferOverrun { offset, size: 8 })?,
            ),
            0x14 => BinXmlValue::HexInt32(hex_from_reversed_bytes(&read_sized(cursor, 4)?)),
            0x15 => BinXmlValue::HexInt64(hex_from_reversed_bytes(&read_sized(cursor, 8)?)),
            VALUE_TYPE_BXML => {
                return Err(ExtractError::UnimplementedValueVariant {
                    name: "BinXml",
                    offset,
                });
            }
            VALUE_TYPE_WSTRING_ARRAY => {
                return Err(ExtractError::UnimplementedValueVariant {
                    name: "WStringArray",
                    offset,
                });
            }
            _ => {
                return Err(ParseError::InvalidSubstitutionType {
                    value: value_type,
                    offset,
                }
                .into());
            }
        };

        Ok(value)
    }

    /// The wire type byte this value decodes from.
    pub fn value_type_code(&self) -> u8 {
        match self {
            BinXmlValue::Null => 0x00,
            BinXmlValue::WString(_) => 0x01,
            BinXmlValue::Utf8String(_) => 0x02,
            BinXmlValue::Int8(_) => 0x03,
            BinXmlValue::UInt8(_) => 0x04,
            BinXmlValue::Int16(_) => 0x05,
            BinXmlValue::UInt16(_) => 0x06,
            BinXmlValue::Int32(_) => 0x07,
            BinXmlValue::UInt32(_) => 0x08,
            BinXmlValue::Int64(_) => 0x09,
            BinXmlValue::UInt64(_) => 0x0a,
            BinXmlValue::Real32(_) => 0x0b,
            BinXmlValue::Real64(_) => 0x0c,
            BinXmlValue::Bool(_) => 0x0d,
            BinXmlValue::Binary(_) => 0x0e,
            BinXmlValue::Guid(_) => 0x0f,
            BinXmlValue::SizeT(_) => 0x10,
            BinXmlValue::FileTime(_) => 0x11,
            BinXmlValue::SysTime(_) => 0x12,
            BinXmlValue::Sid(_) => 0x13,
            BinXmlValue::HexInt32(_) => 0x14,
            BinXmlValue::HexInt64(_) => 0x15,
            BinXmlValue::BinXml(_) => VALUE_TYPE_BXML,
            BinXmlValue::WStringArray(_) => VALUE_TYPE_WSTRING_ARRAY,
        }
    }

    /// The event id, when this value is one of the unsigned integer kinds an
    /// `EventID` substitution can carry.
    pub fn as_event_id(&self) -> Option<u32> {
        match *self {
            BinXmlValue::UInt8(v) => Some(u32::from(v)),
            BinXmlValue::UInt16(v) => Some(u32::from(v)),
            BinXmlValue::UInt32(v) => Some(v),
            BinXmlValue::UInt64(v) => u32::try_from(v).ok(),
            BinXmlValue::Int8(v) => u32::try_from(v).ok(),
            BinXmlValue::Int16(v) => u32::try_from(v).ok(),
            BinXmlValue::Int32(v) => u32::try_from(v).ok(),
            BinXmlValue::Int64(v) => u32::try_from(v).ok(),
            BinXmlValue::SizeT(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// The textual form inserted into template XML and printed for
    /// incomplete records.
    pub fn as_xml_string(&self) -> String {
        match self {
            BinXmlValue::Null => String::new(),
            BinXmlValue::WString(s) | BinXmlValue::Utf8String(s) => s.clone(),
            BinXmlValue::Int8(v) => v.to_string(),
            BinXmlValue::UInt8(v) => v.to_string(),
            BinXmlValue::Int16(v) => v.to_string(),
            BinXmlValue::UInt16(v) => v.to_string(),
            BinXmlValue::Int32(v) => v.to_string(),
            BinXmlValue::UInt32(v) => v.to_string(),
            BinXmlValue::Int64(v) => v.to_string(),
            BinXmlValue::UInt64(v) => v.to_string(),
            BinXmlValue::Real32(v) => v.to_string(),
            BinXmlValue::Real64(v) => v.to_string(),
            BinXmlValue::Bool(v) => v.to_string(),
            BinXmlValue::Binary(bytes) => {
                let mut s = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    write!(s, "{b:02x}").expect("writing to a String cannot fail");
                }
                s
            }
            BinXmlValue::Guid(guid) => guid.to_string(),
            BinXmlValue::SizeT(v) => v.to_string(),
            BinXmlValue::FileTime(ts) | BinXmlValue::SysTime(ts) => ts.to_string(),
            BinXmlValue::Sid(sid) => sid.to_string(),
            BinXmlValue::HexInt32(s) | BinXmlValue::HexInt64(s) => s.clone(),
            // Nested fragments are flattened away before rendering.
            BinXmlValue::BinXml(_) => String::new(),
            BinXmlValue::WStringArray(parts) => parts.join(", "),
        }
    }
}

impl Serialize for Substitution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let value = match self.value {
            BinXmlValue::Null => None,
            _ => Some(self.value.as_xml_string()),
        };

        let mut s = serializer.serialize_struct("Substitution", 2)?;
        s.serialize_field("type", &self.value_type)?;
        s.serialize_field("value", &value)?;
        s.end()
    }
}

fn read_sized(cursor: &mut Cursor<&[u8]>, size: u16) -> Result<Vec<u8>> {
    let mut raw = vec![0u8; size as usize];
    let offset = cursor.position();

    cursor
        .read_exact(&mut raw)
        .map_err(|_| ParseError::BufferOverrun {
            offset,
            size: size as usize,
        })?;

    Ok(raw)
}

/// `"0x"` followed by the hex form of the bytes in reverse order, so a
/// little-endian integer reads naturally.
pub(crate) fn hex_from_reversed_bytes(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for b in bytes.iter().rev() {
        write!(s, "{b:02x}").expect("writing to a preallocated buffer cannot fail");
    }
    s
}

/// Splits a UTF-16LE blob on NUL units into its string fragments, dropping
/// one trailing empty fragment left by the terminator.
pub(crate) fn wstring_array_from_bytes(bytes: &[u8], offset: u64) -> Result<Vec<String>> {
    if bytes.len() % 2 != 0 {
        return Err(ParseError::UnevenWStringArray {
            size: bytes.len() as u16,
            offset,
        }
        .into());
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    let mut parts = Vec::new();
    for fragment in units.split(|&unit| unit == 0) {
        let part = std::char::decode_utf16(fragment.iter().copied())
            .collect::<std::result::Result<String, _>>()
            .map_err(|_| ExtractError::FailedToDecodeUTF16String { offset })?;
        parts.push(part);
    }

    if parts.last().is_some_and(|last| last.is_empty()) {
        parts.pop();
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_rendering_reverses_le_bytes() {
        assert_eq!(hex_from_reversed_bytes(&[0x01, 0x00, 0x00, 0x00]), "0x00000001");
        assert_eq!(
            hex_from_reversed_bytes(&[0xef, 0xbe, 0xad, 0xde]),
            "0xdeadbeef"
        );
    }

    #[test]
    fn test_wstring_array_splits_on_nul_units() {
        let mut bytes = Vec::new();
        for unit in "abc\0de\0".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }

        assert_eq!(
            wstring_array_from_bytes(&bytes, 0).unwrap(),
            vec!["abc".to_owned(), "de".to_owned()]
        );
    }

    #[test]
    fn test_wstring_array_rejects_odd_byte_counts() {
        assert!(matches!(
            wstring_array_from_bytes(&[0x61, 0x00, 0x62], 7),
            Err(ExtractError::Parse(ParseError::UnevenWStringArray { size: 3, offset: 7 }))
        ));
    }

    #[test]
    fn test_event_id_from_integer_kinds() {
        assert_eq!(BinXmlValue::UInt16(4624).as_event_id(), Some(4624));
        assert_eq!(BinXmlValue::Int32(-1).as_event_id(), None);
        assert_eq!(BinXmlValue::WString("1".to_owned()).as_event_id(), None);
    }

    #[test]
    fn test_sized_decode_of_size_type() {
        let data = 0xdead_beefu32.to_le_bytes();
        let mut cursor = Cursor::new(data.as_slice());
        let value = BinXmlValue::deserialize_sized(0x10, 4, &mut cursor, None, 0).unwrap();
        assert_eq!(value, BinXmlValue::SizeT(0xdead_beef));

        let mut cursor = Cursor::new(data.as_slice());
        assert!(matches!(
            BinXmlValue::deserialize_sized(0x10, 3, &mut cursor, None, 0),
            Err(ExtractError::Parse(ParseError::InvalidSizeTypeSize { size: 3, .. }))
        ));
    }

    #[test]
    fn test_sized_decode_escapes_strings() {
        let mut bytes = Vec::new();
        for unit in "a<b".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }

        let mut cursor = Cursor::new(bytes.as_slice());
        let value =
            BinXmlValue::deserialize_sized(0x01, bytes.len() as u16, &mut cursor, None, 0).unwrap();
        assert_eq!(value, BinXmlValue::WString("a&gt;b".to_owned()));
    }

    #[test]
    fn test_bool_is_only_true_above_one() {
        let mut cursor = Cursor::new(&[0x01, 0x00, 0x00, 0x00][..]);
        assert_eq!(
            BinXmlValue::deserialize_sized(0x0d, 4, &mut cursor, None, 0).unwrap(),
            BinXmlValue::Bool(false)
        );

        let mut cursor = Cursor::new(&[0x02, 0x00, 0x00, 0x00][..]);
        assert_eq!(
            BinXmlValue::deserialize_sized(0x0d, 4, &mut cursor, None, 0).unwrap(),
            BinXmlValue::Bool(true)
        );
    }
}
