use crate::err::{ExtractError, Result};
use crate::utils::read_len_prefixed_utf16_string;

use byteorder::ReadBytesExt;
use log::trace;
use std::io::{Cursor, Seek, SeekFrom};

/// An element or attribute name. Names live in a chunk-wide string table;
/// the first occurrence is stored inline and later occurrences point back
/// at it by chunk offset.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct BinXmlName(String);

impl BinXmlName {
    pub fn from_binxml_stream(cursor: &mut Cursor<&[u8]>) -> Result<BinXmlName> {
        // The offset refers to where the name struct begins, relative to the
        // chunk start.
        let name_offset = u64::from(try_read!(cursor, u32));

        if name_offset != cursor.position() {
            trace!(
                "Name is at {:#x}, current offset {:#x}",
                name_offset,
                cursor.position()
            );
            let position_before_seek = cursor.position();

            cursor.seek(SeekFrom::Start(name_offset))?;
            let name = Self::from_stream(cursor)?;

            cursor.seek(SeekFrom::Start(position_before_seek))?;
            Ok(name)
        } else {
            Self::from_stream(cursor)
        }
    }

    fn from_stream(cursor: &mut Cursor<&[u8]>) -> Result<BinXmlName> {
        // Next-string link used by the chunk's hash buckets.
        let _ = try_read!(cursor, u32);
        let _name_hash = try_read!(cursor, u16);

        let name = read_len_prefixed_utf16_string(cursor, true)
            .map_err(|_| ExtractError::FailedToDecodeUTF16String {
                offset: cursor.position(),
            })?
            .unwrap_or_default();

        Ok(BinXmlName(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_name(name: &str) -> Vec<u8> {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0xaa, 0xbb];
        bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
        for unit in name.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes
    }

    #[test]
    fn test_reads_inline_name() {
        // Offset field pointing directly past itself means the name is inline.
        let mut data = 4u32.to_le_bytes().to_vec();
        data.extend(encode_name("Provider"));

        let mut cursor = Cursor::new(data.as_slice());
        let name = BinXmlName::from_binxml_stream(&mut cursor).unwrap();

        assert_eq!(name.as_str(), "Provider");
        assert_eq!(cursor.position(), data.len() as u64);
    }

    #[test]
    fn test_reads_name_behind_offset_and_restores_position() {
        // Name struct lives at offset 8; the reference sits at offset 0.
        let mut data = 8u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        data.extend(encode_name("Computer"));

        let mut cursor = Cursor::new(data.as_slice());
        let name = BinXmlName::from_binxml_stream(&mut cursor).unwrap();

        assert_eq!(name.as_str(), "Computer");
        assert_eq!(cursor.position(), 4);
    }
}
