use crate::err::{ExtractError, Result};
use crate::utils::timestamp_from_filetime;

use byteorder::ReadBytesExt;
use jiff::Timestamp;
use std::io::{Cursor, Read};

pub const EVTX_RECORD_MAGIC: [u8; 4] = [0x2a, 0x2a, 0x00, 0x00];

/// Framing shared by chunk records and carved orphan records: magic,
/// inclusive size, record id and a FILETIME, with the size repeated in the
/// last four bytes of the record.
pub const EVTX_RECORD_HEADER_SIZE: u32 = 24;

pub const MIN_RECORD_SIZE: u32 = 0x30;
pub const MAX_RECORD_SIZE: u32 = 0x10000;

#[derive(Debug, PartialEq)]
pub struct EvtxRecordHeader {
    pub data_size: u32,
    pub event_record_id: u64,
    pub timestamp: Timestamp,
}

impl EvtxRecordHeader {
    pub fn from_reader(input: &mut Cursor<&[u8]>) -> Result<EvtxRecordHeader> {
        let mut magic = [0_u8; 4];
        input
            .read_exact(&mut magic)
            .map_err(|_| crate::err::ParseError::BufferOverrun {
                offset: input.position(),
                size: 4,
            })?;

        if magic != EVTX_RECORD_MAGIC {
            return Err(ExtractError::InvalidEvtxRecordHeaderMagic { magic });
        }

        let size = try_read!(input, u32);
        let record_id = try_read!(input, u64);

        let filetime_offset = input.position();
        let timestamp = timestamp_from_filetime(try_read!(input, u64), filetime_offset)?;

        Ok(EvtxRecordHeader {
            data_size: size,
            event_record_id: record_id,
            timestamp,
        })
    }

    /// Number of binxml payload bytes between the header and the trailing
    /// size copy.
    pub fn binxml_data_size(&self) -> u32 {
        self.data_size
            .saturating_sub(EVTX_RECORD_HEADER_SIZE)
            .saturating_sub(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_record_header() {
        let mut bytes = vec![0x2a, 0x2a, 0x00, 0x00];
        bytes.extend_from_slice(&0x78u32.to_le_bytes());
        bytes.extend_from_slice(&17u64.to_le_bytes());
        bytes.extend_from_slice(&116_444_736_000_000_000u64.to_le_bytes());

        let header = EvtxRecordHeader::from_reader(&mut Cursor::new(bytes.as_slice())).unwrap();

        assert_eq!(header.data_size, 0x78);
        assert_eq!(header.event_record_id, 17);
        assert_eq!(header.timestamp.to_string(), "1970-01-01T00:00:00Z");
        assert_eq!(header.binxml_data_size(), 0x78 - 28);
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let bytes = [0x2a, 0x2b, 0x00, 0x00, 0, 0, 0, 0];

        assert!(matches!(
            EvtxRecordHeader::from_reader(&mut Cursor::new(&bytes[..])),
            Err(ExtractError::InvalidEvtxRecordHeaderMagic { .. })
        ));
    }
}
