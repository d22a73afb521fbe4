use crate::binxml::deserializer::read_binxml_fragment;
use crate::binxml::model::{BinXmlTemplateDefinition, BinXmlToken};
use crate::err::{ExtractError, Result};
use crate::evtx_record::{
    EvtxRecordHeader, EVTX_RECORD_HEADER_SIZE, EVTX_RECORD_MAGIC, MAX_RECORD_SIZE, MIN_RECORD_SIZE,
};
use crate::ChunkOffset;

use byteorder::ReadBytesExt;
use hashbrown::HashMap;
use jiff::Timestamp;
use log::trace;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::rc::Rc;

pub const EVTX_CHUNK_SIZE: usize = 0x10000;
pub const EVTX_CHUNK_HEADER_SIZE: usize = 0x200;
pub const EVTX_CHUNK_HEADER_MAGIC: &[u8] = b"ElfChnk";

pub struct EvtxChunkHeader {
    pub first_event_record_number: u64,
    pub last_event_record_number: u64,
    pub first_event_record_id: u64,
    pub last_event_record_id: u64,
    pub header_size: u32,
    pub last_event_record_data_offset: u32,
    pub free_space_offset: u32,
    pub events_checksum: u32,
    pub header_chunk_checksum: u32,
    // Stored as a vector since arrays implement debug only up to a length of
    // 32 elements.
    pub strings_offsets: Vec<ChunkOffset>,
    pub template_offsets: [ChunkOffset; 32],
}

impl Debug for EvtxChunkHeader {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        fmt.debug_struct("EvtxChunkHeader")
            .field("first_event_record_number", &self.first_event_record_number)
            .field("last_event_record_number", &self.last_event_record_number)
            .field("checksum", &self.header_chunk_checksum)
            .field("free_space_offset", &self.free_space_offset)
            .finish()
    }
}

impl EvtxChunkHeader {
    pub fn from_reader(input: &mut Cursor<&[u8]>) -> Result<EvtxChunkHeader> {
        let mut magic = [0_u8; 8];
        input
            .read_exact(&mut magic)
            .map_err(|_| crate::err::ParseError::BufferOverrun {
                offset: input.position(),
                size: 8,
            })?;

        if &magic != b"ElfChnk\x00" {
            return Err(ExtractError::InvalidEvtxChunkMagic { magic });
        }

        let first_event_record_number = try_read!(input, u64);
        let last_event_record_number = try_read!(input, u64);
        let first_event_record_id = try_read!(input, u64);
        let last_event_record_id = try_read!(input, u64);

        let header_size = try_read!(input, u32);
        let last_event_record_data_offset = try_read!(input, u32);
        let free_space_offset = try_read!(input, u32);
        let events_checksum = try_read!(input, u32);

        // Reserved
        input.seek(SeekFrom::Current(64))?;
        // Flags
        input.seek(SeekFrom::Current(4))?;

        let header_chunk_checksum = try_read!(input, u32);

        let mut strings_offsets = Vec::with_capacity(64);
        for _ in 0..64 {
            strings_offsets.push(try_read!(input, u32));
        }

        let mut template_offsets = [0 as ChunkOffset; 32];
        for offset in template_offsets.iter_mut() {
            *offset = try_read!(input, u32);
        }

        Ok(EvtxChunkHeader {
            first_event_record_number,
            last_event_record_number,
            first_event_record_id,
            last_event_record_id,
            header_size,
            last_event_record_data_offset,
            free_space_offset,
            events_checksum,
            header_chunk_checksum,
            template_offsets,
            strings_offsets,
        })
    }
}

pub struct EvtxChunk<'a> {
    pub data: &'a [u8],
    pub header: EvtxChunkHeader,
    // Template definitions are resolved lazily by chunk offset; records in
    // the same chunk share definitions through this cache.
    template_cache: RefCell<HashMap<ChunkOffset, Rc<BinXmlTemplateDefinition>>>,
}

impl<'a> Debug for EvtxChunk<'a> {
    fn fmt(&self, fmt: &mut Formatter) -> std::fmt::Result {
        writeln!(fmt, "\nEvtxChunk")?;
        writeln!(fmt, "-----------------------")?;
        writeln!(fmt, "{:#?}", &self.header)?;
        writeln!(
            fmt,
            "{} cached templates",
            self.template_cache.borrow().len()
        )?;
        Ok(())
    }
}

impl<'a> EvtxChunk<'a> {
    /// Parses the chunk header over `data`, which must begin at the chunk
    /// magic. `data` is expected to span the full 64KiB chunk.
    pub fn new(data: &'a [u8]) -> Result<EvtxChunk<'a>> {
        let mut cursor = Cursor::new(data);
        let header = EvtxChunkHeader::from_reader(&mut cursor)?;

        if (header.free_space_offset as usize) < EVTX_CHUNK_HEADER_SIZE
            || header.free_space_offset as usize > EVTX_CHUNK_SIZE
            || header.free_space_offset as usize > data.len()
        {
            return Err(ExtractError::InvalidFreeSpaceOffset {
                free_space_offset: header.free_space_offset,
            });
        }

        Ok(EvtxChunk {
            data,
            header,
            template_cache: RefCell::new(HashMap::new()),
        })
    }

    /// CRC32 of the first 120 header bytes and the string/template tables,
    /// skipping the stored checksum itself.
    pub fn header_checksum_valid(&self) -> bool {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[..0x78]);
        hasher.update(&self.data[0x80..EVTX_CHUNK_HEADER_SIZE]);

        hasher.finalize() == self.header.header_chunk_checksum
    }

    /// CRC32 of the event record area, up to the free space offset.
    pub fn data_checksum_valid(&self) -> bool {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[EVTX_CHUNK_HEADER_SIZE..self.header.free_space_offset as usize]);

        hasher.finalize() == self.header.events_checksum
    }

    pub fn records(&self) -> IterChunkRecords<'_, 'a> {
        IterChunkRecords {
            chunk: self,
            offset_from_chunk_start: EVTX_CHUNK_HEADER_SIZE as u64,
        }
    }

    pub(crate) fn cached_template(
        &self,
        offset: ChunkOffset,
    ) -> Option<Rc<BinXmlTemplateDefinition>> {
        self.template_cache.borrow().get(&offset).cloned()
    }

    pub(crate) fn cache_template(
        &self,
        offset: ChunkOffset,
        definition: Rc<BinXmlTemplateDefinition>,
    ) {
        self.template_cache.borrow_mut().insert(offset, definition);
    }
}

/// One successfully framed record inside a chunk. The binxml payload is kept
/// as deserialized tokens.
#[derive(Debug)]
pub struct ChunkRecord {
    pub offset_in_chunk: u64,
    pub event_record_id: u64,
    pub timestamp: Timestamp,
    pub tokens: Vec<BinXmlToken>,
}

pub struct IterChunkRecords<'r, 'a: 'r> {
    chunk: &'r EvtxChunk<'a>,
    offset_from_chunk_start: u64,
}

impl<'r, 'a: 'r> Iterator for IterChunkRecords<'r, 'a> {
    type Item = Result<ChunkRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.offset_from_chunk_start;
        let free_space_offset = u64::from(self.chunk.header.free_space_offset);

        if offset + u64::from(EVTX_RECORD_HEADER_SIZE) > free_space_offset {
            return None;
        }

        if self.chunk.data[offset as usize..offset as usize + 4] != EVTX_RECORD_MAGIC {
            trace!("Record walk stopped at {:#x}: no record magic", offset);
            return None;
        }

        // The size field bounds the walk; it is known before the header is
        // fully parsed, so one broken record never hides the ones after it.
        let size = u32::from_le_bytes(
            self.chunk.data[offset as usize + 4..offset as usize + 8]
                .try_into()
                .expect("slice is exactly 4 bytes"),
        );

        if size < MIN_RECORD_SIZE
            || size > MAX_RECORD_SIZE
            || offset + u64::from(size) > self.chunk.data.len() as u64
        {
            trace!(
                "Record walk stopped at {:#x}: insane record size {}",
                offset, size
            );
            return None;
        }

        self.offset_from_chunk_start += u64::from(size);

        let mut cursor = Cursor::new(self.chunk.data);
        if let Err(e) = cursor.seek(SeekFrom::Start(offset)) {
            return Some(Err(e.into()));
        }

        let header = match EvtxRecordHeader::from_reader(&mut cursor) {
            Ok(header) => header,
            Err(e) => return Some(Err(e)),
        };

        let tokens = match read_binxml_fragment(
            &mut cursor,
            Some(self.chunk),
            Some(header.binxml_data_size()),
            0,
        ) {
            Ok(tokens) => tokens,
            Err(e) => return Some(Err(e)),
        };

        Some(Ok(ChunkRecord {
            offset_in_chunk: offset,
            event_record_id: header.event_record_id,
            timestamp: header.timestamp,
            tokens,
        }))
    }
}
