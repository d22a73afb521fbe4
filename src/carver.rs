//! Locates EVTX artifacts in arbitrary binary data: whole 64KiB chunks that
//! still pass both of their CRC32 checks, and individual records framed by
//! the record magic and a matching size prefix/suffix.

use crate::evtx_chunk::{EvtxChunk, EVTX_CHUNK_HEADER_MAGIC, EVTX_CHUNK_SIZE};
use crate::evtx_record::{EVTX_RECORD_MAGIC, MAX_RECORD_SIZE, MIN_RECORD_SIZE};
use crate::utils::read_u32_at;

use log::debug;
#[cfg(feature = "multithreading")]
use log::warn;
use memchr::memmem;

#[cfg(feature = "multithreading")]
use rayon::prelude::*;

pub const MIN_CHUNK_HEADER_SIZE: u32 = 0x80;
pub const MAX_CHUNK_HEADER_SIZE: u32 = 0x200;

/// Ascending offsets of every occurrence of `needle` in `buf`.
/// Neither magic can overlap itself, so non-overlapping iteration is exact.
pub fn find_all<'a>(buf: &'a [u8], needle: &'a [u8]) -> impl Iterator<Item = u64> + 'a {
    memmem::find_iter(buf, needle).map(|position| position as u64)
}

/// Whether `offset` is the start of an intact EVTX chunk: magic, a sane
/// header size field, a full 64KiB of data, and both CRC32 checks.
pub fn is_chunk_header(buf: &[u8], offset: u64) -> bool {
    let offset = offset as usize;

    if buf.len() < offset + 0x2c {
        // the accesses below would overflow
        return false;
    }

    if &buf[offset..offset + EVTX_CHUNK_HEADER_MAGIC.len()] != EVTX_CHUNK_HEADER_MAGIC {
        return false;
    }

    let size = match read_u32_at(buf, offset as u64 + 0x28) {
        Ok(size) => size,
        Err(_) => return false,
    };
    if !(MIN_CHUNK_HEADER_SIZE..=MAX_CHUNK_HEADER_SIZE).contains(&size) {
        return false;
    }

    if buf.len() < offset + size as usize {
        // the chunk overruns the buffer end
        return false;
    }

    if buf.len() < offset + EVTX_CHUNK_SIZE {
        return false;
    }

    let data = &buf[offset..offset + EVTX_CHUNK_SIZE];
    let chunk = match EvtxChunk::new(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!("failed to parse chunk header at {:#x}: {}", offset, e);
            return false;
        }
    };

    chunk.header_checksum_valid() && chunk.data_checksum_valid()
}

/// Scans the given data for valid EVTX chunk structures.
pub fn find_evtx_chunks(buf: &[u8]) -> impl Iterator<Item = u64> + '_ {
    find_all(buf, EVTX_CHUNK_HEADER_MAGIC).filter(move |&offset| is_chunk_header(buf, offset))
}

/// Like [`find_evtx_chunks`], with candidate validation fanned out over a
/// thread pool. Offsets are still returned in ascending order.
#[cfg(feature = "multithreading")]
pub fn find_evtx_chunks_parallel(buf: &[u8], num_threads: usize) -> Vec<u64> {
    let candidates: Vec<u64> = find_all(buf, EVTX_CHUNK_HEADER_MAGIC).collect();

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            warn!("falling back to single threaded chunk validation: {}", e);
            return candidates
                .into_iter()
                .filter(|&offset| is_chunk_header(buf, offset))
                .collect();
        }
    };

    let mut offsets: Vec<u64> = pool.install(|| {
        candidates
            .into_par_iter()
            .filter(|&offset| is_chunk_header(buf, offset))
            .collect()
    });

    offsets.sort_unstable();

    offsets
}

/// Whether `offset` is the start of something record shaped: magic, a size
/// within bounds, and the same size repeated at the end of the record.
pub fn is_record(buf: &[u8], offset: u64) -> bool {
    let start = offset as usize;

    if buf.len() < start + 8 {
        return false;
    }

    if buf[start..start + 4] != EVTX_RECORD_MAGIC {
        return false;
    }

    let size = match read_u32_at(buf, offset + 4) {
        Ok(size) => size,
        Err(_) => return false,
    };
    if !(MIN_RECORD_SIZE..=MAX_RECORD_SIZE).contains(&size) {
        return false;
    }

    if (buf.len() as u64) < offset + u64::from(size) {
        return false;
    }

    let size_suffix = match read_u32_at(buf, offset + u64::from(size) - 4) {
        Ok(size_suffix) => size_suffix,
        Err(_) => return false,
    };

    size == size_suffix
}

/// Generates offsets of apparent EVTX records from the given buffer.
pub fn find_evtx_records(buf: &[u8]) -> impl Iterator<Item = u64> + '_ {
    find_all(buf, &EVTX_RECORD_MAGIC).filter(move |&offset| is_record(buf, offset))
}
