//! Recovers Windows Event Log (EVTX) records from arbitrary binary data,
//! such as unallocated disk space, memory images or truncated log files.
//!
//! Recovery runs in two passes over a caller-provided buffer. The first
//! pass carves intact 64KiB chunks (checksum verified), emits their records
//! and harvests the binary-xml templates those records reference. The
//! second pass scans for record magics outside any valid chunk, recovers
//! each orphan's substitution array without chunk context, and binds it
//! back to a harvested template by structural signature. Orphans that do
//! not uniquely match stay available as [`IncompleteRecord`]s.
//!
//! ```no_run
//! use evtxtract::{EvtxExtractor, RecoveredRecord};
//!
//! let image = std::fs::read("image.raw")?;
//!
//! for record in EvtxExtractor::from_buffer(&image).records() {
//!     match record {
//!         RecoveredRecord::Complete(complete) => println!("{}", complete.xml),
//!         RecoveredRecord::Incomplete(incomplete) => {
//!             eprintln!("unreconstructed record at {:#x}", incomplete.offset)
//!         }
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod err;

// This needs to come first!
#[macro_use]
mod macros;

mod binxml;
pub mod carver;
mod evtx_chunk;
mod evtx_record;
mod extractor;
mod guid;
mod ntsid;
mod root_node;
mod template;
mod utils;
mod xml_output;

/// Offsets relative to a chunk start.
pub type ChunkOffset = u32;

pub use binxml::value_variant::{BinXmlValue, Substitution};
pub use carver::{find_evtx_chunks, find_evtx_records, is_chunk_header, is_record};
pub use evtx_chunk::{EvtxChunk, EvtxChunkHeader, EVTX_CHUNK_SIZE};
pub use evtx_record::EvtxRecordHeader;
pub use extractor::{
    extract_chunk_records, extract_chunk_templates, CompleteRecord, EvtxExtractor,
    ExtractSettings, IncompleteRecord, RecoveredRecord, RecoveredRecords,
};
pub use guid::Guid;
pub use ntsid::Sid;
pub use root_node::{extract_record, OrphanRecord};
pub use template::{Placeholder, Template, TemplateStore};
pub use xml_output::format_incomplete_record;
