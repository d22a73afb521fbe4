//! The two-pass recovery pipeline.
//!
//! Pass 1 walks every intact chunk: each of its records is emitted as a
//! [`CompleteRecord`] and contributes its template to the store. Pass 2
//! scans for record magics outside those chunks and rebuilds each orphan
//! against the harvested templates, emitting [`CompleteRecord`] on a unique
//! match and [`IncompleteRecord`] otherwise. Templates must all be collected
//! before the first orphan is attempted, so the passes never interleave.

use crate::binxml::assemble::record_to_template;
use crate::binxml::value_variant::Substitution;
use crate::carver;
use crate::err::Result;
use crate::evtx_chunk::{ChunkRecord, EvtxChunk, EVTX_CHUNK_SIZE};
use crate::evtx_record::EVTX_RECORD_MAGIC;
use crate::root_node;
use crate::template::{Template, TemplateStore};
use crate::xml_output::extract_event_id;

use hashbrown::HashSet;
use log::{info, warn};
use memchr::memmem;
use serde::Serialize;
use std::collections::VecDeque;

/// Knobs for an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    /// Worker threads used to validate chunk candidates.
    /// Zero means a worker per core; one disables the thread pool.
    num_threads: usize,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        ExtractSettings { num_threads: 1 }
    }
}

impl ExtractSettings {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn get_num_threads(&self) -> usize {
        self.num_threads
    }
}

/// A record whose full XML could be produced.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct CompleteRecord {
    pub offset: u64,
    pub event_id: u32,
    pub xml: String,
}

/// An orphan record that did not uniquely match a template. The raw
/// substitutions are preserved as evidence.
#[derive(Debug, PartialEq, Clone, Serialize)]
pub struct IncompleteRecord {
    pub offset: u64,
    pub event_id: u32,
    pub substitutions: Vec<Substitution>,
}

#[derive(Debug, PartialEq, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveredRecord {
    Complete(CompleteRecord),
    Incomplete(IncompleteRecord),
}

impl RecoveredRecord {
    pub fn offset(&self) -> u64 {
        match self {
            RecoveredRecord::Complete(record) => record.offset,
            RecoveredRecord::Incomplete(record) => record.offset,
        }
    }

    pub fn event_id(&self) -> u32 {
        match self {
            RecoveredRecord::Complete(record) => record.event_id,
            RecoveredRecord::Incomplete(record) => record.event_id,
        }
    }
}

pub struct EvtxExtractor<'a> {
    buf: &'a [u8],
    settings: ExtractSettings,
}

impl<'a> EvtxExtractor<'a> {
    pub fn from_buffer(buf: &'a [u8]) -> Self {
        EvtxExtractor {
            buf,
            settings: ExtractSettings::default(),
        }
    }

    pub fn with_configuration(mut self, settings: ExtractSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Runs the two-pass recovery as a lazy pull-sequence.
    pub fn records(&self) -> RecoveredRecords<'a> {
        let chunk_offsets = self.find_chunk_offsets();

        RecoveredRecords {
            buf: self.buf,
            chunks: chunk_offsets.into_iter(),
            pending: VecDeque::new(),
            store: TemplateStore::new(),
            seen: HashSet::new(),
            orphan_scan: None,
        }
    }

    #[cfg(feature = "multithreading")]
    fn find_chunk_offsets(&self) -> Vec<u64> {
        if self.settings.num_threads == 1 {
            carver::find_evtx_chunks(self.buf).collect()
        } else {
            carver::find_evtx_chunks_parallel(self.buf, self.settings.num_threads)
        }
    }

    #[cfg(not(feature = "multithreading"))]
    fn find_chunk_offsets(&self) -> Vec<u64> {
        carver::find_evtx_chunks(self.buf).collect()
    }
}

pub struct RecoveredRecords<'a> {
    buf: &'a [u8],
    chunks: std::vec::IntoIter<u64>,
    pending: VecDeque<CompleteRecord>,
    store: TemplateStore,
    seen: HashSet<u64>,
    orphan_scan: Option<memmem::FindIter<'a, 'static>>,
}

impl<'a> Iterator for RecoveredRecords<'a> {
    type Item = RecoveredRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(RecoveredRecord::Complete(record));
            }

            if let Some(chunk_offset) = self.chunks.next() {
                self.process_chunk(chunk_offset);
                continue;
            }

            // Pass 1 is done, every template is in the store.
            let buf = self.buf;
            let scan = self
                .orphan_scan
                .get_or_insert_with(|| memmem::find_iter(buf, &EVTX_RECORD_MAGIC));

            while let Some(position) = scan.next() {
                let offset = position as u64;

                if !carver::is_record(buf, offset) {
                    continue;
                }

                if self.seen.contains(&offset) {
                    continue;
                }

                if let Some(record) = process_orphan(buf, offset, &self.store) {
                    return Some(record);
                }
            }

            return None;
        }
    }
}

impl<'a> RecoveredRecords<'a> {
    fn process_chunk(&mut self, chunk_offset: u64) {
        for (complete, template) in chunk_records_and_templates(self.buf, chunk_offset) {
            self.seen.insert(complete.offset);
            self.store.insert(template);
            self.pending.push_back(complete);
        }
    }
}

/// Renders one chunk record into its Complete form together with the
/// template it contributes to the store.
fn reconstruct_chunk_record(
    record: &ChunkRecord,
    record_offset: u64,
) -> Result<(CompleteRecord, Template)> {
    let (template_xml, substitutions) = record_to_template(&record.tokens)?;

    let xml = crate::template::insert_substitutions(&template_xml, &substitutions);
    let event_id = extract_event_id(&xml)?;

    Ok((
        CompleteRecord {
            offset: record_offset,
            event_id,
            xml,
        },
        Template::new(event_id, template_xml),
    ))
}

fn process_orphan(buf: &[u8], offset: u64, store: &TemplateStore) -> Option<RecoveredRecord> {
    let record = match root_node::extract_record(buf, offset) {
        Ok(record) => record,
        Err(e) => {
            info!("parse error for record at offset: {:#x}: {}", offset, e);
            return None;
        }
    };

    if record.substitutions.len() < 4 {
        info!("too few substitutions for record at offset: {:#x}", offset);
        return None;
    }

    // The event id lives at substitution index 3.
    let event_id = match record.substitutions[3].value.as_event_id() {
        Some(event_id) => event_id,
        None => {
            info!(
                "event id of record at offset {:#x} is not an integer",
                offset
            );
            return Some(RecoveredRecord::Incomplete(IncompleteRecord {
                offset,
                event_id: 0,
                substitutions: record.substitutions,
            }));
        }
    };

    let matches = store.matching(event_id, &record.substitutions);

    match matches.as_slice() {
        [] => {
            info!("no matching templates for record at offset: {:#x}", offset);
            Some(RecoveredRecord::Incomplete(IncompleteRecord {
                offset,
                event_id,
                substitutions: record.substitutions,
            }))
        }
        [template] => Some(RecoveredRecord::Complete(CompleteRecord {
            offset,
            event_id,
            xml: template.insert_substitutions(&record.substitutions),
        })),
        _ => {
            info!("too many templates for record at offset: {:#x}", offset);
            Some(RecoveredRecord::Incomplete(IncompleteRecord {
                offset,
                event_id,
                substitutions: record.substitutions,
            }))
        }
    }
}

/// Records of one valid chunk, in iteration order. Failing records are
/// logged and skipped.
pub fn extract_chunk_records(buf: &[u8], chunk_offset: u64) -> Vec<CompleteRecord> {
    chunk_records_and_templates(buf, chunk_offset)
        .into_iter()
        .map(|(record, _)| record)
        .collect()
}

/// Templates harvested from one valid chunk, in record iteration order.
pub fn extract_chunk_templates(buf: &[u8], chunk_offset: u64) -> Vec<Template> {
    chunk_records_and_templates(buf, chunk_offset)
        .into_iter()
        .map(|(_, template)| template)
        .collect()
}

fn chunk_records_and_templates(buf: &[u8], chunk_offset: u64) -> Vec<(CompleteRecord, Template)> {
    let start = chunk_offset as usize;

    let Some(data) = buf.get(start..start + EVTX_CHUNK_SIZE) else {
        warn!("chunk at {:#x} overruns the buffer", chunk_offset);
        return Vec::new();
    };

    let chunk = match EvtxChunk::new(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("failed to parse chunk header at {:#x}: {}", chunk_offset, e);
            return Vec::new();
        }
    };

    let mut out = Vec::new();

    for record in chunk.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                info!("EVTX parsing issue processing chunk {:#x}: {}", chunk_offset, e);
                continue;
            }
        };

        let record_offset = chunk_offset + record.offset_in_chunk;

        match reconstruct_chunk_record(&record, record_offset) {
            Ok(pair) => out.push(pair),
            Err(e) => info!("failed to process record at {:#x}: {}", record_offset, e),
        }
    }

    out
}
