use fixtures::*;

use evtxtract::{
    extract_chunk_records, extract_chunk_templates, EvtxExtractor, RecoveredRecord,
};
use pretty_assertions::assert_eq;

const EXPECTED_XML: &str =
    "<Event><System><EventID>1001</EventID><Computer>WKSTN</Computer></System></Event>";

#[test]
fn test_extract_chunk_records_renders_full_xml() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let (image, offsets) = assemble_image(&[&chunk.data]);

    let records = extract_chunk_records(&image, offsets[0]);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].offset, offsets[0] + CHUNK_HEADER_SIZE as u64);
    assert_eq!(records[0].event_id, 1001);
    assert_eq!(records[0].xml, EXPECTED_XML);
}

#[test]
fn test_extract_chunk_templates_yields_signed_templates() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let (image, offsets) = assemble_image(&[&chunk.data]);

    let templates = extract_chunk_templates(&image, offsets[0]);

    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].event_id, 1001);
    assert_eq!(templates[0].signature(), "1001-[0|1|c]-[3|6|n]");
    assert_eq!(
        templates[0].xml,
        "<Event><System><EventID>[Normal Substitution(index=3, type=6)]</EventID>\
         <Computer>[Conditional Substitution(index=0, type=1)]</Computer></System></Event>"
    );
}

#[test]
fn test_extract_reconstructs_orphans_against_harvested_templates() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let known_orphan = chunk.record_bytes().to_vec();
    let unknown_orphan = orphan_record_with_eid(9999);

    let (image, offsets) = assemble_image(&[&chunk.data, &known_orphan, &unknown_orphan]);
    let chunk_record_offset = offsets[0] + CHUNK_HEADER_SIZE as u64;

    let records: Vec<RecoveredRecord> = EvtxExtractor::from_buffer(&image).records().collect();

    assert_eq!(records.len(), 3);

    // Pass 1: the chunk record.
    let RecoveredRecord::Complete(from_chunk) = &records[0] else {
        panic!("expected a complete record from the chunk, got {:?}", records[0]);
    };
    assert_eq!(from_chunk.offset, chunk_record_offset);
    assert_eq!(from_chunk.event_id, 1001);
    assert_eq!(from_chunk.xml, EXPECTED_XML);

    // Pass 2: the orphan that matches the harvested template is rebuilt
    // into byte-identical XML.
    let RecoveredRecord::Complete(reconstructed) = &records[1] else {
        panic!("expected the known orphan to reconstruct, got {:?}", records[1]);
    };
    assert_eq!(reconstructed.offset, offsets[1]);
    assert_eq!(reconstructed.event_id, 1001);
    assert_eq!(reconstructed.xml, from_chunk.xml);

    // Pass 2: the orphan with an unknown event id is preserved as evidence.
    let RecoveredRecord::Incomplete(incomplete) = &records[2] else {
        panic!("expected an incomplete record, got {:?}", records[2]);
    };
    assert_eq!(incomplete.offset, offsets[2]);
    assert_eq!(incomplete.event_id, 9999);
    assert_eq!(incomplete.substitutions.len(), 4);
}

#[test]
fn test_chunk_records_are_not_revisited_in_pass_two() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let (image, _) = assemble_image(&[&chunk.data]);

    let records: Vec<RecoveredRecord> = EvtxExtractor::from_buffer(&image).records().collect();

    // The record magic inside the chunk is found by the pass 2 scan, but the
    // offset was already yielded in pass 1.
    assert_eq!(records.len(), 1);
}

#[test]
fn test_extraction_is_idempotent() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(22, "HOST-22");
    let known_orphan = chunk.record_bytes().to_vec();
    let unknown_orphan = orphan_record_with_eid(306);

    let (image, _) = assemble_image(&[&chunk.data, &known_orphan, &unknown_orphan]);

    let first: Vec<RecoveredRecord> = EvtxExtractor::from_buffer(&image).records().collect();
    let second: Vec<RecoveredRecord> = EvtxExtractor::from_buffer(&image).records().collect();

    assert_eq!(first, second);
}

#[test]
fn test_orphans_with_too_few_substitutions_are_skipped() {
    ensure_env_logger_initialized();
    let orphan = orphan_record_with_three_substitutions();
    let (image, _) = assemble_image(&[&orphan]);

    let records: Vec<RecoveredRecord> = EvtxExtractor::from_buffer(&image).records().collect();

    assert_eq!(records, vec![]);
}

#[test]
fn test_orphans_without_templates_are_incomplete() {
    ensure_env_logger_initialized();
    // No chunk anywhere, so the store stays empty.
    let orphan = orphan_record_with_eid(4624);
    let (image, offsets) = assemble_image(&[&orphan]);

    let records: Vec<RecoveredRecord> = EvtxExtractor::from_buffer(&image).records().collect();

    assert_eq!(records.len(), 1);
    match &records[0] {
        RecoveredRecord::Incomplete(incomplete) => {
            assert_eq!(incomplete.offset, offsets[0]);
            assert_eq!(incomplete.event_id, 4624);
        }
        other => panic!("expected an incomplete record, got {other:?}"),
    }
}

#[test]
fn test_multithreaded_chunk_validation_matches_serial() {
    ensure_env_logger_initialized();
    let chunk_a = synthetic_chunk(1, "ALPHA");
    let chunk_b = synthetic_chunk(2, "BRAVO");
    let (image, _) = assemble_image(&[&chunk_a.data, &chunk_b.data]);

    let serial: Vec<(u64, u32)> = EvtxExtractor::from_buffer(&image)
        .records()
        .map(|r| (r.offset(), r.event_id()))
        .collect();

    let parallel: Vec<(u64, u32)> = EvtxExtractor::from_buffer(&image)
        .with_configuration(evtxtract::ExtractSettings::new().num_threads(4))
        .records()
        .map(|r| (r.offset(), r.event_id()))
        .collect();

    assert_eq!(serial, parallel);
}
