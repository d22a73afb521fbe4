use fixtures::*;

use evtxtract::{find_evtx_chunks, find_evtx_records, is_chunk_header, is_record};
use pretty_assertions::assert_eq;

#[test]
fn test_finds_a_synthetic_chunk() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let (image, offsets) = assemble_image(&[&chunk.data]);

    let found: Vec<u64> = find_evtx_chunks(&image).collect();
    assert_eq!(found, offsets);
}

#[test]
fn test_chunk_with_a_corrupted_data_area_is_rejected() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let (mut image, offsets) = assemble_image(&[&chunk.data]);

    assert!(is_chunk_header(&image, offsets[0]));

    // Flip a byte inside the record area; the data CRC32 no longer holds.
    let corrupt_at = offsets[0] as usize + CHUNK_HEADER_SIZE + 0x30;
    image[corrupt_at] ^= 0xff;

    assert!(!is_chunk_header(&image, offsets[0]));
    assert_eq!(find_evtx_chunks(&image).count(), 0);
}

#[test]
fn test_chunk_with_a_corrupted_header_is_rejected() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let (mut image, offsets) = assemble_image(&[&chunk.data]);

    // Flip a bit in the record-number fields covered by the header CRC32.
    image[offsets[0] as usize + 0x10] ^= 0x01;

    assert!(!is_chunk_header(&image, offsets[0]));
}

#[test]
fn test_truncated_chunk_is_rejected() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");

    // One byte short of a full chunk.
    assert!(!is_chunk_header(&chunk.data[..CHUNK_SIZE - 1], 0));
}

#[test]
fn test_finds_records_inside_and_outside_chunks() {
    ensure_env_logger_initialized();
    let chunk = synthetic_chunk(1001, "WKSTN");
    let orphan = orphan_record_with_eid(9999);
    let (image, offsets) = assemble_image(&[&chunk.data, &orphan]);

    let found: Vec<u64> = find_evtx_records(&image).collect();

    // The record embedded in the chunk is a hit too; the scan itself does
    // not care about chunk membership.
    assert_eq!(
        found,
        vec![offsets[0] + CHUNK_HEADER_SIZE as u64, offsets[1]]
    );

    for offset in found {
        assert!(is_record(&image, offset));
    }
}

#[test]
fn test_record_validation_at_the_buffer_edge() {
    ensure_env_logger_initialized();
    let orphan = orphan_record_with_eid(21);

    // Record ending exactly at the end of the buffer is fine.
    assert!(is_record(&orphan, 0));

    // One byte past the end is not.
    assert!(!is_record(&orphan[..orphan.len() - 1], 0));
}
