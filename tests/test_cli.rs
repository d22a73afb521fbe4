use fixtures::*;

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_image(image: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create a temp file");
    file.write_all(image).expect("failed to write the image");
    file
}

fn sample_image() -> Vec<u8> {
    let chunk = synthetic_chunk(1001, "WKSTN");
    let known_orphan = chunk.record_bytes().to_vec();
    let unknown_orphan = orphan_record_with_eid(9999);

    let (image, _) = assemble_image(&[&chunk.data, &known_orphan, &unknown_orphan]);
    image
}

#[test]
fn test_dumps_xml_to_stdout() {
    let file = write_image(&sample_image());

    let mut cmd = Command::cargo_bin("evtxtract_dump").expect("failed to find binary");
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("<EventID>1001</EventID>").count(2))
        .stdout(predicate::str::contains("<Record>"))
        .stdout(predicate::str::contains("<EventID>9999</EventID>"));
}

#[test]
fn test_dumps_json_lines() {
    let file = write_image(&sample_image());

    let mut cmd = Command::cargo_bin("evtxtract_dump").expect("failed to find binary");
    cmd.arg("-o").arg("json").arg(file.path());

    let output = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8(output).expect("output should be utf8");

    let lines: Vec<&str> = stdout.lines().filter(|line| !line.is_empty()).collect();
    assert_eq!(lines.len(), 3);

    let first: serde_json::Value =
        serde_json::from_str(lines[0]).expect("each line should be a json document");
    assert_eq!(first["complete"]["event_id"], 1001);

    let last: serde_json::Value =
        serde_json::from_str(lines[2]).expect("each line should be a json document");
    assert_eq!(last["incomplete"]["event_id"], 9999);
}

#[test]
fn test_writes_output_file() {
    let file = write_image(&sample_image());
    let dir = tempfile::tempdir().expect("failed to create a temp dir");
    let target = dir.path().join("dump.xml");

    let mut cmd = Command::cargo_bin("evtxtract_dump").expect("failed to find binary");
    cmd.arg("-f").arg(&target).arg(file.path());

    cmd.assert().success();

    let written = std::fs::read_to_string(&target).expect("output file should exist");
    assert!(written.contains("<Computer>WKSTN</Computer>"));
}

#[test]
fn test_missing_input_fails() {
    let mut cmd = Command::cargo_bin("evtxtract_dump").expect("failed to find binary");
    cmd.arg("/definitely/not/a/real/path");

    cmd.assert().failure();
}
