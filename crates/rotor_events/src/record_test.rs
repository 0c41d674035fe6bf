use std::io::Cursor;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};

use super::{RecordError, RecordReader, RecordWriter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    name: String,
    value: u32,
}

fn payload(value: u32) -> Payload {
    Payload { name: "payload".to_string(), value }
}

#[test]
fn write_then_read_roundtrip() {
    let mut sink = Vec::new();
    let mut writer = RecordWriter::new(&mut sink);
    assert_eq!(writer.write_value("payload", &payload(1)).unwrap(), 0);
    assert_eq!(writer.write_value("payload", &payload(2)).unwrap(), 1);

    let mut reader = RecordReader::new(Cursor::new(sink));
    let first = reader.next_entry().unwrap().unwrap();
    assert_eq!(first.number, 0);
    assert_eq!(first.decode::<Payload>("payload").unwrap(), payload(1));
    let second = reader.next_entry().unwrap().unwrap();
    assert_eq!(second.decode::<Payload>("payload").unwrap(), payload(2));
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn entries_are_single_json_lines() {
    let mut sink = Vec::new();
    let mut writer = RecordWriter::new(&mut sink);
    writer.write_value("payload", &payload(3)).unwrap();

    assert_eq!(
        String::from_utf8(sink).unwrap(),
        concat!(
            r#"{"number":0,"type":"payload","contents":{"name":"payload","value":3}}"#,
            "\n",
        )
    );
}

#[test]
fn read_at_scans_forward() {
    let mut sink = Vec::new();
    let mut writer = RecordWriter::new(&mut sink);
    for value in 0..5 {
        writer.write_value("payload", &payload(value)).unwrap();
    }

    let mut reader = RecordReader::new(Cursor::new(sink));
    let entry = reader.read_at(3).unwrap();
    assert_eq!(entry.decode::<Payload>("payload").unwrap(), payload(3));
    // Reading backwards is not supported; 2 was already passed.
    assert_matches!(
        reader.read_at(2),
        Err(RecordError::MissedSequence { wanted: 2, found: 4 })
    );
}

#[test]
fn read_at_fails_past_the_end_of_the_stream() {
    let mut sink = Vec::new();
    let mut writer = RecordWriter::new(&mut sink);
    writer.write_value("payload", &payload(0)).unwrap();

    let mut reader = RecordReader::new(Cursor::new(sink));
    assert_matches!(reader.read_at(9), Err(RecordError::UnexpectedEof(9)));
}

#[test]
fn blank_line_terminates_the_stream() {
    let mut reader = RecordReader::new(Cursor::new("\n"));
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn failures_roundtrip_as_opaque_blobs() {
    let mut sink = Vec::new();
    let mut writer = RecordWriter::new(&mut sink);
    writer.write_failure("verification failed: bad proposer").unwrap();

    let mut reader = RecordReader::new(Cursor::new(sink));
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.type_tag, "exception");
    assert_matches!(
        entry.decode::<Payload>("payload"),
        Err(RecordError::RecordedFailure { number: 0, message })
            if message == "verification failed: bad proposer"
    );
}

#[test]
fn decode_rejects_unexpected_type_tags() {
    let mut sink = Vec::new();
    let mut writer = RecordWriter::new(&mut sink);
    writer.write_value("payload", &payload(0)).unwrap();

    let mut reader = RecordReader::new(Cursor::new(sink));
    let entry = reader.next_entry().unwrap().unwrap();
    assert_matches!(
        entry.decode::<Payload>("other"),
        Err(RecordError::TagMismatch { number: 0, .. })
    );
}
