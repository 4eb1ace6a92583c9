//! Integration tests for file-backed sources and sinks

mod common;

use std::fs;
use std::io::{BufReader, Cursor};
use tapstream::config::{SinkConfig, SourceConfig};
use tapstream::pipeline::producers::{LinesProducer, Producer};
use tapstream::pipeline::{Pipe, Sink, Source, StreamError};
use tapstream::types::{ReadMode, StreamMode};
use tempfile::TempDir;

fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn test_copy_file_in_both_modes() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("input.bin");
    let data = sample_bytes(300_000);
    fs::write(&src, &data).unwrap();

    let source_config = SourceConfig {
        chunk_size: 4096,
        high_water_mark: Some(16 * 1024),
    };
    for mode in [ReadMode::Push, ReadMode::Pull] {
        let dst = dir.path().join(format!("output-{}.bin", mode));
        let mut source = Source::open(&src, &source_config).unwrap();
        let mut sink = Sink::create(&dst, &SinkConfig::default()).unwrap();

        let report = Pipe::new(&mut source)
            .to(&mut sink)
            .mode(mode)
            .run()
            .unwrap();

        assert_eq!(report.volume, data.len() as u64);
        assert_eq!(report.stream_mode, StreamMode::Bytes);
        assert_eq!(fs::read(&dst).unwrap(), data);
    }
}

#[test]
fn test_open_missing_file_is_producer_error() {
    let dir = TempDir::new().unwrap();
    let err = Source::open(dir.path().join("missing.bin"), &SourceConfig::default()).unwrap_err();
    assert!(matches!(err, StreamError::Producer(_)));
}

#[test]
fn test_failed_copy_removes_partial_output() {
    let dir = TempDir::new().unwrap();
    let dst = dir.path().join("partial.bin");

    let mut sent = 0;
    let mut source = Source::try_from_generator(move || {
        sent += 1;
        if sent <= 3 {
            Some(Ok(vec![b'x'; 1024]))
        } else {
            Some(Err("upstream closed the connection"))
        }
    })
    .with_mode(StreamMode::Bytes);
    let config = SinkConfig {
        discard_partial_on_failure: true,
        ..SinkConfig::default()
    };
    let mut sink = Sink::create(&dst, &config).unwrap();

    let err = Pipe::new(&mut source).to(&mut sink).run().unwrap_err();

    assert!(matches!(err, StreamError::Producer(_)));
    assert!(!dst.exists());
}

#[test]
fn test_failed_copy_keeps_partial_output_by_default() {
    let dir = TempDir::new().unwrap();
    let dst = dir.path().join("kept.bin");

    let mut source = common::builders::ScriptedSource::new(vec![b"head".to_vec()])
        .then_fail("reset")
        .build()
        .with_mode(StreamMode::Bytes);
    let mut sink = Sink::create(&dst, &SinkConfig::default()).unwrap();

    assert!(Pipe::new(&mut source).to(&mut sink).run().is_err());
    assert_eq!(fs::read(&dst).unwrap(), b"head");
}

#[test]
fn test_text_file_streams_as_utf8_chunks() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("greeting.txt");
    let dst = dir.path().join("copy.txt");
    let text = "Grüße aus Zürich 🦀\n".repeat(500);
    fs::write(&src, &text).unwrap();

    let config = SourceConfig {
        chunk_size: 7,
        high_water_mark: None,
    };
    let mut source = Source::open_text(&src, &config).unwrap();
    let (mut sink, collected) = Sink::memory(StreamMode::Bytes);

    Pipe::new(&mut source).to(&mut sink).run().unwrap();

    let chunks = collected.chunks();
    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), text);

    let mut copy = Sink::create(&dst, &SinkConfig::default()).unwrap();
    let mut again = Source::from_items(chunks).with_mode(StreamMode::Bytes);
    Pipe::new(&mut again).to(&mut copy).run().unwrap();
    assert_eq!(fs::read_to_string(&dst).unwrap(), text);
}

#[test]
fn test_lines_become_records() {
    let input = "AB10 1XG, 57.14, -2.11\r\nAB10 6RN, 57.13, -2.12\n";
    let mut line_no = 0;
    let records = LinesProducer::new(BufReader::new(Cursor::new(input))).map(move |line: String| {
        line_no += 1;
        let fields: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
        serde_json::json!({ "line": line_no, "fields": fields })
    });
    let mut source = Source::from_producer(records, StreamMode::Object);
    let (mut sink, collected) = Sink::memory(StreamMode::Object);

    Pipe::new(&mut source).to(&mut sink).run().unwrap();

    let records = collected.chunks();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["line"], 1);
    assert_eq!(records[1]["fields"][0], "AB10 6RN");
    assert_eq!(records[1]["fields"][2], "-2.12");
}

#[test]
fn test_lines_source_counts_lines() {
    let mut source = Source::lines(Cursor::new("one\ntwo\nthree"));
    let (mut sink, collected) = Sink::memory(StreamMode::Object);

    let report = Pipe::new(&mut source).to(&mut sink).run().unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(collected.chunks(), vec!["one", "two", "three"]);
}
