//! Tests for the segment reader
//!
//! These tests verify:
//! - Records come back in write order with their chunk runs
//! - Corrupted frames are attributed to the segment file
//! - Header problems are reported before any record is read
//! - Segment discovery through `SegmentSet`

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use lcrlog::checkpoint::SegmentSet;
use lcrlog::config::SyncStrategy;
use lcrlog::record::ChangeRecord;
use lcrlog::segment::{LoggedChange, SegmentReader, SegmentState, SegmentWriter, HEADER_SIZE};
use lcrlog::LcrError;
use tempfile::TempDir;

use crate::common::{self, pos};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_segment() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lcr_archive_1.lcr");
    (temp_dir, path)
}

/// Write `records` (no chunks) and finalize with the last one's position
fn write_segment(path: &Path, records: &[ChangeRecord]) {
    let mut writer = SegmentWriter::create(path, SyncStrategy::Flush).unwrap();
    for record in records {
        writer.append_record(record).unwrap();
    }
    let checkpoint = writer.last_position().cloned().unwrap_or_else(|| pos(&[0]));
    writer.finish(&checkpoint).unwrap();
}

fn sample_records() -> Vec<ChangeRecord> {
    vec![
        common::create_table(&[0x01]),
        common::insert("AUDIT", &[0x02]),
        common::update("AUDIT", &[0x03]),
        common::delete("AUDIT", &[0x04]),
        common::commit(&[0x05]),
    ]
}

// =============================================================================
// Replay Tests
// =============================================================================

#[test]
fn test_records_come_back_in_order() {
    let (_temp, path) = setup_temp_segment();
    let records = sample_records();
    write_segment(&path, &records);

    let mut reader = SegmentReader::open(&path).unwrap();
    assert_eq!(reader.checkpoint(), &pos(&[0x05]));

    let mut replayed = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        replayed.push(record);
    }
    assert_eq!(replayed, records);
    assert_eq!(reader.records_read(), 5);

    // stays at the end; never moves on to another file
    assert_eq!(reader.read_record().unwrap(), None);
}

#[test]
fn test_empty_segment() {
    let (_temp, path) = setup_temp_segment();
    write_segment(&path, &[]);

    let mut reader = SegmentReader::open(&path).unwrap();
    assert_eq!(reader.read_record().unwrap(), None);
    assert_eq!(reader.records_read(), 0);
}

#[test]
fn test_entries_group_chunk_runs() {
    let (_temp, path) = setup_temp_segment();
    let (lob_row, chunks) = common::insert_with_lob(&[0x02]);

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&common::insert("EMPLOYEES", &[0x01])).unwrap();
    writer.append_record(&lob_row).unwrap();
    for chunk in &chunks {
        writer.append_chunk(chunk).unwrap();
    }
    writer.append_record(&common::commit(&[0x03])).unwrap();
    writer.finish(&pos(&[0x03])).unwrap();

    let entries: Vec<LoggedChange> = SegmentReader::open(&path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(entries.len(), 3);
    assert!(entries[0].chunks.is_empty());
    assert_eq!(entries[1].record, lob_row);
    assert_eq!(entries[1].chunks, chunks);
    assert!(entries[2].chunks.is_empty());
}

#[test]
fn test_skipping_chunks_is_rejected() {
    let (_temp, path) = setup_temp_segment();
    let (lob_row, chunks) = common::insert_with_lob(&[0x02]);

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&lob_row).unwrap();
    for chunk in &chunks {
        writer.append_chunk(chunk).unwrap();
    }
    writer.finish(&pos(&[0x02])).unwrap();

    let mut reader = SegmentReader::open(&path).unwrap();
    reader.read_record().unwrap();
    assert!(matches!(reader.read_record(), Err(LcrError::Protocol(_))));

    let mut reader = SegmentReader::open(&path).unwrap();
    assert!(matches!(reader.read_chunk(), Err(LcrError::Protocol(_))));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_garbage_frame_names_the_file() {
    let (_temp, path) = setup_temp_segment();
    write_segment(&path, &sample_records());

    let mut raw = fs::read(&path).unwrap();
    // wreck the null marker of the first frame tag
    raw[HEADER_SIZE + 3] = 0x7f;
    fs::write(&path, &raw).unwrap();

    let mut reader = SegmentReader::open(&path).unwrap();
    match reader.read_record() {
        Err(LcrError::SegmentCorrupted { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected SegmentCorrupted, got {:?}", other),
    }
}

#[test]
fn test_truncated_segment_is_corruption() {
    let (_temp, path) = setup_temp_segment();
    write_segment(&path, &sample_records());

    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 20).unwrap();

    let results: Vec<_> = SegmentReader::open(&path).unwrap().entries().collect();
    let last = results.last().unwrap();
    assert!(matches!(last, Err(LcrError::SegmentCorrupted { .. })));
    assert!(results[..results.len() - 1].iter().all(|r| r.is_ok()));
}

#[test]
fn test_header_problems() {
    let (_temp, path) = setup_temp_segment();
    write_segment(&path, &sample_records());

    let mut raw = fs::read(&path).unwrap();
    raw[68] = b'N';
    fs::write(&path, &raw).unwrap();
    match SegmentReader::open(&path) {
        Err(LcrError::InvalidEndMarker { found, .. }) => assert_eq!(found, *b"N\0"),
        other => panic!("expected InvalidEndMarker, got {:?}", other.map(|_| ())),
    }

    raw[0..4].copy_from_slice(&(-3i32).to_be_bytes());
    fs::write(&path, &raw).unwrap();
    assert!(matches!(
        SegmentState::probe(&path),
        Err(LcrError::SegmentCorrupted { .. })
    ));

    // the writer crashed right after creating the file
    fs::write(&path, b"").unwrap();
    assert_eq!(SegmentState::probe(&path).unwrap(), SegmentState::InProgress);
}

#[test]
fn test_trailing_bytes_after_end_are_ignored() {
    let (_temp, path) = setup_temp_segment();
    write_segment(&path, &sample_records());

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"junk").unwrap();

    let entries: Vec<_> = SegmentReader::open(&path).unwrap().entries().collect();
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e.is_ok()));
}

// =============================================================================
// SegmentSet Tests
// =============================================================================

#[test]
fn test_segment_set_discovers_and_probes() {
    let temp_dir = TempDir::new().unwrap();
    let segments = SegmentSet::new(temp_dir.path(), "lcr_archive", "lcr");

    write_segment(&segments.path(1), &[common::commit(&[0x01])]);
    write_segment(&segments.path(2), &[common::commit(&[0x02])]);
    let writer = SegmentWriter::create(&segments.path(10), SyncStrategy::Flush).unwrap();
    fs::write(temp_dir.path().join("lcr_archive_x.lcr"), b"").unwrap();
    fs::write(temp_dir.path().join("other_3.lcr"), b"").unwrap();
    fs::write(temp_dir.path().join("capture_progress"), [0u8; 8]).unwrap();

    assert_eq!(segments.sequences().unwrap(), vec![1, 2, 10]);
    assert_eq!(segments.state(2).unwrap(), SegmentState::Complete(pos(&[0x02])));
    assert_eq!(segments.state(10).unwrap(), SegmentState::InProgress);
    assert_eq!(segments.state(3).unwrap(), SegmentState::Missing);
    assert_eq!(segments.checkpoint(1).unwrap(), pos(&[0x01]));
    assert!(matches!(
        segments.checkpoint(10),
        Err(LcrError::IncompleteSegment { .. })
    ));
    drop(writer);
}
