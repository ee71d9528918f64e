//! Tests for the segment writer
//!
//! These tests verify:
//! - The 70-byte header stays zero until finalize
//! - Finalize publishes checkpoint, end marker and length
//! - Abandoned segments stay in progress
//! - Chunk runs are enforced while writing

use std::fs;
use std::path::PathBuf;

use lcrlog::config::SyncStrategy;
use lcrlog::segment::{SegmentReader, SegmentState, SegmentWriter, END_MARKER, HEADER_SIZE};
use lcrlog::LcrError;
use tempfile::TempDir;

use crate::common::{self, blob_chunk, pos};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_segment() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("lcr_archive_1.lcr");
    (temp_dir, path)
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_new_segment_has_zero_header() {
    let (_temp, path) = setup_temp_segment();

    let writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();

    let raw = fs::read(&path).unwrap();
    assert_eq!(raw, vec![0u8; HEADER_SIZE]);
    assert_eq!(SegmentState::probe(&path).unwrap(), SegmentState::InProgress);
    drop(writer);
}

#[test]
fn test_finalized_header_layout() {
    let (_temp, path) = setup_temp_segment();

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Always).unwrap();
    writer.append_record(&common::update("EMPLOYEES", &[0, 0, 0, 0x0a])).unwrap();
    writer.finish(&pos(&[0, 0, 0, 0x0a])).unwrap();

    let raw = fs::read(&path).unwrap();
    assert_eq!(&raw[0..4], &[0, 0, 0, 4]);
    assert_eq!(&raw[4..8], &[0, 0, 0, 0x0a]);
    assert!(raw[8..68].iter().all(|&b| b == 0));
    assert_eq!(&raw[68..70], &END_MARKER);
    assert_eq!(&raw[68..70], b"Y\0");
}

#[test]
fn test_update_survives_finalize_and_reopen() {
    let (_temp, path) = setup_temp_segment();
    let record = common::update("EMPLOYEES", &[0, 0, 0, 0x0a]);

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&record).unwrap();
    let summary = writer.finish(&pos(&[0, 0, 0, 0x0a])).unwrap();

    assert_eq!(summary.records, 1);
    assert_eq!(summary.checkpoint, Some(pos(&[0, 0, 0, 0x0a])));
    assert_eq!(summary.size, fs::metadata(&path).unwrap().len());

    let mut reader = SegmentReader::open(&path).unwrap();
    assert_eq!(reader.checkpoint(), &pos(&[0, 0, 0, 0x0a]));
    assert_eq!(reader.read_record().unwrap(), Some(record));
    assert_eq!(reader.read_record().unwrap(), None);
    assert!(reader.is_finished());
}

#[test]
fn test_checkpoint_of_full_capacity() {
    let (_temp, path) = setup_temp_segment();
    let checkpoint = pos(&[0xab; 64]);

    let writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.finish(&checkpoint).unwrap();

    assert_eq!(SegmentState::probe(&path).unwrap(), SegmentState::Complete(checkpoint));
}

#[test]
fn test_oversized_or_empty_checkpoint_is_rejected() {
    let (_temp, path) = setup_temp_segment();

    let writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    let result = writer.finish(&pos(&[1; 65]));
    assert!(matches!(result, Err(LcrError::Protocol(_))));
    assert_eq!(SegmentState::probe(&path).unwrap(), SegmentState::InProgress);

    let writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    assert!(matches!(writer.finish(&pos(&[])), Err(LcrError::Protocol(_))));
}

// =============================================================================
// Abandon Tests
// =============================================================================

#[test]
fn test_unfinalized_segment_is_incomplete() {
    let (_temp, path) = setup_temp_segment();

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&common::insert("EMPLOYEES", &[0x01])).unwrap();

    assert!(matches!(
        SegmentReader::open(&path),
        Err(LcrError::IncompleteSegment { path: p }) if p == path
    ));
    drop(writer);
}

#[test]
fn test_abandon_leaves_segment_in_progress() {
    let (_temp, path) = setup_temp_segment();

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&common::insert("EMPLOYEES", &[0x01])).unwrap();
    writer.append_record(&common::commit(&[0x02])).unwrap();
    let summary = writer.abandon().unwrap();

    assert_eq!(summary.checkpoint, None);
    assert_eq!(summary.records, 2);
    assert_eq!(SegmentState::probe(&path).unwrap(), SegmentState::InProgress);
}

#[test]
fn test_create_replaces_leftover_of_crashed_writer() {
    let (_temp, path) = setup_temp_segment();

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&common::insert("STALE", &[0x01])).unwrap();
    writer.abandon().unwrap();

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&common::insert("FRESH", &[0x02])).unwrap();
    writer.finish(&pos(&[0x02])).unwrap();

    let records: Vec<_> = SegmentReader::open(&path)
        .unwrap()
        .entries()
        .map(|entry| entry.unwrap().record)
        .collect();
    assert_eq!(records, vec![common::insert("FRESH", &[0x02])]);
}

// =============================================================================
// Chunk Run Tests
// =============================================================================

#[test]
fn test_chunks_follow_their_row() {
    let (_temp, path) = setup_temp_segment();
    let (record, chunks) = common::insert_with_lob(&[0x03]);

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&record).unwrap();
    for chunk in &chunks {
        writer.append_chunk(chunk).unwrap();
    }
    writer.append_record(&common::commit(&[0x04])).unwrap();

    assert_eq!(writer.records_written(), 2);
    assert_eq!(writer.chunks_written(), 2);
    assert_eq!(writer.last_position(), Some(&pos(&[0x04])));

    let summary = writer.finish(&pos(&[0x04])).unwrap();
    assert_eq!(summary.chunks, 2);
}

#[test]
fn test_chunk_without_row_is_rejected() {
    let (_temp, path) = setup_temp_segment();

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&common::insert("EMPLOYEES", &[0x01])).unwrap();

    let result = writer.append_chunk(&blob_chunk("BODY", b"x", true, true));
    assert!(matches!(result, Err(LcrError::Protocol(_))));
    assert_eq!(writer.chunks_written(), 0);
}

#[test]
fn test_record_inside_chunk_run_is_rejected() {
    let (_temp, path) = setup_temp_segment();
    let (record, chunks) = common::insert_with_lob(&[0x03]);

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&record).unwrap();
    writer.append_chunk(&chunks[0]).unwrap();

    let result = writer.append_record(&common::commit(&[0x04]));
    assert!(matches!(result, Err(LcrError::Protocol(_))));
}

#[test]
fn test_interleaved_columns_are_rejected() {
    let (_temp, path) = setup_temp_segment();
    let (record, _) = common::insert_with_lob(&[0x03]);

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&record).unwrap();
    writer.append_chunk(&blob_chunk("BODY", b"a", false, false)).unwrap();

    let result = writer.append_chunk(&blob_chunk("PHOTO", b"b", true, true));
    assert!(matches!(result, Err(LcrError::Protocol(_))));
}

#[test]
fn test_finish_with_open_chunk_run_is_rejected() {
    let (_temp, path) = setup_temp_segment();
    let (record, chunks) = common::insert_with_lob(&[0x03]);

    let mut writer = SegmentWriter::create(&path, SyncStrategy::Flush).unwrap();
    writer.append_record(&record).unwrap();
    writer.append_chunk(&chunks[0]).unwrap();

    assert!(matches!(writer.finish(&pos(&[0x03])), Err(LcrError::Protocol(_))));
    assert_eq!(SegmentState::probe(&path).unwrap(), SegmentState::InProgress);
}
