//! Tests for the capture loop
//!
//! These tests verify:
//! - Rotation every `batches_per_segment` non-empty batches
//! - Idle batches and position-less records never finalize a segment
//! - Restart resumes from the last finalized checkpoint
//! - Finalized segments are never rewritten on restart
//! - Bounded attach retries and re-attach after a lost connection

use std::time::Duration;

use lcrlog::checkpoint::SegmentSet;
use lcrlog::record::{ChangeRecord, RecordHeader, RowChange, RowOperation};
use lcrlog::segment::{LoggedChange, SegmentReader, SegmentState, HEADER_SIZE};
use lcrlog::stream::memory::{MemoryUpstream, ScriptStep};
use lcrlog::{Config, LcrError, LoopState, Producer, ProgressMarker, RunLimit};
use tempfile::TempDir;

use crate::common::{self, pos, step, step_with_chunks, test_config};

// =============================================================================
// Helper Functions
// =============================================================================

fn segments(config: &Config) -> SegmentSet {
    SegmentSet::from_config(config)
}

fn records_of(config: &Config, sequence: u64) -> Vec<ChangeRecord> {
    entries_of(config, sequence).into_iter().map(|entry| entry.record).collect()
}

fn entries_of(config: &Config, sequence: u64) -> Vec<LoggedChange> {
    SegmentReader::open(&segments(config).path(sequence))
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap()
}

/// Header plus the end-of-segment frame
const ABANDONED_EMPTY_LEN: u64 = HEADER_SIZE as u64 + 16;

fn segment_len(config: &Config, sequence: u64) -> u64 {
    std::fs::metadata(segments(config).path(sequence)).unwrap().len()
}

fn capture_progress(config: &Config) -> u64 {
    ProgressMarker::new(config.capture_progress_path()).load().unwrap()
}

/// Two transactions, one batch each
fn two_batches() -> Vec<ScriptStep> {
    vec![
        step(common::insert("EMPLOYEES", &[0x01])),
        step(common::commit(&[0x02])),
        ScriptStep::BatchEnd,
        step(common::update("EMPLOYEES", &[0x03])),
        step(common::commit(&[0x04])),
        ScriptStep::BatchEnd,
    ]
}

// =============================================================================
// Rotation Tests
// =============================================================================

#[test]
fn test_one_segment_per_batch() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let upstream = MemoryUpstream::new(two_batches());

    let mut producer = Producer::new(config.clone(), upstream.clone()).unwrap();
    let report = producer.run(RunLimit::Forever).unwrap();

    assert_eq!(report.segments, 2);
    assert_eq!(report.records, 4);
    assert_eq!(report.last_sequence, Some(2));
    assert_eq!(report.last_checkpoint, Some(pos(&[0x04])));
    assert_eq!(producer.state(), LoopState::Detached);

    let segments = segments(&config);
    assert_eq!(segments.state(1).unwrap(), SegmentState::Complete(pos(&[0x02])));
    assert_eq!(segments.state(2).unwrap(), SegmentState::Complete(pos(&[0x04])));
    // opened after the second rotation and abandoned at end of stream
    assert_eq!(segments.state(3).unwrap(), SegmentState::InProgress);

    assert_eq!(
        records_of(&config, 1),
        vec![common::insert("EMPLOYEES", &[0x01]), common::commit(&[0x02])]
    );
    assert_eq!(capture_progress(&config), 2);
    assert_eq!(upstream.reported_watermarks(), vec![pos(&[0x02]), pos(&[0x04])]);
    assert_eq!(upstream.attach_positions(), vec![None]);
    assert_eq!(upstream.detach_count(), 1);
}

#[test]
fn test_several_batches_per_segment() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .log_dir(temp_dir.path())
        .batches_per_segment(2)
        .segment_poll_interval(Duration::from_millis(1))
        .build();
    let mut script = two_batches();
    script.push(step(common::delete("EMPLOYEES", &[0x05])));
    script.push(ScriptStep::BatchEnd);

    let report = Producer::new(config.clone(), MemoryUpstream::new(script))
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();

    assert_eq!(report.segments, 1);
    assert_eq!(records_of(&config, 1).len(), 4);
    assert_eq!(segments(&config).checkpoint(1).unwrap(), pos(&[0x04]));
    // the fifth record only reached the abandoned segment
    assert_eq!(segments(&config).state(2).unwrap(), SegmentState::InProgress);
}

#[test]
fn test_idle_batches_do_not_rotate() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let script = vec![
        ScriptStep::BatchEnd,
        ScriptStep::BatchEnd,
        step(common::insert("EMPLOYEES", &[0x01])),
        ScriptStep::BatchEnd,
        ScriptStep::BatchEnd,
    ];

    let report = Producer::new(config.clone(), MemoryUpstream::new(script))
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();

    assert_eq!(report.segments, 1);
    assert_eq!(records_of(&config, 1), vec![common::insert("EMPLOYEES", &[0x01])]);
    assert_eq!(segment_len(&config, 2), ABANDONED_EMPTY_LEN);
}

#[test]
fn test_batch_without_positions_keeps_segment_open() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let anonymous: ChangeRecord =
        RowChange::new(RecordHeader::default(), RowOperation::Commit).into();
    let script = vec![
        step(anonymous.clone()),
        ScriptStep::BatchEnd,
        step(common::commit(&[0x07])),
        ScriptStep::BatchEnd,
    ];

    Producer::new(config.clone(), MemoryUpstream::new(script))
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();

    assert_eq!(records_of(&config, 1), vec![anonymous, common::commit(&[0x07])]);
    assert_eq!(segments(&config).checkpoint(1).unwrap(), pos(&[0x07]));
}

#[test]
fn test_chunks_are_captured_with_their_row() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let (record, chunks) = common::insert_with_lob(&[0x01]);
    let script = vec![
        step_with_chunks((record.clone(), chunks.clone())),
        step(common::commit(&[0x02])),
        ScriptStep::BatchEnd,
    ];

    let report = Producer::new(config.clone(), MemoryUpstream::new(script))
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();

    assert_eq!(report.chunks, 2);
    let entries = entries_of(&config, 1);
    assert_eq!(entries[0].record, record);
    assert_eq!(entries[0].chunks, chunks);
    assert!(entries[1].chunks.is_empty());
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_restart_resumes_after_last_checkpoint() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let upstream = MemoryUpstream::new(two_batches());

    let first = Producer::new(config.clone(), upstream.clone())
        .unwrap()
        .run(RunLimit::Segments(1))
        .unwrap();
    assert_eq!(first.segments, 1);
    assert_eq!(capture_progress(&config), 1);

    let second = Producer::new(config.clone(), upstream.clone())
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();
    assert_eq!(second.segments, 1);
    assert_eq!(second.last_sequence, Some(2));

    assert_eq!(upstream.attach_positions(), vec![None, Some(pos(&[0x02]))]);
    assert_eq!(
        records_of(&config, 2),
        vec![common::update("EMPLOYEES", &[0x03]), common::commit(&[0x04])]
    );
    assert_eq!(capture_progress(&config), 2);
}

#[test]
fn test_restart_replaces_unfinalized_segment() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());

    // first run dies with one record in segment 1 and nothing finalized
    let crashed = vec![step(common::insert("EMPLOYEES", &[0x01]))];
    Producer::new(config.clone(), MemoryUpstream::new(crashed))
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();
    assert_eq!(segments(&config).state(1).unwrap(), SegmentState::InProgress);

    let upstream = MemoryUpstream::new(two_batches());
    Producer::new(config.clone(), upstream.clone())
        .unwrap()
        .run(RunLimit::Segments(1))
        .unwrap();

    assert_eq!(upstream.attach_positions(), vec![None]);
    assert_eq!(
        records_of(&config, 1),
        vec![common::insert("EMPLOYEES", &[0x01]), common::commit(&[0x02])]
    );
}

#[test]
fn test_restart_adopts_segment_finalized_before_progress() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let mut script = two_batches();
    script.push(step(common::delete("EMPLOYEES", &[0x05])));
    script.push(ScriptStep::BatchEnd);
    let upstream = MemoryUpstream::new(script);

    Producer::new(config.clone(), upstream.clone())
        .unwrap()
        .run(RunLimit::Segments(2))
        .unwrap();
    let finalized = std::fs::read(segments(&config).path(2)).unwrap();

    // crash after segment 2 was finalized but before its progress was stored
    ProgressMarker::new(config.capture_progress_path()).store(1).unwrap();

    let report = Producer::new(config.clone(), upstream.clone())
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();

    assert_eq!(report.segments, 1);
    assert_eq!(report.last_sequence, Some(3));
    assert_eq!(std::fs::read(segments(&config).path(2)).unwrap(), finalized);
    assert_eq!(upstream.attach_positions(), vec![None, Some(pos(&[0x04]))]);
    assert_eq!(records_of(&config, 3), vec![common::delete("EMPLOYEES", &[0x05])]);
    assert_eq!(capture_progress(&config), 3);
}

#[test]
fn test_missing_finalized_segment_is_fatal() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    ProgressMarker::new(config.capture_progress_path()).store(3).unwrap();

    let upstream = MemoryUpstream::new(two_batches());
    let mut producer = Producer::new(config, upstream.clone()).unwrap();
    let result = producer.run(RunLimit::Forever);

    assert!(matches!(result, Err(LcrError::SegmentCorrupted { .. })));
    assert_eq!(producer.state(), LoopState::Failed);
    assert!(upstream.attach_positions().is_empty());
}

// =============================================================================
// Connection Tests
// =============================================================================

#[test]
fn test_attach_is_retried() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let upstream = MemoryUpstream::new(two_batches());
    upstream.fail_attaches(2);

    let report = Producer::new(config, upstream.clone())
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();

    assert_eq!(report.segments, 2);
    assert_eq!(upstream.attach_positions().len(), 3);
}

#[test]
fn test_attach_retries_are_bounded() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let upstream = MemoryUpstream::new(two_batches());
    upstream.fail_attaches(3);

    let mut producer = Producer::new(config.clone(), upstream.clone()).unwrap();
    let result = producer.run(RunLimit::Forever);

    match result {
        Err(LcrError::AttachRetriesExhausted { attempts, endpoint }) => {
            assert_eq!(attempts, 3);
            assert_eq!(endpoint, "OUTBOUND");
        }
        other => panic!("expected AttachRetriesExhausted, got {:?}", other.map(|_| ())),
    }
    assert_eq!(producer.state(), LoopState::Failed);
    assert!(segments(&config).sequences().unwrap().is_empty());
}

#[test]
fn test_lost_connection_reattaches_from_checkpoint() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(temp_dir.path());
    let script = vec![
        step(common::insert("EMPLOYEES", &[0x01])),
        ScriptStep::BatchEnd,
        step(common::update("EMPLOYEES", &[0x02])),
        ScriptStep::Disconnect,
        step(common::commit(&[0x03])),
        ScriptStep::BatchEnd,
    ];
    let upstream = MemoryUpstream::new(script);

    let report = Producer::new(config.clone(), upstream.clone())
        .unwrap()
        .run(RunLimit::Forever)
        .unwrap();

    assert_eq!(report.segments, 2);
    assert_eq!(upstream.attach_positions(), vec![None, Some(pos(&[0x01]))]);
    assert_eq!(upstream.detach_count(), 2);
    // the partial segment was rewritten from the resume point
    assert_eq!(
        records_of(&config, 2),
        vec![common::update("EMPLOYEES", &[0x02]), common::commit(&[0x03])]
    );
}
