//! Segment header
//!
//! The first 70 bytes of every segment. While the segment is being written
//! the whole region is zero; finalizing fills in the checkpoint.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::{LcrError, Result};
use crate::record::Position;

/// Checkpoint length field (4) + checkpoint area (64) + end marker (2)
pub const HEADER_SIZE: usize = 70;

/// Room reserved for the checkpoint position
pub const CHECKPOINT_CAPACITY: usize = 64;

/// Offset of the end marker slot
pub const END_MARKER_OFFSET: usize = 68;

/// Written into the end marker slot when the segment is finalized
pub const END_MARKER: [u8; 2] = *b"Y\0";

/// Lifecycle state of a segment file as seen from its header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentState {
    /// No file yet
    Missing,
    /// Writer has not finalized it (or died before doing so)
    InProgress,
    /// Finalized with this checkpoint; immutable from now on
    Complete(Position),
}

impl SegmentState {
    /// Inspect a segment header without opening it for replay
    pub fn probe(path: &Path) -> Result<Self> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SegmentState::Missing),
            Err(e) => return Err(e.into()),
        };

        match read_checkpoint(path, &mut file) {
            Ok(checkpoint) => Ok(SegmentState::Complete(checkpoint)),
            Err(LcrError::IncompleteSegment { .. }) => Ok(SegmentState::InProgress),
            Err(e) => Err(e),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, SegmentState::Complete(_))
    }
}

/// Read and validate the header from the start of `file`
///
/// Leaves the file positioned at the first record frame.
pub(crate) fn read_checkpoint<R: Read>(path: &Path, file: &mut R) -> Result<Position> {
    let mut len_field = [0u8; 4];
    match file.read_exact(&mut len_field) {
        Ok(()) => {}
        // the writer has created the file but not yet reserved the header
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(LcrError::IncompleteSegment {
                path: path.to_path_buf(),
            })
        }
        Err(e) => return Err(e.into()),
    }

    let len = i32::from_be_bytes(len_field);
    if len == 0 {
        return Err(LcrError::IncompleteSegment {
            path: path.to_path_buf(),
        });
    }
    if len < 0 || len as usize > CHECKPOINT_CAPACITY {
        return Err(LcrError::SegmentCorrupted {
            path: path.to_path_buf(),
            reason: format!("invalid checkpoint length: {}", len),
        });
    }

    let mut rest = [0u8; HEADER_SIZE - 4];
    file.read_exact(&mut rest).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => LcrError::SegmentCorrupted {
            path: path.to_path_buf(),
            reason: "header shorter than 70 bytes".to_string(),
        },
        _ => LcrError::Io(e),
    })?;

    let marker_at = END_MARKER_OFFSET - 4;
    let found = [rest[marker_at], rest[marker_at + 1]];
    if found != END_MARKER {
        return Err(LcrError::InvalidEndMarker {
            path: path.to_path_buf(),
            found,
        });
    }

    Ok(Position::new(&rest[..len as usize]))
}

/// Checkpoint area and end marker, as written by the finalize step
pub(crate) fn finalized_body(checkpoint: &Position) -> Result<[u8; HEADER_SIZE - 4]> {
    if checkpoint.is_empty() || checkpoint.len() > CHECKPOINT_CAPACITY {
        return Err(LcrError::Protocol(format!(
            "checkpoint must be 1..={} bytes, got {}",
            CHECKPOINT_CAPACITY,
            checkpoint.len()
        )));
    }

    let mut body = [0u8; HEADER_SIZE - 4];
    body[..checkpoint.len()].copy_from_slice(checkpoint.as_bytes());
    body[END_MARKER_OFFSET - 4..].copy_from_slice(&END_MARKER);
    Ok(body)
}
