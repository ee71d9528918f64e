//! Segment Module
//!
//! One rotated log file holding a contiguous run of records plus the
//! checkpoint published when it was finalized.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Header (70 bytes)                                       │
//! │   CheckpointLen: i32 BE (4)   0 while in progress       │
//! │   Checkpoint: left-justified, zero-padded (64)          │
//! │   EndMarker: "Y\0" once finalized (2)                   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Record frames (see codec)                               │
//! │   ... each record followed by its chunk frames ...      │
//! ├─────────────────────────────────────────────────────────┤
//! │ "EOF" frame                                             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Files are named `<prefix>_<sequence>.<ext>` with sequences starting at 1.

mod chunks;
mod header;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

use serde::Serialize;

pub use header::{SegmentState, CHECKPOINT_CAPACITY, END_MARKER, END_MARKER_OFFSET, HEADER_SIZE};
pub use reader::{LoggedChange, SegmentEntries, SegmentReader};
pub use writer::SegmentWriter;

use crate::record::Position;

/// What a writer left behind when it closed a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentSummary {
    pub path: PathBuf,
    /// `None` when the segment was abandoned unfinalized
    pub checkpoint: Option<Position>,
    pub records: u64,
    pub chunks: u64,
    /// File size in bytes
    pub size: u64,
}

/// File name of segment `sequence`: `"archive", 42, "lcr"` → `archive_42.lcr`
pub fn segment_file_name(prefix: &str, sequence: u64, extension: &str) -> String {
    format!("{}_{}.{}", prefix, sequence, extension)
}

/// Parse the sequence out of a segment file name
/// `"archive_42.lcr"` → `Some(42)`
pub fn parse_segment_sequence(path: &Path, prefix: &str, extension: &str) -> Option<u64> {
    if path.extension()?.to_str()? != extension {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(prefix)?.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|&sequence| sequence > 0)
}
