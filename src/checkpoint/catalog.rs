//! Segment catalog
//!
//! Maps sequence numbers to segment files in one directory and waits for
//! segments that are not ready yet.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{LcrError, Result};
use crate::record::Position;
use crate::segment::{parse_segment_sequence, segment_file_name, SegmentReader, SegmentState};

/// The segments sharing one directory, prefix and extension
#[derive(Debug, Clone)]
pub struct SegmentSet {
    dir: PathBuf,
    prefix: String,
    extension: String,
}

impl SegmentSet {
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.log_dir, &config.prefix, &config.extension)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of segment `sequence`
    pub fn path(&self, sequence: u64) -> PathBuf {
        self.dir
            .join(segment_file_name(&self.prefix, sequence, &self.extension))
    }

    /// Header state of segment `sequence`
    pub fn state(&self, sequence: u64) -> Result<SegmentState> {
        SegmentState::probe(&self.path(sequence))
    }

    /// Checkpoint of a segment that must already be finalized
    pub fn checkpoint(&self, sequence: u64) -> Result<Position> {
        let path = self.path(sequence);
        match SegmentState::probe(&path)? {
            SegmentState::Complete(checkpoint) => Ok(checkpoint),
            SegmentState::InProgress => Err(LcrError::IncompleteSegment { path }),
            SegmentState::Missing => Err(LcrError::SegmentCorrupted {
                path,
                reason: "segment recorded as finalized is missing".to_string(),
            }),
        }
    }

    /// Sequences of all segment files present, ascending
    pub fn sequences(&self) -> Result<Vec<u64>> {
        let mut sequences = Vec::new();
        if !self.dir.exists() {
            return Ok(sequences);
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if let Some(sequence) = parse_segment_sequence(&path, &self.prefix, &self.extension) {
                sequences.push(sequence);
            }
        }
        sequences.sort_unstable();
        Ok(sequences)
    }

    /// Block until segment `sequence` is finalized, then open it
    ///
    /// Sleeps `poll` between attempts and calls `probe` after each sleep; an
    /// error from `probe` (typically a broken downstream connection) ends the
    /// wait.
    pub fn wait_for_complete<P>(
        &self,
        sequence: u64,
        poll: Duration,
        mut probe: P,
    ) -> Result<SegmentReader>
    where
        P: FnMut() -> Result<()>,
    {
        let path = self.path(sequence);
        loop {
            match SegmentState::probe(&path)? {
                SegmentState::Complete(_) => return SegmentReader::open(&path),
                SegmentState::Missing => {
                    info!(path = %path.display(), "waiting for segment");
                }
                SegmentState::InProgress => {
                    info!(path = %path.display(), "waiting for segment to be completed");
                }
            }

            std::thread::sleep(poll);
            probe().map_err(|e| {
                warn!(path = %path.display(), error = %e, "connection check failed while waiting");
                e
            })?;
        }
    }
}
