//! Segment Reader
//!
//! Replays the records of a finalized segment in order.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, trace};

use super::chunks::ChunkTracker;
use super::header::read_checkpoint;
use crate::codec::{decode_chunk, decode_record, Frame};
use crate::error::{LcrError, Result};
use crate::record::{ChangeRecord, ChunkColumn, Position};

/// Sequential reader over one finalized segment
///
/// Never moves on to another file: once the end-of-segment frame has been
/// read, `read_record` keeps returning `None`.
pub struct SegmentReader {
    path: PathBuf,
    reader: BufReader<File>,
    checkpoint: Position,
    chunks: ChunkTracker,
    finished: bool,
    records_read: u64,
    chunks_read: u64,
}

impl SegmentReader {
    /// Open a segment for replay
    ///
    /// Fails with `IncompleteSegment` while the writer has not finalized it,
    /// and with `InvalidEndMarker` if the header was not properly sealed.
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let checkpoint = read_checkpoint(path, &mut reader)?;

        debug!(path = %path.display(), checkpoint = %checkpoint, "opened segment");

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            checkpoint,
            chunks: ChunkTracker::default(),
            finished: false,
            records_read: 0,
            chunks_read: 0,
        })
    }

    /// Checkpoint the writer published when finalizing
    pub fn checkpoint(&self) -> &Position {
        &self.checkpoint
    }

    /// Next record, or `None` at the end of the segment
    pub fn read_record(&mut self) -> Result<Option<ChangeRecord>> {
        if self.finished {
            return Ok(None);
        }
        if self.chunks.is_pending() {
            return Err(LcrError::Protocol(format!(
                "chunks of the previous record in {} have not been read",
                self.path.display()
            )));
        }

        match decode_record(&mut self.reader).map_err(|e| e.in_segment(&self.path))? {
            Frame::EndOfSegment => {
                self.finished = true;
                debug!(
                    path = %self.path.display(),
                    records = self.records_read,
                    chunks = self.chunks_read,
                    "reached end of segment"
                );
                Ok(None)
            }
            Frame::Record(record) => {
                self.chunks.begin_record(&record)?;
                self.records_read += 1;
                trace!(record = %record.describe(), "read record");
                Ok(Some(record))
            }
        }
    }

    /// Next chunk of the row just read
    ///
    /// Only valid after a record with chunk data, until a chunk marked end of
    /// row has been returned.
    pub fn read_chunk(&mut self) -> Result<ChunkColumn> {
        if !self.chunks.is_pending() {
            return Err(LcrError::Protocol(format!(
                "no chunk data expected in {}",
                self.path.display()
            )));
        }

        let chunk = decode_chunk(&mut self.reader).map_err(|e| e.in_segment(&self.path))?;
        self.chunks.accept_chunk(&chunk).map_err(|e| match e {
            LcrError::Protocol(reason) => LcrError::SegmentCorrupted {
                path: self.path.clone(),
                reason,
            },
            other => other,
        })?;
        self.chunks_read += 1;
        Ok(chunk)
    }

    /// Iterate over the remaining records, each with its chunk run
    pub fn entries(self) -> SegmentEntries {
        SegmentEntries {
            reader: self,
            failed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }
}

/// A record together with the chunks that followed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedChange {
    pub record: ChangeRecord,
    pub chunks: Vec<ChunkColumn>,
}

/// Iterator over the entries of a segment
pub struct SegmentEntries {
    reader: SegmentReader,
    failed: bool,
}

impl SegmentEntries {
    fn next_entry(&mut self) -> Result<Option<LoggedChange>> {
        let Some(record) = self.reader.read_record()? else {
            return Ok(None);
        };

        let mut chunks = Vec::new();
        if record.has_chunk_data() {
            loop {
                let chunk = self.reader.read_chunk()?;
                let done = chunk.is_end_of_row();
                chunks.push(chunk);
                if done {
                    break;
                }
            }
        }
        Ok(Some(LoggedChange { record, chunks }))
    }
}

impl Iterator for SegmentEntries {
    type Item = Result<LoggedChange>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
