//! Segment Writer
//!
//! Appends records to a new segment and finalizes it with a checkpoint.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::{debug, trace};

use super::chunks::ChunkTracker;
use super::header::{finalized_body, HEADER_SIZE};
use super::SegmentSummary;
use crate::codec::{encode_chunk, encode_end_of_segment, encode_record};
use crate::config::SyncStrategy;
use crate::error::{LcrError, Result};
use crate::record::{ChangeRecord, ChunkColumn, Position};

/// Writes one segment; exclusively owns the file until finished
pub struct SegmentWriter {
    /// Output file path
    path: PathBuf,
    /// Buffered writer, flushed after every frame
    writer: BufWriter<File>,
    sync_strategy: SyncStrategy,
    /// Scratch buffer reused for every frame
    frame: BytesMut,
    chunks: ChunkTracker,
    records_written: u64,
    chunks_written: u64,
    /// Position of the last record carrying one
    last_position: Option<Position>,
}

impl SegmentWriter {
    /// Create (or truncate) a segment and reserve its zero-filled header
    pub fn create(path: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(&[0u8; HEADER_SIZE])?;
        writer.flush()?;
        if sync_strategy == SyncStrategy::Always {
            writer.get_ref().sync_data()?;
        }

        debug!(path = %path.display(), "created segment");

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            sync_strategy,
            frame: BytesMut::with_capacity(4096),
            chunks: ChunkTracker::default(),
            records_written: 0,
            chunks_written: 0,
            last_position: None,
        })
    }

    /// Append a record
    ///
    /// If the record has chunk data, its chunks must be appended next.
    pub fn append_record(&mut self, record: &ChangeRecord) -> Result<()> {
        self.frame.clear();
        encode_record(&mut self.frame, record)?;
        self.chunks.begin_record(record)?;
        self.write_frame()?;

        self.records_written += 1;
        if let Some(position) = record.position() {
            self.last_position = Some(position.clone());
        }
        trace!(record = %record.describe(), "appended record");
        Ok(())
    }

    /// Append one chunk of the current row
    pub fn append_chunk(&mut self, chunk: &ChunkColumn) -> Result<()> {
        self.frame.clear();
        encode_chunk(&mut self.frame, chunk)?;
        self.chunks.accept_chunk(chunk)?;
        self.write_frame()?;

        self.chunks_written += 1;
        trace!(column = chunk.name(), end_of_row = chunk.is_end_of_row(), "appended chunk");
        Ok(())
    }

    /// Close the record stream and publish `checkpoint` in the header
    ///
    /// The checkpoint bytes and end marker land before the length field, so a
    /// crash at any point leaves the length either zero or complete.
    pub fn finish(mut self, checkpoint: &Position) -> Result<SegmentSummary> {
        if self.chunks.is_pending() {
            return Err(LcrError::Protocol(format!(
                "cannot finalize {} while a chunk run is open",
                self.path.display()
            )));
        }
        let body = finalized_body(checkpoint)?;

        self.write_end_of_segment()?;
        let mut file = self.writer.into_inner().map_err(|e| LcrError::Io(e.into_error()))?;
        file.sync_all()?;

        file.seek(SeekFrom::Start(4))?;
        file.write_all(&body)?;
        file.sync_data()?;

        file.seek(SeekFrom::Start(0))?;
        file.write_all(&(checkpoint.len() as i32).to_be_bytes())?;
        file.sync_all()?;

        let size = file.metadata()?.len();
        debug!(
            path = %self.path.display(),
            checkpoint = %checkpoint,
            records = self.records_written,
            chunks = self.chunks_written,
            "finalized segment"
        );

        Ok(SegmentSummary {
            path: self.path,
            checkpoint: Some(checkpoint.clone()),
            records: self.records_written,
            chunks: self.chunks_written,
            size,
        })
    }

    /// Close the record stream without finalizing
    ///
    /// The header stays zero, so readers keep treating the segment as in
    /// progress and the next writer for this sequence replaces it.
    pub fn abandon(mut self) -> Result<SegmentSummary> {
        self.write_end_of_segment()?;
        let file = self.writer.into_inner().map_err(|e| LcrError::Io(e.into_error()))?;
        file.sync_all()?;
        let size = file.metadata()?.len();

        debug!(path = %self.path.display(), records = self.records_written, "abandoned segment");

        Ok(SegmentSummary {
            path: self.path,
            checkpoint: None,
            records: self.records_written,
            chunks: self.chunks_written,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Position of the last appended record that carried one
    pub fn last_position(&self) -> Option<&Position> {
        self.last_position.as_ref()
    }

    fn write_end_of_segment(&mut self) -> Result<()> {
        self.frame.clear();
        encode_end_of_segment(&mut self.frame)?;
        self.writer.write_all(&self.frame)?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_frame(&mut self) -> Result<()> {
        self.writer.write_all(&self.frame)?;
        self.writer.flush()?;
        if self.sync_strategy == SyncStrategy::Always {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}
