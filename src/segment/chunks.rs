//! Chunk run bookkeeping
//!
//! A row with chunk data is followed by chunk frames until one is marked
//! `end_of_row`. Chunks of one column stay contiguous until that column's
//! `last_chunk`.

use crate::error::{LcrError, Result};
use crate::record::{ChangeRecord, ChunkColumn};

#[derive(Debug, Default)]
pub(crate) struct ChunkTracker {
    pending: bool,
    /// Column whose chunk run has started but not reached `last_chunk`
    open_column: Option<String>,
}

impl ChunkTracker {
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn begin_record(&mut self, record: &ChangeRecord) -> Result<()> {
        if self.pending {
            return Err(LcrError::Protocol(
                "record started before the previous row's chunks reached end of row".to_string(),
            ));
        }
        self.pending = record.has_chunk_data();
        self.open_column = None;
        Ok(())
    }

    pub fn accept_chunk(&mut self, chunk: &ChunkColumn) -> Result<()> {
        if !self.pending {
            return Err(LcrError::Protocol(format!(
                "chunk for column {} without a preceding row carrying chunk data",
                chunk.name()
            )));
        }
        if let Some(open) = &self.open_column {
            if open != chunk.name() {
                return Err(LcrError::Protocol(format!(
                    "chunk for column {} interleaved with unfinished column {}",
                    chunk.name(),
                    open
                )));
            }
        }

        if chunk.chunk.end_of_row {
            self.pending = false;
            self.open_column = None;
        } else if chunk.chunk.last_chunk {
            self.open_column = None;
        } else {
            self.open_column = Some(chunk.name().to_string());
        }
        Ok(())
    }
}
