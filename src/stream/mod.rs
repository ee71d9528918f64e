//! Stream Module
//!
//! The endpoints on either side of the log: an upstream (outbound) server
//! that produces change records and a downstream (inbound) server that
//! applies them. Only their result and error shapes matter here; connection
//! handling belongs to the implementations.
//!
//! A broken connection is reported as [`LcrError::Transport`]; the loops
//! react by detaching and attaching again.
//!
//! [`LcrError::Transport`]: crate::error::LcrError::Transport

pub mod memory;

use crate::error::Result;
use crate::record::{ChangeRecord, ChunkColumn, Position};

/// Outcome of one receive call on the upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A record; if it has chunk data, its chunks follow via `receive_chunk`
    Record(ChangeRecord),
    /// The current batch is over
    BatchEnded,
    /// The upstream has shut down and will send nothing more
    EndOfStream,
}

/// Something a capture loop can attach to
pub trait Upstream {
    type Session: UpstreamSession;

    /// Attach, asking for records after `last_position` (from the start of
    /// the stream when `None`)
    fn attach(&mut self, endpoint: &str, last_position: Option<&Position>) -> Result<Self::Session>;
}

/// An attached upstream connection
pub trait UpstreamSession {
    /// Block until the next record or batch boundary
    fn receive_next(&mut self) -> Result<Received>;

    /// Next chunk of the record just received
    fn receive_chunk(&mut self) -> Result<ChunkColumn>;

    /// Tell the upstream everything up to `position` is durably captured
    fn report_processed_low_watermark(&mut self, position: &Position) -> Result<()>;

    /// Detach, returning the upstream's final processed position
    fn detach(self) -> Result<Option<Position>>;
}

/// Something an apply loop can attach to
pub trait Downstream {
    type Session: DownstreamSession;

    fn attach(&mut self, endpoint: &str) -> Result<Self::Session>;
}

/// An attached downstream connection
pub trait DownstreamSession {
    /// Position up to which the downstream has durably applied records
    fn processed_low_watermark(&mut self) -> Result<Option<Position>>;

    fn send_record(&mut self, record: &ChangeRecord) -> Result<()>;

    fn send_chunk(&mut self, chunk: &ChunkColumn) -> Result<()>;

    /// Push everything sent so far; also a no-op liveness check
    fn flush(&mut self) -> Result<()>;

    /// Detach, returning the downstream's final processed position
    fn detach(self) -> Result<Option<Position>>;
}
