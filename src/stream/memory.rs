//! In-memory endpoints
//!
//! A scripted upstream and a recording downstream. State lives behind an
//! `Arc<Mutex<_>>` so a handle kept by the caller can inspect what a loop did
//! after the loop has taken ownership of its clone.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{Downstream, DownstreamSession, Received, Upstream, UpstreamSession};
use crate::error::{LcrError, Result};
use crate::record::{ChangeRecord, ChunkColumn, Position};

// =============================================================================
// Upstream
// =============================================================================

/// One step of an upstream script
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Record {
        record: ChangeRecord,
        chunks: Vec<ChunkColumn>,
    },
    BatchEnd,
    /// Break the connection once when reached
    Disconnect,
}

#[derive(Debug, Default)]
struct UpstreamState {
    steps: Vec<ScriptStep>,
    /// Which `Disconnect` steps already fired
    fired: Vec<bool>,
    cursor: usize,
    attach_failures: u32,
    attach_positions: Vec<Option<Position>>,
    reported: Vec<Position>,
    detaches: u32,
}

/// Upstream replaying a fixed script of records and batch boundaries
///
/// Attaching with a last position skips every record at or before it, the
/// way an outbound server resumes after its client reconnects. Once the
/// script is exhausted every receive returns `EndOfStream`.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpstream {
    state: Arc<Mutex<UpstreamState>>,
}

impl MemoryUpstream {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        let fired = vec![false; steps.len()];
        Self {
            state: Arc::new(Mutex::new(UpstreamState {
                steps,
                fired,
                ..UpstreamState::default()
            })),
        }
    }

    /// Make the next `count` attach calls fail
    pub fn fail_attaches(&self, count: u32) {
        self.state.lock().attach_failures = count;
    }

    /// Last positions passed to `attach`, in order
    pub fn attach_positions(&self) -> Vec<Option<Position>> {
        self.state.lock().attach_positions.clone()
    }

    /// Low watermarks reported by the capture loop, in order
    pub fn reported_watermarks(&self) -> Vec<Position> {
        self.state.lock().reported.clone()
    }

    pub fn detach_count(&self) -> u32 {
        self.state.lock().detaches
    }
}

impl Upstream for MemoryUpstream {
    type Session = MemoryUpstreamSession;

    fn attach(
        &mut self,
        endpoint: &str,
        last_position: Option<&Position>,
    ) -> Result<Self::Session> {
        let mut state = self.state.lock();
        state.attach_positions.push(last_position.cloned());

        if state.attach_failures > 0 {
            state.attach_failures -= 1;
            return Err(LcrError::Transport(format!("cannot attach to {}", endpoint)));
        }

        state.cursor = match last_position {
            None => 0,
            Some(last) => state
                .steps
                .iter()
                .position(|step| match step {
                    ScriptStep::Record { record, .. } => {
                        record.position().is_some_and(|p| p > last)
                    }
                    _ => false,
                })
                .unwrap_or(state.steps.len()),
        };
        debug!(endpoint, cursor = state.cursor, "memory upstream attached");

        Ok(MemoryUpstreamSession {
            state: Arc::clone(&self.state),
            pending_chunks: VecDeque::new(),
        })
    }
}

/// Session handed out by [`MemoryUpstream`]
#[derive(Debug)]
pub struct MemoryUpstreamSession {
    state: Arc<Mutex<UpstreamState>>,
    pending_chunks: VecDeque<ChunkColumn>,
}

impl UpstreamSession for MemoryUpstreamSession {
    fn receive_next(&mut self) -> Result<Received> {
        let mut state = self.state.lock();
        let index = state.cursor;
        let Some(step) = state.steps.get(index).cloned() else {
            return Ok(Received::EndOfStream);
        };
        state.cursor += 1;

        match step {
            ScriptStep::Record { record, chunks } => {
                self.pending_chunks = chunks.into();
                Ok(Received::Record(record))
            }
            ScriptStep::BatchEnd => Ok(Received::BatchEnded),
            ScriptStep::Disconnect if !state.fired[index] => {
                state.fired[index] = true;
                Err(LcrError::Transport("outbound connection lost".to_string()))
            }
            ScriptStep::Disconnect => {
                drop(state);
                self.receive_next()
            }
        }
    }

    fn receive_chunk(&mut self) -> Result<ChunkColumn> {
        self.pending_chunks.pop_front().ok_or_else(|| {
            LcrError::Protocol("no chunk pending on the outbound stream".to_string())
        })
    }

    fn report_processed_low_watermark(&mut self, position: &Position) -> Result<()> {
        self.state.lock().reported.push(position.clone());
        Ok(())
    }

    fn detach(self) -> Result<Option<Position>> {
        let mut state = self.state.lock();
        state.detaches += 1;
        Ok(state.reported.last().cloned())
    }
}

// =============================================================================
// Downstream
// =============================================================================

/// What a downstream received, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Record(ChangeRecord),
    Chunk(ChunkColumn),
}

#[derive(Debug, Default)]
struct DownstreamState {
    applied: Vec<Applied>,
    last_sent: Option<Position>,
    low_watermark: Option<Position>,
    attach_failures: u32,
    /// Break the connection once when this many records have been sent
    fail_at_record: Option<usize>,
    records_sent: usize,
    flush_failures: u32,
    flushes: u32,
    attaches: u32,
    detaches: u32,
}

/// Downstream recording everything sent to it
///
/// The low watermark advances to the last sent position on every flush.
#[derive(Debug, Clone, Default)]
pub struct MemoryDownstream {
    state: Arc<Mutex<DownstreamState>>,
}

impl MemoryDownstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a low watermark left by an earlier run
    pub fn with_low_watermark(position: Position) -> Self {
        let downstream = Self::default();
        downstream.state.lock().low_watermark = Some(position);
        downstream
    }

    pub fn fail_attaches(&self, count: u32) {
        self.state.lock().attach_failures = count;
    }

    /// Break the connection once, when the `count`-th record (1-based) is sent
    pub fn fail_at_record(&self, count: usize) {
        self.state.lock().fail_at_record = Some(count);
    }

    /// Make the next `count` flush calls fail
    pub fn fail_flushes(&self, count: u32) {
        self.state.lock().flush_failures = count;
    }

    pub fn applied(&self) -> Vec<Applied> {
        self.state.lock().applied.clone()
    }

    /// Only the records, without chunks
    pub fn applied_records(&self) -> Vec<ChangeRecord> {
        self.state
            .lock()
            .applied
            .iter()
            .filter_map(|applied| match applied {
                Applied::Record(record) => Some(record.clone()),
                Applied::Chunk(_) => None,
            })
            .collect()
    }

    pub fn low_watermark(&self) -> Option<Position> {
        self.state.lock().low_watermark.clone()
    }

    pub fn flush_count(&self) -> u32 {
        self.state.lock().flushes
    }

    pub fn attach_count(&self) -> u32 {
        self.state.lock().attaches
    }

    pub fn detach_count(&self) -> u32 {
        self.state.lock().detaches
    }
}

impl Downstream for MemoryDownstream {
    type Session = MemoryDownstreamSession;

    fn attach(&mut self, endpoint: &str) -> Result<Self::Session> {
        let mut state = self.state.lock();
        if state.attach_failures > 0 {
            state.attach_failures -= 1;
            return Err(LcrError::Transport(format!("cannot attach to {}", endpoint)));
        }
        state.attaches += 1;
        // anything sent but not flushed by an earlier session is lost
        state.last_sent = state.low_watermark.clone();
        debug!(endpoint, "memory downstream attached");

        Ok(MemoryDownstreamSession {
            state: Arc::clone(&self.state),
        })
    }
}

/// Session handed out by [`MemoryDownstream`]
#[derive(Debug)]
pub struct MemoryDownstreamSession {
    state: Arc<Mutex<DownstreamState>>,
}

impl DownstreamSession for MemoryDownstreamSession {
    fn processed_low_watermark(&mut self) -> Result<Option<Position>> {
        Ok(self.state.lock().low_watermark.clone())
    }

    fn send_record(&mut self, record: &ChangeRecord) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_at_record == Some(state.records_sent + 1) {
            state.fail_at_record = None;
            return Err(LcrError::Transport("inbound connection lost".to_string()));
        }
        state.records_sent += 1;
        if let Some(position) = record.position() {
            state.last_sent = Some(position.clone());
        }
        state.applied.push(Applied::Record(record.clone()));
        Ok(())
    }

    fn send_chunk(&mut self, chunk: &ChunkColumn) -> Result<()> {
        self.state.lock().applied.push(Applied::Chunk(chunk.clone()));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.flush_failures > 0 {
            state.flush_failures -= 1;
            return Err(LcrError::Transport("inbound connection lost".to_string()));
        }
        state.flushes += 1;
        state.low_watermark = state.last_sent.clone();
        Ok(())
    }

    fn detach(self) -> Result<Option<Position>> {
        let mut state = self.state.lock();
        state.detaches += 1;
        Ok(state.low_watermark.clone())
    }
}
