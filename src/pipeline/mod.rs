//! Pipeline Module
//!
//! The two loops built on the segment log.
//!
//! ## Responsibilities
//! - `Producer`: upstream → segments, rotating on batch boundaries
//! - `Consumer`: segments → downstream, resuming after the rescan anchor
//! - Bounded attach retries
//!
//! ## Lifecycle
//! ```text
//!   Attaching ──► Streaming ──► Rotating ──┐
//!       │            ▲                     │
//!       │            └─────────────────────┘
//!       ▼
//!   Failed (error)          Detached (limit reached / end of stream)
//! ```
//!
//! Both loops are single-threaded and blocking. All durable state is in the
//! segment files and the progress markers, so either loop can be killed at
//! any point and restarted.

mod consumer;
mod producer;

use std::fs;

use serde::Serialize;
use tracing::warn;

pub use consumer::Consumer;
pub use producer::Producer;

use crate::checkpoint::{ProgressMarker, SegmentSet};
use crate::config::Config;
use crate::error::{LcrError, Result};
use crate::record::Position;

/// Where a loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    Idle,
    Attaching,
    Streaming,
    Rotating,
    Detached,
    Failed,
}

/// When a loop should stop on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLimit {
    /// Until end of stream or a fatal error
    Forever,
    /// After this many segments have been completed
    Segments(u64),
}

impl RunLimit {
    pub fn reached(self, completed: u64) -> bool {
        match self {
            RunLimit::Forever => false,
            RunLimit::Segments(limit) => completed >= limit,
        }
    }
}

/// What a run accomplished
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Segments finalized (producer) or fully applied (consumer)
    pub segments: u64,
    pub records: u64,
    pub chunks: u64,
    /// Last segment completed by this run
    pub last_sequence: Option<u64>,
    /// Checkpoint of that segment
    pub last_checkpoint: Option<Position>,
}

/// State a loop works against: everything it needs, nothing global
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: Config,
    pub segments: SegmentSet,
    pub progress: ProgressMarker,
}

impl PipelineContext {
    /// Context of the capture side, using the capture progress marker
    pub fn for_capture(config: Config) -> Result<Self> {
        let progress = ProgressMarker::new(config.capture_progress_path());
        Self::build(config, progress)
    }

    /// Context of the apply side, using the apply progress marker
    pub fn for_apply(config: Config) -> Result<Self> {
        let progress = ProgressMarker::new(config.apply_progress_path());
        Self::build(config, progress)
    }

    fn build(config: Config, progress: ProgressMarker) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.log_dir)?;
        Ok(Self {
            segments: SegmentSet::from_config(&config),
            progress,
            config,
        })
    }
}

/// Why a streaming phase stopped early
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// Connection lost; detach and attach again
    Reattach(LcrError),
    /// Stop the loop
    Fatal(LcrError),
}

impl From<LcrError> for Interrupt {
    fn from(e: LcrError) -> Self {
        if e.is_transport() {
            Interrupt::Reattach(e)
        } else {
            Interrupt::Fatal(e)
        }
    }
}

/// Attach, retrying transport failures up to `max_attempts` times in a row
pub(crate) fn attach_with_retry<T, F>(endpoint: &str, max_attempts: u32, mut attach: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut failures = 0;
    loop {
        match attach() {
            Ok(session) => return Ok(session),
            Err(e) if e.is_transport() => {
                failures += 1;
                warn!(endpoint, attempt = failures, error = %e, "cannot attach");
                if failures >= max_attempts {
                    return Err(LcrError::AttachRetriesExhausted {
                        endpoint: endpoint.to_string(),
                        attempts: failures,
                    });
                }
            }
            Err(e) => return Err(e),
        }
    }
}
