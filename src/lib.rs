//! # lcrlog
//!
//! A segmented on-disk log for logical change records (LCRs):
//! - Binary codec for row and schema changes, including chunked LOB columns
//! - Segment files with a checkpoint header published only on finalize
//! - Crash-safe progress markers and a backward rescan to resume apply
//! - Capture (upstream → log) and apply (log → downstream) loops
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────┐                          ┌──────────────────┐
//! │     Upstream     │                          │    Downstream    │
//! │ (outbound server)│                          │ (inbound server) │
//! └────────┬─────────┘                          └────────▲─────────┘
//!          │ records, chunks                             │ send, flush
//! ┌────────▼─────────┐                          ┌────────┴─────────┐
//! │     Producer     │                          │     Consumer     │
//! │  batch rotation  │                          │ rescan + replay  │
//! └────────┬─────────┘                          └────────▲─────────┘
//!          │ SegmentWriter                  SegmentReader│
//!          ▼                                             │
//!   ┌───────────────────────────────────────────────────────────┐
//!   │  prefix_1.ext  prefix_2.ext  ...  prefix_N.ext (open)      │
//!   │  [70-byte header: len | checkpoint | end marker][frames]   │
//!   └───────────────────────────────────────────────────────────┘
//!          │                                             │
//!   capture_progress                              apply_progress
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod codec;
pub mod segment;
pub mod checkpoint;
pub mod stream;
pub mod pipeline;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LcrError, Result};
pub use config::{Config, SyncStrategy};
pub use record::{ChangeRecord, ChunkColumn, Position, RowChange, SchemaChange};
pub use segment::{SegmentReader, SegmentWriter};
pub use checkpoint::{find_resume_anchor, ProgressMarker, SegmentSet};
pub use pipeline::{Consumer, LoopState, Producer, RunLimit, RunReport};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of lcrlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
