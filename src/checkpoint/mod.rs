//! Checkpoint Module
//!
//! Durable progress tracking across segments.
//!
//! ## Responsibilities
//! - Name, discover and probe segments (`SegmentSet`)
//! - Persist the last fully processed segment (`ProgressMarker`)
//! - Pick the resume point after a crash (`find_resume_anchor`)
//!
//! ## Recovery Model
//! ```text
//!  capture_progress = S          apply_progress = A
//!  ┌────┐┌────┐┌────┐┌────┐┌──────────┐
//!  │ 1  ││ 2  ││ .. ││ S  ││ S+1 (wr) │   header len 0 until finalized
//!  └────┘└────┘└────┘└────┘└──────────┘
//!            ▲
//!            └── newest segment with checkpoint <= downstream lwm,
//!                found by scanning back from A; apply resumes after it
//! ```

mod catalog;
mod progress;
mod rescan;

pub use catalog::SegmentSet;
pub use progress::ProgressMarker;
pub use rescan::find_resume_anchor;

pub use crate::record::compare_positions;
