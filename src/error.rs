//! Error types for lcrlog
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using LcrError
pub type Result<T> = std::result::Result<T, LcrError>;

/// Unified error type for lcrlog operations
#[derive(Debug, Error)]
pub enum LcrError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Giving up on endpoint {endpoint} after {attempts} attach attempts")]
    AttachRetriesExhausted { endpoint: String, attempts: u32 },

    // -------------------------------------------------------------------------
    // Corruption Errors
    // -------------------------------------------------------------------------
    #[error("Corrupted record stream: {0}")]
    Corruption(String),

    #[error("Corrupted segment {}: {reason}", path.display())]
    SegmentCorrupted { path: PathBuf, reason: String },

    #[error("Invalid checkpoint in {}: segment is still in progress", path.display())]
    IncompleteSegment { path: PathBuf },

    #[error("Invalid end marker in {}: {found:02x?}", path.display())]
    InvalidEndMarker { path: PathBuf, found: [u8; 2] },

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol violation: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LcrError {
    /// True when the upstream or downstream connection is broken
    pub fn is_transport(&self) -> bool {
        matches!(self, LcrError::Transport(_))
    }

    /// True for every flavor of on-disk or in-stream corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            LcrError::Corruption(_)
                | LcrError::SegmentCorrupted { .. }
                | LcrError::IncompleteSegment { .. }
                | LcrError::InvalidEndMarker { .. }
        )
    }

    /// Attribute a stream-level error to the segment file it was read from.
    ///
    /// Truncated reads count as corruption: a frame that declares more bytes
    /// than the file holds is never a transient condition.
    pub(crate) fn in_segment(self, path: &std::path::Path) -> Self {
        match self {
            LcrError::Corruption(reason) => LcrError::SegmentCorrupted {
                path: path.to_path_buf(),
                reason,
            },
            LcrError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                LcrError::SegmentCorrupted {
                    path: path.to_path_buf(),
                    reason: format!("truncated frame: {}", e),
                }
            }
            other => other,
        }
    }
}
