//! Codec Module
//!
//! Binary encoding of change records as stored in log segments.
//!
//! ## Stream Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ "ROWLCR" | header | row body           (per record)          │
//! │   [chunk frame]* ... until end_of_row  (if has_chunk_data)   │
//! │ "DDLLCR" | header | schema body                              │
//! │ ...                                                          │
//! │ "EOF"                                  (end of segment)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Header (fixed order, no field names)
//! command type, source database, owner, object name, transaction id,
//! source time (bytes), position (bytes), tag (bytes)
//!
//! ### Row Body by Kind
//! - INSERT:    new columns, has-chunk flag
//! - UPDATE:    new columns, old columns, has-chunk flag
//! - DELETE:    old columns
//! - COMMIT:    empty
//! - LOB WRITE: new columns (always followed by chunks)
//! - LOB ERASE / LOB TRIM: new columns
//!
//! ### Column
//! ```text
//! name | type id | value | encrypted | chunked
//!   [ chunk kind | offset | size | last | empty | end_of_row | xml charset? ]
//! ```
//!
//! Decoding is strict: unknown tags, kinds and type ids, malformed markers and
//! truncated input are all reported as [`LcrError::Corruption`].
//!
//! [`LcrError::Corruption`]: crate::error::LcrError::Corruption

pub mod primitive;
mod record;
mod value;

pub use record::{
    decode_chunk, decode_record, encode_chunk, encode_end_of_segment, encode_record, Frame,
    DDL_TAG, EOF_TAG, ROW_TAG,
};
pub use value::{decode_value, encode_value};
