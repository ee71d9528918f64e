//! Column values
//!
//! A column is either plain or a piece of a large object streamed in chunks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LcrError, Result};

/// Scalar kinds a column can hold, with their on-disk ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ColumnType {
    Char = 1,
    Number = 2,
    Date = 3,
    Raw = 4,
    Timestamp = 5,
    TimestampTz = 6,
    TimestampLtz = 7,
    IntervalYm = 8,
    IntervalDs = 9,
    BinaryFloat = 10,
    BinaryDouble = 11,
}

impl ColumnType {
    pub const ALL: [ColumnType; 11] = [
        ColumnType::Char,
        ColumnType::Number,
        ColumnType::Date,
        ColumnType::Raw,
        ColumnType::Timestamp,
        ColumnType::TimestampTz,
        ColumnType::TimestampLtz,
        ColumnType::IntervalYm,
        ColumnType::IntervalDs,
        ColumnType::BinaryFloat,
        ColumnType::BinaryDouble,
    ];

    pub fn id(self) -> i32 {
        self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    /// Character columns carry a charset id and text; everything else is an
    /// opaque blob.
    pub fn is_character(self) -> bool {
        matches!(self, ColumnType::Char)
    }
}

/// Non-null column payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datum {
    /// Character data with its character set
    Char { charset_id: i32, text: String },

    /// Internal representation of numbers, dates, timestamps, intervals,
    /// raw and binary float/double values
    Bytes(Vec<u8>),
}

impl Datum {
    pub fn text(charset_id: i32, text: impl Into<String>) -> Self {
        Datum::Char {
            charset_id,
            text: text.into(),
        }
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Datum::Bytes(bytes.into())
    }

    /// Whether this payload shape is legal for `column_type`
    pub fn fits(&self, column_type: ColumnType) -> bool {
        matches!(self, Datum::Char { .. }) == column_type.is_character()
    }
}

/// A single column of a row change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// `None` is SQL NULL
    pub data: Option<Datum>,
    /// Column is stored encrypted at the source
    pub encrypted: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, data: Option<Datum>) -> Self {
        Self {
            name: name.into(),
            column_type,
            data,
            encrypted: false,
        }
    }

    pub fn null(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self::new(name, column_type, None)
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match &self.data {
            Some(datum) if !datum.fits(self.column_type) => Err(LcrError::Protocol(format!(
                "column {} of type {:?} carries a mismatched datum",
                self.name, self.column_type
            ))),
            _ => Ok(()),
        }
    }
}

/// Kind of large object a chunk belongs to, with on-disk ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkKind {
    Blob,
    Clob,
    Nclob,
    Long,
    LongRaw,
    /// XML documents also record the character set of the text
    XmlType { charset_id: i32 },
}

impl ChunkKind {
    pub const XMLTYPE_ID: i32 = 6;

    pub fn id(self) -> i32 {
        match self {
            ChunkKind::Blob => 1,
            ChunkKind::Clob => 2,
            ChunkKind::Nclob => 3,
            ChunkKind::Long => 4,
            ChunkKind::LongRaw => 5,
            ChunkKind::XmlType { .. } => Self::XMLTYPE_ID,
        }
    }

    /// Resolve every kind but XMLTYPE, whose charset follows later on disk
    pub fn from_plain_id(id: i32) -> Option<Self> {
        match id {
            1 => Some(ChunkKind::Blob),
            2 => Some(ChunkKind::Clob),
            3 => Some(ChunkKind::Nclob),
            4 => Some(ChunkKind::Long),
            5 => Some(ChunkKind::LongRaw),
            _ => None,
        }
    }
}

/// Arbitrary-precision integer used for LOB offsets and operation sizes
///
/// Held as its canonical decimal rendering; it is only ever carried through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LobAmount(String);

impl LobAmount {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LobAmount {
    type Err = LcrError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        let canonical = !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && (digits == "0" || !digits.starts_with('0'))
            && s != "-0";
        if !canonical {
            return Err(LcrError::Corruption(format!("invalid LOB amount: {:?}", s)));
        }
        Ok(LobAmount(s.to_string()))
    }
}

impl From<u64> for LobAmount {
    fn from(value: u64) -> Self {
        LobAmount(value.to_string())
    }
}

impl From<i64> for LobAmount {
    fn from(value: i64) -> Self {
        LobAmount(value.to_string())
    }
}

impl fmt::Display for LobAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chunk bookkeeping attached to a chunked column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub kind: ChunkKind,
    pub offset: Option<LobAmount>,
    pub operation_size: Option<LobAmount>,
    /// Last chunk of this column
    pub last_chunk: bool,
    pub empty_chunk: bool,
    /// Last chunk of the whole row
    pub end_of_row: bool,
}

impl ChunkInfo {
    pub fn new(kind: ChunkKind) -> Self {
        Self {
            kind,
            offset: None,
            operation_size: None,
            last_chunk: false,
            empty_chunk: false,
            end_of_row: false,
        }
    }
}

/// A column carrying one chunk of large-object data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkColumn {
    pub column: Column,
    pub chunk: ChunkInfo,
}

impl ChunkColumn {
    pub fn new(column: Column, chunk: ChunkInfo) -> Self {
        Self { column, chunk }
    }

    pub fn name(&self) -> &str {
        &self.column.name
    }

    pub fn is_end_of_row(&self) -> bool {
        self.chunk.end_of_row
    }
}

/// Column in a row change's old or new value list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnValue {
    Plain(Column),
    Chunked(ChunkColumn),
}

impl ColumnValue {
    pub fn column(&self) -> &Column {
        match self {
            ColumnValue::Plain(column) => column,
            ColumnValue::Chunked(chunked) => &chunked.column,
        }
    }

    pub fn name(&self) -> &str {
        &self.column().name
    }
}

impl From<Column> for ColumnValue {
    fn from(column: Column) -> Self {
        ColumnValue::Plain(column)
    }
}

impl From<ChunkColumn> for ColumnValue {
    fn from(chunk: ChunkColumn) -> Self {
        ColumnValue::Chunked(chunk)
    }
}
