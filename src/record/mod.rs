//! Change Record Module
//!
//! In-memory model of logical change records (LCRs).
//!
//! ## Shape
//! ```text
//! ChangeRecord
//! ├── Row(RowChange)        header + RowOperation (per-kind body)
//! │     └── ColumnValue     Plain(Column) | Chunked(ChunkColumn)
//! └── Schema(SchemaChange)  header + DDL body
//! ```
//!
//! A row whose `has_chunk_data()` is true is followed in the stream by a run
//! of standalone [`ChunkColumn`]s ending with the one marked `end_of_row`.

mod column;
mod position;

use serde::{Deserialize, Serialize};

pub use column::{
    ChunkColumn, ChunkInfo, ChunkKind, Column, ColumnType, ColumnValue, Datum, LobAmount,
};
pub use position::{compare_positions, Position};

/// Fields shared by row and schema changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub source_database: Option<String>,
    pub object_owner: Option<String>,
    pub object_name: Option<String>,
    pub transaction_id: Option<String>,
    /// Source commit time in the source's fixed binary date format
    pub source_time: Option<Vec<u8>>,
    pub position: Option<Position>,
    pub tag: Option<Vec<u8>>,
}

impl RecordHeader {
    pub fn new(
        source_database: impl Into<String>,
        object_owner: impl Into<String>,
        object_name: impl Into<String>,
    ) -> Self {
        Self {
            source_database: Some(source_database.into()),
            object_owner: Some(object_owner.into()),
            object_name: Some(object_name.into()),
            ..Self::default()
        }
    }

    pub fn with_transaction(mut self, txn: impl Into<String>) -> Self {
        self.transaction_id = Some(txn.into());
        self
    }

    pub fn with_source_time(mut self, time: impl Into<Vec<u8>>) -> Self {
        self.source_time = Some(time.into());
        self
    }

    pub fn with_position(mut self, position: impl Into<Position>) -> Self {
        self.position = Some(position.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<Vec<u8>>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Row operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowKind {
    Insert,
    Update,
    Delete,
    Commit,
    LobWrite,
    LobErase,
    LobTrim,
}

impl RowKind {
    pub const ALL: [RowKind; 7] = [
        RowKind::Insert,
        RowKind::Update,
        RowKind::Delete,
        RowKind::Commit,
        RowKind::LobWrite,
        RowKind::LobErase,
        RowKind::LobTrim,
    ];

    /// Command type string as stored in the log
    pub fn as_str(self) -> &'static str {
        match self {
            RowKind::Insert => "INSERT",
            RowKind::Update => "UPDATE",
            RowKind::Delete => "DELETE",
            RowKind::Commit => "COMMIT",
            RowKind::LobWrite => "LOB WRITE",
            RowKind::LobErase => "LOB ERASE",
            RowKind::LobTrim => "LOB TRIM",
        }
    }

    pub fn parse(command: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == command)
    }
}

/// Body of a row change, by kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOperation {
    Insert {
        new_values: Vec<ColumnValue>,
        has_chunk_data: bool,
    },
    Update {
        new_values: Vec<ColumnValue>,
        old_values: Vec<ColumnValue>,
        has_chunk_data: bool,
    },
    Delete {
        old_values: Vec<ColumnValue>,
    },
    Commit,
    /// Always followed by chunk data
    LobWrite {
        new_values: Vec<ColumnValue>,
    },
    LobErase {
        new_values: Vec<ColumnValue>,
    },
    LobTrim {
        new_values: Vec<ColumnValue>,
    },
}

impl RowOperation {
    pub fn kind(&self) -> RowKind {
        match self {
            RowOperation::Insert { .. } => RowKind::Insert,
            RowOperation::Update { .. } => RowKind::Update,
            RowOperation::Delete { .. } => RowKind::Delete,
            RowOperation::Commit => RowKind::Commit,
            RowOperation::LobWrite { .. } => RowKind::LobWrite,
            RowOperation::LobErase { .. } => RowKind::LobErase,
            RowOperation::LobTrim { .. } => RowKind::LobTrim,
        }
    }

    pub fn has_chunk_data(&self) -> bool {
        match self {
            RowOperation::Insert { has_chunk_data, .. }
            | RowOperation::Update { has_chunk_data, .. } => *has_chunk_data,
            RowOperation::LobWrite { .. } => true,
            _ => false,
        }
    }

    pub fn new_values(&self) -> &[ColumnValue] {
        match self {
            RowOperation::Insert { new_values, .. }
            | RowOperation::Update { new_values, .. }
            | RowOperation::LobWrite { new_values }
            | RowOperation::LobErase { new_values }
            | RowOperation::LobTrim { new_values } => new_values,
            RowOperation::Delete { .. } | RowOperation::Commit => &[],
        }
    }

    pub fn old_values(&self) -> &[ColumnValue] {
        match self {
            RowOperation::Update { old_values, .. } | RowOperation::Delete { old_values } => {
                old_values
            }
            _ => &[],
        }
    }
}

/// A row-level change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChange {
    pub header: RecordHeader,
    pub operation: RowOperation,
}

impl RowChange {
    pub fn new(header: RecordHeader, operation: RowOperation) -> Self {
        Self { header, operation }
    }

    pub fn kind(&self) -> RowKind {
        self.operation.kind()
    }

    pub fn has_chunk_data(&self) -> bool {
        self.operation.has_chunk_data()
    }
}

/// A schema-level (DDL) change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    /// DDL command type, e.g. `CREATE TABLE`
    pub command: Option<String>,
    pub header: RecordHeader,
    pub object_type: Option<String>,
    pub ddl_text: Option<String>,
    pub current_schema: Option<String>,
    pub logon_user: Option<String>,
    pub base_table_owner: Option<String>,
    pub base_table_name: Option<String>,
}

impl SchemaChange {
    pub fn new(
        command: impl Into<String>,
        header: RecordHeader,
        ddl_text: impl Into<String>,
    ) -> Self {
        Self {
            command: Some(command.into()),
            header,
            object_type: None,
            ddl_text: Some(ddl_text.into()),
            current_schema: None,
            logon_user: None,
            base_table_owner: None,
            base_table_name: None,
        }
    }
}

/// A single logical change record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeRecord {
    Row(RowChange),
    Schema(SchemaChange),
}

impl ChangeRecord {
    pub fn header(&self) -> &RecordHeader {
        match self {
            ChangeRecord::Row(row) => &row.header,
            ChangeRecord::Schema(ddl) => &ddl.header,
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.header().position.as_ref()
    }

    /// Chunk frames follow this record in the stream
    pub fn has_chunk_data(&self) -> bool {
        match self {
            ChangeRecord::Row(row) => row.has_chunk_data(),
            ChangeRecord::Schema(_) => false,
        }
    }

    /// Short description for logs: `INSERT HR.EMPLOYEES`
    pub fn describe(&self) -> String {
        let header = self.header();
        let command = match self {
            ChangeRecord::Row(row) => row.kind().as_str().to_string(),
            ChangeRecord::Schema(ddl) => ddl.command.clone().unwrap_or_else(|| "DDL".to_string()),
        };
        format!(
            "{} {}.{}",
            command,
            header.object_owner.as_deref().unwrap_or("?"),
            header.object_name.as_deref().unwrap_or("?")
        )
    }
}

impl From<RowChange> for ChangeRecord {
    fn from(row: RowChange) -> Self {
        ChangeRecord::Row(row)
    }
}

impl From<SchemaChange> for ChangeRecord {
    fn from(ddl: SchemaChange) -> Self {
        ChangeRecord::Schema(ddl)
    }
}
