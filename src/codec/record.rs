//! Record codec
//!
//! Frames whole change records, standalone chunks and the end-of-segment
//! sentinel on top of the primitive and value encodings.

use std::io::Read;

use bytes::BytesMut;
use tracing::trace;

use super::primitive::{
    put_bytes, put_flag, put_i32, put_string, read_bytes, read_flag, read_i32, read_string,
};
use super::value::{decode_value, encode_value};
use crate::error::{LcrError, Result};
use crate::record::{
    ChangeRecord, ChunkColumn, ChunkInfo, ChunkKind, Column, ColumnType, ColumnValue, LobAmount,
    Position, RecordHeader, RowChange, RowKind, RowOperation, SchemaChange,
};

/// Tag in front of a row change
pub const ROW_TAG: &str = "ROWLCR";

/// Tag in front of a schema change
pub const DDL_TAG: &str = "DDLLCR";

/// Tag marking the end of the records in a segment
pub const EOF_TAG: &str = "EOF";

/// Stand-in for an absent LOB offset or size
const NULL_AMOUNT: &str = "NULL";

/// A decoded top-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Record(ChangeRecord),
    EndOfSegment,
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a record with its frame tag
pub fn encode_record(buf: &mut BytesMut, record: &ChangeRecord) -> Result<()> {
    match record {
        ChangeRecord::Row(row) => {
            trace!(kind = row.kind().as_str(), "encoding row record");
            put_string(buf, Some(ROW_TAG))?;
            encode_header(buf, Some(row.kind().as_str()), &row.header)?;
            encode_row_body(buf, &row.operation)
        }
        ChangeRecord::Schema(ddl) => {
            trace!(command = ?ddl.command, "encoding schema record");
            put_string(buf, Some(DDL_TAG))?;
            encode_header(buf, ddl.command.as_deref(), &ddl.header)?;
            for field in [
                &ddl.object_type,
                &ddl.ddl_text,
                &ddl.current_schema,
                &ddl.logon_user,
                &ddl.base_table_owner,
                &ddl.base_table_name,
            ] {
                put_string(buf, field.as_deref())?;
            }
            Ok(())
        }
    }
}

/// Encode the sentinel closing a segment
pub fn encode_end_of_segment(buf: &mut BytesMut) -> Result<()> {
    put_string(buf, Some(EOF_TAG))
}

/// Encode a standalone chunk frame
pub fn encode_chunk(buf: &mut BytesMut, chunk: &ChunkColumn) -> Result<()> {
    encode_column_prefix(buf, &chunk.column)?;
    encode_chunk_info(buf, &chunk.chunk)
}

fn encode_header(buf: &mut BytesMut, command: Option<&str>, header: &RecordHeader) -> Result<()> {
    put_string(buf, command)?;
    put_string(buf, header.source_database.as_deref())?;
    put_string(buf, header.object_owner.as_deref())?;
    put_string(buf, header.object_name.as_deref())?;
    put_string(buf, header.transaction_id.as_deref())?;
    put_bytes(buf, header.source_time.as_deref())?;
    put_bytes(buf, header.position.as_ref().map(Position::as_bytes))?;
    put_bytes(buf, header.tag.as_deref())
}

fn encode_row_body(buf: &mut BytesMut, operation: &RowOperation) -> Result<()> {
    match operation {
        RowOperation::Insert {
            new_values,
            has_chunk_data,
        } => {
            encode_column_list(buf, new_values)?;
            put_flag(buf, *has_chunk_data);
        }
        RowOperation::Update {
            new_values,
            old_values,
            has_chunk_data,
        } => {
            encode_column_list(buf, new_values)?;
            encode_column_list(buf, old_values)?;
            put_flag(buf, *has_chunk_data);
        }
        RowOperation::Delete { old_values } => encode_column_list(buf, old_values)?,
        RowOperation::Commit => {}
        RowOperation::LobWrite { new_values }
        | RowOperation::LobErase { new_values }
        | RowOperation::LobTrim { new_values } => encode_column_list(buf, new_values)?,
    }
    Ok(())
}

fn encode_column_list(buf: &mut BytesMut, columns: &[ColumnValue]) -> Result<()> {
    let count = i32::try_from(columns.len())
        .map_err(|_| LcrError::Protocol(format!("too many columns: {}", columns.len())))?;
    put_i32(buf, count);

    for value in columns {
        match value {
            ColumnValue::Plain(column) => {
                encode_column_prefix(buf, column)?;
                put_flag(buf, false);
            }
            ColumnValue::Chunked(chunked) => {
                encode_column_prefix(buf, &chunked.column)?;
                put_flag(buf, true);
                encode_chunk_info(buf, &chunked.chunk)?;
            }
        }
    }
    Ok(())
}

/// name, type id, value, encrypted flag
fn encode_column_prefix(buf: &mut BytesMut, column: &Column) -> Result<()> {
    column.validate()?;
    put_string(buf, Some(&column.name))?;
    put_i32(buf, column.column_type.id());
    encode_value(buf, column.column_type, column.data.as_ref())?;
    put_flag(buf, column.encrypted);
    Ok(())
}

fn encode_chunk_info(buf: &mut BytesMut, chunk: &ChunkInfo) -> Result<()> {
    put_i32(buf, chunk.kind.id());
    put_string(buf, Some(chunk.offset.as_ref().map_or(NULL_AMOUNT, LobAmount::as_str)))?;
    put_string(
        buf,
        Some(chunk.operation_size.as_ref().map_or(NULL_AMOUNT, LobAmount::as_str)),
    )?;
    put_flag(buf, chunk.last_chunk);
    put_flag(buf, chunk.empty_chunk);
    put_flag(buf, chunk.end_of_row);
    if let ChunkKind::XmlType { charset_id } = chunk.kind {
        put_i32(buf, charset_id);
    }
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode the next top-level frame
pub fn decode_record<R: Read>(reader: &mut R) -> Result<Frame> {
    let tag = read_string(reader)?;
    match tag.as_deref() {
        Some(ROW_TAG) => decode_row(reader).map(|row| Frame::Record(ChangeRecord::Row(row))),
        Some(DDL_TAG) => decode_schema(reader).map(|ddl| Frame::Record(ChangeRecord::Schema(ddl))),
        Some(EOF_TAG) => Ok(Frame::EndOfSegment),
        other => Err(LcrError::Corruption(format!("unrecognized record tag: {:?}", other))),
    }
}

/// Decode a standalone chunk frame
pub fn decode_chunk<R: Read>(reader: &mut R) -> Result<ChunkColumn> {
    let column = decode_column_prefix(reader)?;
    let chunk = decode_chunk_info(reader)?;
    Ok(ChunkColumn { column, chunk })
}

fn decode_header<R: Read>(reader: &mut R) -> Result<(Option<String>, RecordHeader)> {
    let command = read_string(reader)?;
    let header = RecordHeader {
        source_database: read_string(reader)?,
        object_owner: read_string(reader)?,
        object_name: read_string(reader)?,
        transaction_id: read_string(reader)?,
        source_time: read_bytes(reader)?,
        position: read_bytes(reader)?.map(Position::new),
        tag: read_bytes(reader)?,
    };
    Ok((command, header))
}

fn decode_row<R: Read>(reader: &mut R) -> Result<RowChange> {
    let (command, header) = decode_header(reader)?;
    let kind = command
        .as_deref()
        .and_then(RowKind::parse)
        .ok_or_else(|| LcrError::Corruption(format!("unknown row command type: {:?}", command)))?;

    let operation = match kind {
        RowKind::Insert => {
            let new_values = decode_column_list(reader)?;
            let has_chunk_data = read_flag(reader)?;
            RowOperation::Insert {
                new_values,
                has_chunk_data,
            }
        }
        RowKind::Update => {
            let new_values = decode_column_list(reader)?;
            let old_values = decode_column_list(reader)?;
            let has_chunk_data = read_flag(reader)?;
            RowOperation::Update {
                new_values,
                old_values,
                has_chunk_data,
            }
        }
        RowKind::Delete => RowOperation::Delete {
            old_values: decode_column_list(reader)?,
        },
        RowKind::Commit => RowOperation::Commit,
        RowKind::LobWrite => RowOperation::LobWrite {
            new_values: decode_column_list(reader)?,
        },
        RowKind::LobErase => RowOperation::LobErase {
            new_values: decode_column_list(reader)?,
        },
        RowKind::LobTrim => RowOperation::LobTrim {
            new_values: decode_column_list(reader)?,
        },
    };

    Ok(RowChange { header, operation })
}

fn decode_schema<R: Read>(reader: &mut R) -> Result<SchemaChange> {
    let (command, header) = decode_header(reader)?;
    Ok(SchemaChange {
        command,
        header,
        object_type: read_string(reader)?,
        ddl_text: read_string(reader)?,
        current_schema: read_string(reader)?,
        logon_user: read_string(reader)?,
        base_table_owner: read_string(reader)?,
        base_table_name: read_string(reader)?,
    })
}

fn decode_column_list<R: Read>(reader: &mut R) -> Result<Vec<ColumnValue>> {
    let count = read_i32(reader)?;
    if count < 0 {
        return Err(LcrError::Corruption(format!("negative column count: {}", count)));
    }

    let mut columns = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        let column = decode_column_prefix(reader)?;
        if read_flag(reader)? {
            let chunk = decode_chunk_info(reader)?;
            columns.push(ColumnValue::Chunked(ChunkColumn { column, chunk }));
        } else {
            columns.push(ColumnValue::Plain(column));
        }
    }
    Ok(columns)
}

fn decode_column_prefix<R: Read>(reader: &mut R) -> Result<Column> {
    let name = read_string(reader)?
        .ok_or_else(|| LcrError::Corruption("column without a name".to_string()))?;
    let type_id = read_i32(reader)?;
    let column_type = ColumnType::from_id(type_id).ok_or_else(|| {
        LcrError::Corruption(format!("unknown type id {} for column {}", type_id, name))
    })?;
    let data = decode_value(reader, column_type)?;
    let encrypted = read_flag(reader)?;
    Ok(Column {
        name,
        column_type,
        data,
        encrypted,
    })
}

fn decode_chunk_info<R: Read>(reader: &mut R) -> Result<ChunkInfo> {
    let kind_id = read_i32(reader)?;
    let offset = decode_amount(reader, "offset")?;
    let operation_size = decode_amount(reader, "operation size")?;
    let last_chunk = read_flag(reader)?;
    let empty_chunk = read_flag(reader)?;
    let end_of_row = read_flag(reader)?;

    let kind = if kind_id == ChunkKind::XMLTYPE_ID {
        ChunkKind::XmlType {
            charset_id: read_i32(reader)?,
        }
    } else {
        ChunkKind::from_plain_id(kind_id)
            .ok_or_else(|| LcrError::Corruption(format!("unknown chunk kind id: {}", kind_id)))?
    };

    Ok(ChunkInfo {
        kind,
        offset,
        operation_size,
        last_chunk,
        empty_chunk,
        end_of_row,
    })
}

fn decode_amount<R: Read>(reader: &mut R, what: &str) -> Result<Option<LobAmount>> {
    match read_string(reader)? {
        None => Err(LcrError::Corruption(format!("null chunk {}", what))),
        Some(text) if text == NULL_AMOUNT => Ok(None),
        Some(text) => text.parse().map(Some),
    }
}
