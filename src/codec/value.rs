//! Value codec
//!
//! Encodes a single column value. Character data carries its charset id and
//! text; every other type is an opaque blob owned by the source's internal
//! number/date/interval representation.

use std::io::Read;

use bytes::BytesMut;

use super::primitive::{
    put_bytes, put_bytes_null_marker, put_i32, put_string, read_bytes, read_bytes_null_marker,
    read_i32, read_string,
};
use crate::error::{LcrError, Result};
use crate::record::{ColumnType, Datum};

/// Encode `data` as a value of `column_type`
pub fn encode_value(
    buf: &mut BytesMut,
    column_type: ColumnType,
    data: Option<&Datum>,
) -> Result<()> {
    let Some(datum) = data else {
        put_bytes_null_marker(buf, true);
        return Ok(());
    };

    put_bytes_null_marker(buf, false);
    match (column_type.is_character(), datum) {
        (true, Datum::Char { charset_id, text }) => {
            put_i32(buf, *charset_id);
            put_string(buf, Some(text))
        }
        (false, Datum::Bytes(raw)) => put_bytes(buf, Some(raw)),
        _ => Err(LcrError::Protocol(format!(
            "datum {:?} does not fit column type {:?}",
            datum, column_type
        ))),
    }
}

/// Decode a value of `column_type`
pub fn decode_value<R: Read>(reader: &mut R, column_type: ColumnType) -> Result<Option<Datum>> {
    if read_bytes_null_marker(reader)? {
        return Ok(None);
    }

    if column_type.is_character() {
        let charset_id = read_i32(reader)?;
        let text = read_string(reader)?.ok_or_else(|| {
            LcrError::Corruption("null text inside a non-null character value".to_string())
        })?;
        Ok(Some(Datum::Char { charset_id, text }))
    } else {
        let raw = read_bytes(reader)?.ok_or_else(|| {
            LcrError::Corruption(format!("null payload inside a non-null {:?} value", column_type))
        })?;
        Ok(Some(Datum::Bytes(raw)))
    }
}
