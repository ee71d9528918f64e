//! Primitive field encodings
//!
//! Every field of a record is built from four shapes. Integers are 4-byte
//! big-endian; text is UTF-16 big-endian code units and its length counts
//! code units.
//!
//! ```text
//! null marker   [1: i32][unit: u16]               unit = 'Y' (null) | 'N'
//! string        [marker]([len: i32][units...])?   body only when not null
//! flag          a non-null string "Y" or "N"
//! bytes         [flag: is null]([len: i32][raw...])?
//! ```
//!
//! The string null marker, the bytes null marker and boolean flags share the
//! `Y`/`N` alphabet but are separate encodings with separate readers.

use std::io::Read;

use bytes::{BufMut, BytesMut};

use crate::error::{LcrError, Result};

/// Largest length accepted for a single string or blob (256 MB)
pub const MAX_FIELD_LEN: usize = 256 * 1024 * 1024;

const YES: u16 = b'Y' as u16;
const NO: u16 = b'N' as u16;

// =============================================================================
// Encoding
// =============================================================================

pub fn put_i32(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

fn put_len(buf: &mut BytesMut, len: usize, what: &str) -> Result<()> {
    if len > MAX_FIELD_LEN {
        return Err(LcrError::Protocol(format!(
            "{} too large: {} (max {})",
            what, len, MAX_FIELD_LEN
        )));
    }
    buf.put_i32(len as i32);
    Ok(())
}

/// Token in front of every string telling whether it is null
pub fn put_null_marker(buf: &mut BytesMut, is_null: bool) {
    buf.put_i32(1);
    buf.put_u16(if is_null { YES } else { NO });
}

/// Nullable string; `Some("")` stays distinct from `None`
pub fn put_string(buf: &mut BytesMut, value: Option<&str>) -> Result<()> {
    match value {
        None => put_null_marker(buf, true),
        Some(text) => {
            put_null_marker(buf, false);
            let units: Vec<u16> = text.encode_utf16().collect();
            put_len(buf, units.len(), "string")?;
            buf.reserve(units.len() * 2);
            for unit in units {
                buf.put_u16(unit);
            }
        }
    }
    Ok(())
}

/// Boolean flag, stored as the string "Y" or "N"
pub fn put_flag(buf: &mut BytesMut, value: bool) {
    put_null_marker(buf, false);
    buf.put_i32(1);
    buf.put_u16(if value { YES } else { NO });
}

/// Token in front of every blob or datum telling whether it is null
pub fn put_bytes_null_marker(buf: &mut BytesMut, is_null: bool) {
    put_flag(buf, is_null);
}

/// Nullable byte blob; an empty blob stays distinct from `None`
pub fn put_bytes(buf: &mut BytesMut, value: Option<&[u8]>) -> Result<()> {
    put_bytes_null_marker(buf, value.is_none());
    if let Some(raw) = value {
        put_len(buf, raw.len(), "byte array")?;
        buf.put_slice(raw);
    }
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            LcrError::Corruption(format!("truncated input: needed {} more bytes", buf.len()))
        } else {
            LcrError::Io(e)
        }
    })
}

pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut raw = [0u8; 4];
    fill(reader, &mut raw)?;
    Ok(i32::from_be_bytes(raw))
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut raw = [0u8; 2];
    fill(reader, &mut raw)?;
    Ok(u16::from_be_bytes(raw))
}

fn read_len<R: Read>(reader: &mut R, what: &str) -> Result<usize> {
    let len = read_i32(reader)?;
    if len < 0 || len as usize > MAX_FIELD_LEN {
        return Err(LcrError::Corruption(format!("invalid {} length: {}", what, len)));
    }
    Ok(len as usize)
}

/// Read exactly `len` bytes without trusting `len` for the allocation
fn read_raw<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(len.min(64 * 1024));
    reader.by_ref().take(len as u64).read_to_end(&mut raw)?;
    if raw.len() != len {
        return Err(LcrError::Corruption(format!(
            "truncated input: field declares {} bytes, found {}",
            len,
            raw.len()
        )));
    }
    Ok(raw)
}

/// Returns true when the marker says null
pub fn read_null_marker<R: Read>(reader: &mut R) -> Result<bool> {
    let len = read_i32(reader)?;
    if len != 1 {
        return Err(LcrError::Corruption(format!("invalid null marker length: {}", len)));
    }
    match read_u16(reader)? {
        YES => Ok(true),
        NO => Ok(false),
        other => Err(LcrError::Corruption(format!("invalid null marker: 0x{:04x}", other))),
    }
}

pub fn read_string<R: Read>(reader: &mut R) -> Result<Option<String>> {
    if read_null_marker(reader)? {
        return Ok(None);
    }
    let units_len = read_len(reader, "string")?;
    let raw = read_raw(reader, units_len * 2)?;
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map(Some)
        .map_err(|e| LcrError::Corruption(format!("invalid UTF-16 string: {}", e)))
}

pub fn read_flag<R: Read>(reader: &mut R) -> Result<bool> {
    match read_string(reader)?.as_deref() {
        Some("Y") => Ok(true),
        Some("N") => Ok(false),
        other => Err(LcrError::Corruption(format!("invalid flag: {:?}", other))),
    }
}

/// Returns true when the blob or datum that follows is null
pub fn read_bytes_null_marker<R: Read>(reader: &mut R) -> Result<bool> {
    read_flag(reader)
}

pub fn read_bytes<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    if read_bytes_null_marker(reader)? {
        return Ok(None);
    }
    let len = read_len(reader, "byte array")?;
    read_raw(reader, len).map(Some)
}
