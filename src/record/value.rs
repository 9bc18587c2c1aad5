use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{RecordError, RecordResult};

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_TEXT: u8 = 2;

/// Represents a column data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Int,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Text => write!(f, "TEXT"),
        }
    }
}

/// Represents a single column value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Int(i32),
    Text(String),
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the column type of this value; NULL fits any column
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ColumnType::Int),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Size of the tagged encoding in bytes
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Int(_) => 1 + 4,
            Value::Text(s) => 1 + 4 + s.len(),
        }
    }

    /// Append the tagged encoding: a type tag, then the payload
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Null => out.push(TAG_NULL),
            Value::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Text(s) => {
                out.push(TAG_TEXT);
                put_i32(out, s.len() as i32);
                out.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Decode one tagged value at `*pos`, advancing past it
    pub fn decode(buf: &[u8], pos: &mut usize) -> RecordResult<Value> {
        let tag = get_u8(buf, pos)?;
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_INT => Ok(Value::Int(get_i32(buf, pos)?)),
            TAG_TEXT => {
                let len = get_i32(buf, pos)?;
                if len < 0 {
                    return Err(RecordError::Decode(format!("negative text length {}", len)));
                }
                let bytes = get_bytes(buf, pos, len as usize)?;
                let text = String::from_utf8(bytes.to_vec())
                    .map_err(|e| RecordError::Decode(format!("invalid UTF-8 text: {}", e)))?;
                Ok(Value::Text(text))
            }
            other => Err(RecordError::Decode(format!("unknown value tag {}", other))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

pub(crate) fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn get_u8(buf: &[u8], pos: &mut usize) -> RecordResult<u8> {
    Ok(get_bytes(buf, pos, 1)?[0])
}

pub(crate) fn get_i32(buf: &[u8], pos: &mut usize) -> RecordResult<i32> {
    let bytes = get_bytes(buf, pos, 4)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn get_bytes<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> RecordResult<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| {
            RecordError::Decode(format!(
                "read of {} bytes at offset {} runs past the end ({} bytes)",
                len,
                pos,
                buf.len()
            ))
        })?;
    let bytes = &buf[*pos..end];
    *pos = end;
    Ok(bytes)
}
