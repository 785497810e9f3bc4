//! Binary- and text-protocol value decoding.

use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::opts::TimeZone;
use crate::protocol::command::Column;
use crate::protocol::datetime::{self, DateTimeValue, TimeValue};
use crate::protocol::primitive::*;

/// A single column value borrowed from a row payload.
///
/// Temporal values keep their wire representation; [`Value::to_owned`]
/// applies the `parseTime` contract.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    /// NULL value
    Null,
    /// Signed integer (TINYINT, SMALLINT, INT, BIGINT)
    SignedInt(i64),
    /// Unsigned integer (TINYINT UNSIGNED, SMALLINT UNSIGNED, INT UNSIGNED, BIGINT UNSIGNED)
    UnsignedInt(u64),
    /// FLOAT - 4-byte floating point
    Float(f32),
    /// DOUBLE - 8-byte floating point
    Double(f64),
    /// DATE/DATETIME/TIMESTAMP in wire representation
    DateTime(DateTimeValue<'a>),
    /// TIME in wire representation
    Time(TimeValue<'a>),
    /// BLOB, GEOMETRY, STRING, VARCHAR, DECIMAL, JSON, ..
    Bytes(&'a [u8]),
}

impl<'a> Value<'a> {
    /// Decode one binary-protocol value for the given column.
    /// Returns the value and the remaining bytes.
    pub fn read_binary(data: &'a [u8], column: &Column) -> Result<(Self, &'a [u8])> {
        let unsigned = column.flags.contains(ColumnFlags::UNSIGNED_FLAG);
        Ok(match column.column_type {
            ColumnType::MYSQL_TYPE_NULL => (Value::Null, data),
            ColumnType::MYSQL_TYPE_TINY => {
                let (v, rest) = read_int_1(data)?;
                if unsigned {
                    (Value::UnsignedInt(v as u64), rest)
                } else {
                    (Value::SignedInt(v as i8 as i64), rest)
                }
            }
            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                let (v, rest) = read_int_2(data)?;
                if unsigned {
                    (Value::UnsignedInt(v as u64), rest)
                } else {
                    (Value::SignedInt(v as i16 as i64), rest)
                }
            }
            ColumnType::MYSQL_TYPE_LONG | ColumnType::MYSQL_TYPE_INT24 => {
                let (v, rest) = read_int_4(data)?;
                if unsigned {
                    (Value::UnsignedInt(v as u64), rest)
                } else {
                    (Value::SignedInt(v as i32 as i64), rest)
                }
            }
            ColumnType::MYSQL_TYPE_LONGLONG => {
                let (v, rest) = read_int_8(data)?;
                if unsigned {
                    (Value::UnsignedInt(v), rest)
                } else {
                    (Value::SignedInt(v as i64), rest)
                }
            }
            ColumnType::MYSQL_TYPE_FLOAT => {
                let (v, rest) = read_float_4(data)?;
                (Value::Float(v), rest)
            }
            ColumnType::MYSQL_TYPE_DOUBLE => {
                let (v, rest) = read_float_8(data)?;
                (Value::Double(v), rest)
            }
            ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_NEWDATE
            | ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_TIMESTAMP => {
                let (v, rest) = datetime::read_datetime(data)?;
                (Value::DateTime(v), rest)
            }
            ColumnType::MYSQL_TYPE_TIME => {
                let (v, rest) = datetime::read_time(data)?;
                (Value::Time(v), rest)
            }
            ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_BIT
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_SET
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_GEOMETRY
            | ColumnType::MYSQL_TYPE_JSON => {
                let (v, rest) = read_string_lenenc(data)?;
                (Value::Bytes(v), rest)
            }
            ColumnType::MYSQL_TYPE_TIMESTAMP2
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_TIME2
            | ColumnType::MYSQL_TYPE_TYPED_ARRAY => {
                // server-internal types never appear in client resultsets
                return Err(Error::MalformedPacket);
            }
        })
    }

    /// Apply the `parseTime` contract: temporal columns become native
    /// timestamps in the configured location when enabled, byte slices in
    /// server representation otherwise.
    pub fn to_owned(&self, parse_time: bool, loc: TimeZone) -> OwnedValue {
        match *self {
            Value::Null => OwnedValue::Null,
            Value::SignedInt(v) => OwnedValue::SignedInt(v),
            Value::UnsignedInt(v) => OwnedValue::UnsignedInt(v),
            Value::Float(v) => OwnedValue::Float(v),
            Value::Double(v) => OwnedValue::Double(v),
            Value::Bytes(v) => OwnedValue::Bytes(v.to_vec()),
            Value::DateTime(v) => {
                if parse_time {
                    match v.to_chrono(loc) {
                        Some(ts) => OwnedValue::DateTime(ts),
                        None => OwnedValue::Null,
                    }
                } else {
                    OwnedValue::Bytes(v.to_string().into_bytes())
                }
            }
            Value::Time(v) => OwnedValue::Bytes(v.to_string().into_bytes()),
        }
    }
}

/// An owned column value, detached from the connection's read buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    Null,
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    DateTime(chrono::DateTime<chrono::FixedOffset>),
    Bytes(Vec<u8>),
}

impl OwnedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OwnedValue::Bytes(bytes) => simdutf8::basic::from_utf8(bytes).ok(),
            _ => None,
        }
    }
}

/// Decode one text-protocol value (already split out of the row) for the
/// given column.
pub fn decode_text_value<'a>(raw: Option<&'a [u8]>, column: &Column) -> Value<'a> {
    let Some(raw) = raw else { return Value::Null };
    let unsigned = column.flags.contains(ColumnFlags::UNSIGNED_FLAG);
    let text = || simdutf8::basic::from_utf8(raw).ok();
    match column.column_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            if unsigned {
                match text().and_then(|t| t.parse::<u64>().ok()) {
                    Some(v) => Value::UnsignedInt(v),
                    None => Value::Bytes(raw),
                }
            } else {
                match text().and_then(|t| t.parse::<i64>().ok()) {
                    Some(v) => Value::SignedInt(v),
                    None => Value::Bytes(raw),
                }
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT => match text().and_then(|t| t.parse::<f32>().ok()) {
            Some(v) => Value::Float(v),
            None => Value::Bytes(raw),
        },
        ColumnType::MYSQL_TYPE_DOUBLE => match text().and_then(|t| t.parse::<f64>().ok()) {
            Some(v) => Value::Double(v),
            None => Value::Bytes(raw),
        },
        _ => Value::Bytes(raw),
    }
}

/// Parse a text-protocol temporal rendering into a timestamp, for
/// `parseTime` on text resultsets.
pub fn parse_text_datetime(
    raw: &[u8],
    loc: TimeZone,
) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    use chrono::TimeZone as _;
    let text = simdutf8::basic::from_utf8(raw).ok()?;
    if text.starts_with("0000-00-00") {
        return None;
    }
    let naive = if text.len() == 10 {
        chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()?
            .and_hms_opt(0, 0, 0)?
    } else if text.contains('.') {
        chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok()?
    } else {
        chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").ok()?
    };
    match loc {
        TimeZone::Utc => Some(naive.and_utc().fixed_offset()),
        TimeZone::Local => Some(
            chrono::Local
                .from_local_datetime(&naive)
                .earliest()?
                .fixed_offset(),
        ),
        TimeZone::Fixed(offset) => offset.from_local_datetime(&naive).earliest(),
    }
}

#[cfg(test)]
#[path = "value_test.rs"]
mod value_test;
