use crate::error::{Error, Result};
use crate::opts::TimeZone;
use crate::protocol::command::Column;
use crate::protocol::primitive::read_string_lenenc_or_null;
use crate::value::{OwnedValue, Value, decode_text_value};

/// One text-protocol row payload: a sequence of length-encoded strings or
/// NULL markers, one per column.
#[derive(Debug, Clone, Copy)]
pub struct TextRow<'a>(pub &'a [u8]);

impl<'a> TextRow<'a> {
    /// Split the raw column values out of the payload.
    pub fn columns(&self, num_columns: usize) -> Result<Vec<Option<&'a [u8]>>> {
        let mut out = Vec::with_capacity(num_columns);
        let mut data = self.0;
        for _ in 0..num_columns {
            let (value, rest) = read_string_lenenc_or_null(data)?;
            out.push(value);
            data = rest;
        }
        if !data.is_empty() {
            return Err(Error::MalformedPacket);
        }
        Ok(out)
    }

    pub fn values(&self, columns: &[Column]) -> Result<Vec<Value<'a>>> {
        let raw = self.columns(columns.len())?;
        Ok(raw
            .into_iter()
            .zip(columns)
            .map(|(value, column)| decode_text_value(value, column))
            .collect())
    }
}

/// One binary-protocol row: the payload after the leading `0x00` header,
/// carrying a NULL bitmap of `(columns + 7 + 2) / 8` bytes (values offset
/// by 2 bits) followed by the packed values.
#[derive(Debug, Clone, Copy)]
pub struct BinaryRow<'a> {
    null_bitmap: &'a [u8],
    values: &'a [u8],
}

impl<'a> BinaryRow<'a> {
    /// Parse a binary row packet (including its `0x00` header byte).
    pub fn parse(payload: &'a [u8], num_columns: usize) -> Result<Self> {
        let (header, data) = crate::protocol::primitive::read_int_1(payload)?;
        if header != 0x00 {
            return Err(Error::MalformedPacket);
        }
        let bitmap_len = (num_columns + 7 + 2) / 8;
        let (null_bitmap, values) =
            crate::protocol::primitive::read_string_fix(data, bitmap_len)?;
        Ok(Self {
            null_bitmap,
            values,
        })
    }

    /// Whether the value at `index` is NULL. The bitmap is offset by 2 bits.
    pub fn is_null(&self, index: usize) -> bool {
        let bit = index + 2;
        self.null_bitmap
            .get(bit / 8)
            .is_some_and(|byte| byte & (1 << (bit % 8)) != 0)
    }

    pub fn values(&self, columns: &[Column]) -> Result<Vec<Value<'a>>> {
        let mut out = Vec::with_capacity(columns.len());
        let mut data = self.values;
        for (index, column) in columns.iter().enumerate() {
            if self.is_null(index) {
                out.push(Value::Null);
                continue;
            }
            let (value, rest) = Value::read_binary(data, column)?;
            out.push(value);
            data = rest;
        }
        Ok(out)
    }
}

/// A row copied out of the connection's buffers.
pub type OwnedRow = Vec<OwnedValue>;

/// Copy a decoded row out of the read buffer, applying the `parseTime`
/// contract.
pub fn to_owned_row(values: &[Value<'_>], parse_time: bool, loc: TimeZone) -> OwnedRow {
    values
        .iter()
        .map(|value| value.to_owned(parse_time, loc))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::{ColumnFlags, ColumnType};
    use pretty_assertions::assert_eq;

    fn column(column_type: ColumnType, flags: ColumnFlags) -> Column {
        Column {
            catalog: String::new(),
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            name: "c".to_owned(),
            org_name: "c".to_owned(),
            charset: 63,
            column_length: 0,
            column_type,
            flags,
            decimals: 0,
        }
    }

    #[test]
    fn text_row_with_nulls() {
        // "42", NULL, "gopher"
        let mut payload = vec![2, b'4', b'2', 0xFB, 6];
        payload.extend_from_slice(b"gopher");
        let row = TextRow(&payload);
        let raw = row.columns(3).unwrap();
        assert_eq!(raw[0], Some(&b"42"[..]));
        assert_eq!(raw[1], None);
        assert_eq!(raw[2], Some(&b"gopher"[..]));
        // trailing garbage is refused
        assert!(row.columns(2).is_err());
    }

    #[test]
    fn binary_row_null_bitmap_offset() {
        // 3 columns -> bitmap of (3+7+2)/8 = 1 byte; column 1 NULL -> bit 3
        let payload = [0x00, 0b0000_1000, 0x2A, 0x07];
        let row = BinaryRow::parse(&payload, 3).unwrap();
        assert!(!row.is_null(0));
        assert!(row.is_null(1));
        assert!(!row.is_null(2));

        let columns = [
            column(ColumnType::MYSQL_TYPE_TINY, ColumnFlags::empty()),
            column(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty()),
            column(ColumnType::MYSQL_TYPE_TINY, ColumnFlags::UNSIGNED_FLAG),
        ];
        let values = row.values(&columns).unwrap();
        assert!(matches!(values[0], Value::SignedInt(0x2A)));
        assert!(matches!(values[1], Value::Null));
        assert!(matches!(values[2], Value::UnsignedInt(7)));
    }

    #[test]
    fn binary_row_requires_zero_header() {
        assert!(BinaryRow::parse(&[0x01, 0x00], 1).is_err());
    }

    #[test]
    fn text_row_values_decode_by_column_type() {
        let columns = [
            column(ColumnType::MYSQL_TYPE_LONG, ColumnFlags::empty()),
            column(ColumnType::MYSQL_TYPE_VAR_STRING, ColumnFlags::empty()),
        ];
        let payload = [2, b'4', b'2', 1, b'x'];
        let values = TextRow(&payload).values(&columns).unwrap();
        assert!(matches!(values[0], Value::SignedInt(42)));
        assert!(matches!(values[1], Value::Bytes(b"x")));

        let owned = to_owned_row(&values, false, TimeZone::Utc);
        assert_eq!(owned[0], OwnedValue::SignedInt(42));
        assert_eq!(owned[1], OwnedValue::Bytes(b"x".to_vec()));
    }
}
