//! Statement parameters for the binary protocol and client-side
//! interpolation.

use chrono::{NaiveDateTime, TimeDelta};

use crate::constant::ColumnType;
use crate::error::Result;
use crate::protocol::datetime;
use crate::protocol::primitive::*;

/// A single statement parameter.
#[derive(Debug, Clone, Copy)]
pub enum ParamValue<'a> {
    Null,
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Str(&'a str),
    Bytes(&'a [u8]),
    DateTime(NaiveDateTime),
    Time(TimeDelta),
    /// A raw JSON document, rendered as a quoted string.
    Json(&'a str),
}

impl ParamValue<'_> {
    /// The wire type tag written in the execute payload.
    pub fn column_type(&self) -> ColumnType {
        match self {
            ParamValue::Null => ColumnType::MYSQL_TYPE_NULL,
            ParamValue::Int(_) => ColumnType::MYSQL_TYPE_LONGLONG,
            ParamValue::UInt(_) => ColumnType::MYSQL_TYPE_LONGLONG,
            ParamValue::Float(_) => ColumnType::MYSQL_TYPE_FLOAT,
            ParamValue::Double(_) => ColumnType::MYSQL_TYPE_DOUBLE,
            ParamValue::Bool(_) => ColumnType::MYSQL_TYPE_TINY,
            ParamValue::Str(_) | ParamValue::Json(_) => ColumnType::MYSQL_TYPE_STRING,
            ParamValue::Bytes(_) => ColumnType::MYSQL_TYPE_LONG_BLOB,
            ParamValue::DateTime(_) => ColumnType::MYSQL_TYPE_DATETIME,
            ParamValue::Time(_) => ColumnType::MYSQL_TYPE_TIME,
        }
    }

    /// The 0x8000 "unsigned" bit of the type tag.
    pub fn is_unsigned(&self) -> bool {
        matches!(self, ParamValue::UInt(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Encoded size of the value part in an execute payload.
    pub fn encoded_len(&self) -> usize {
        fn lenenc(len: usize) -> usize {
            len + if len < 251 {
                1
            } else if len < (1 << 16) {
                3
            } else if len < (1 << 24) {
                4
            } else {
                9
            }
        }
        match self {
            ParamValue::Null => 0,
            ParamValue::Int(_) | ParamValue::UInt(_) | ParamValue::Double(_) => 8,
            ParamValue::Float(_) => 4,
            ParamValue::Bool(_) => 1,
            ParamValue::Str(s) | ParamValue::Json(s) => lenenc(s.len()),
            ParamValue::Bytes(b) => lenenc(b.len()),
            ParamValue::DateTime(_) => 12,
            ParamValue::Time(_) => 13,
        }
    }

    /// Append the packed value (no type tag) to an execute payload.
    pub fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            ParamValue::Null => {}
            ParamValue::Int(v) => write_int_8(out, *v as u64),
            ParamValue::UInt(v) => write_int_8(out, *v),
            ParamValue::Float(v) => write_float_4(out, *v),
            ParamValue::Double(v) => write_float_8(out, *v),
            ParamValue::Bool(v) => write_int_1(out, *v as u8),
            ParamValue::Str(s) | ParamValue::Json(s) => write_bytes_lenenc(out, s.as_bytes()),
            ParamValue::Bytes(b) => write_bytes_lenenc(out, b),
            ParamValue::DateTime(v) => datetime::write_datetime(out, v),
            ParamValue::Time(v) => datetime::write_time(out, *v),
        }
    }
}

/// Conversion into a [`ParamValue`], implemented for the common Rust types.
pub trait IntoParam {
    fn into_param(&self) -> ParamValue<'_>;
}

macro_rules! impl_into_param_int {
    ($($t:ty),*) => {
        $(impl IntoParam for $t {
            fn into_param(&self) -> ParamValue<'_> {
                ParamValue::Int(*self as i64)
            }
        })*
    };
}

macro_rules! impl_into_param_uint {
    ($($t:ty),*) => {
        $(impl IntoParam for $t {
            fn into_param(&self) -> ParamValue<'_> {
                ParamValue::UInt(*self as u64)
            }
        })*
    };
}

impl_into_param_int!(i8, i16, i32, i64, isize);
impl_into_param_uint!(u8, u16, u32, u64, usize);

impl IntoParam for f32 {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Float(*self)
    }
}

impl IntoParam for f64 {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Double(*self)
    }
}

impl IntoParam for bool {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Bool(*self)
    }
}

impl IntoParam for &str {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Str(self)
    }
}

impl IntoParam for String {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Str(self)
    }
}

impl IntoParam for &[u8] {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Bytes(self)
    }
}

impl IntoParam for Vec<u8> {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Bytes(self)
    }
}

impl IntoParam for NaiveDateTime {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::DateTime(*self)
    }
}

impl IntoParam for TimeDelta {
    fn into_param(&self) -> ParamValue<'_> {
        ParamValue::Time(*self)
    }
}

impl<T: IntoParam> IntoParam for Option<T> {
    fn into_param(&self) -> ParamValue<'_> {
        match self {
            Some(value) => value.into_param(),
            None => ParamValue::Null,
        }
    }
}

impl IntoParam for ParamValue<'_> {
    fn into_param(&self) -> ParamValue<'_> {
        *self
    }
}

/// A set of statement parameters.
pub trait Params {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect the borrowed parameter values, in order.
    fn values<'a>(&'a self) -> Vec<ParamValue<'a>>;
}

impl<T: IntoParam> Params for &[T] {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn values<'a>(&'a self) -> Vec<ParamValue<'a>> {
        self.iter().map(IntoParam::into_param).collect()
    }
}

impl<T: IntoParam, const N: usize> Params for [T; N] {
    fn len(&self) -> usize {
        N
    }

    fn values<'a>(&'a self) -> Vec<ParamValue<'a>> {
        self.iter().map(IntoParam::into_param).collect()
    }
}

impl Params for () {
    fn len(&self) -> usize {
        0
    }

    fn values<'a>(&'a self) -> Vec<ParamValue<'a>> {
        Vec::new()
    }
}

macro_rules! impl_params_tuple {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: IntoParam),+> Params for ($($name,)+) {
            fn len(&self) -> usize {
                [$( $idx ),+].len()
            }

            fn values<'a>(&'a self) -> Vec<ParamValue<'a>> {
                vec![$( self.$idx.into_param() ),+]
            }
        }
    };
}

impl_params_tuple!(A: 0);
impl_params_tuple!(A: 0, B: 1);
impl_params_tuple!(A: 0, B: 1, C: 2);
impl_params_tuple!(A: 0, B: 1, C: 2, D: 3);
impl_params_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4);
impl_params_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_params_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_params_tuple!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Write the NULL bitmap for an execute payload: `(n + 7) / 8` bytes.
pub fn encode_null_bitmap(out: &mut Vec<u8>, params: &[ParamValue<'_>]) {
    let mut bitmap = vec![0u8; (params.len() + 7) / 8];
    for (index, param) in params.iter().enumerate() {
        if param.is_null() {
            bitmap[index / 8] |= 1 << (index % 8);
        }
    }
    out.extend_from_slice(&bitmap);
}

/// Write the 2-byte type tag of each parameter.
pub fn encode_types(out: &mut Vec<u8>, params: &[ParamValue<'_>]) {
    for param in params {
        let mut tag = param.column_type() as u16;
        if param.is_unsigned() {
            tag |= 0x8000;
        }
        write_int_2(out, tag);
    }
}

/// Write the packed values, skipping those already shipped as long data.
pub fn encode_values(
    out: &mut Vec<u8>,
    params: &[ParamValue<'_>],
    long_data: &[bool],
) -> Result<()> {
    for (index, param) in params.iter().enumerate() {
        if long_data.get(index).copied().unwrap_or(false) {
            // value was pre-sent via STMT_SEND_LONG_DATA; keep a zero-length
            // placeholder so column order is preserved
            write_int_lenenc(out, 0);
            continue;
        }
        param.encode_value(out);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn null_bitmap_packs_by_index() {
        let params = [
            ParamValue::Null,
            ParamValue::Int(1),
            ParamValue::Null,
            ParamValue::Null,
            ParamValue::Int(2),
            ParamValue::Int(3),
            ParamValue::Null,
            ParamValue::Int(4),
            ParamValue::Null,
        ];
        let mut out = Vec::new();
        encode_null_bitmap(&mut out, &params);
        assert_eq!(out, vec![0b0100_1101, 0b0000_0001]);
    }

    #[test]
    fn type_tags_carry_unsigned_bit() {
        let params = [ParamValue::Int(-1), ParamValue::UInt(1)];
        let mut out = Vec::new();
        encode_types(&mut out, &params);
        assert_eq!(out, vec![0x08, 0x00, 0x08, 0x80]);
    }

    #[test]
    fn encoded_len_matches_encoding() {
        let blob = vec![0u8; 300];
        let params: Vec<ParamValue<'_>> = vec![
            ParamValue::Null,
            ParamValue::Int(-5),
            ParamValue::UInt(5),
            ParamValue::Float(1.5),
            ParamValue::Double(2.5),
            ParamValue::Bool(true),
            ParamValue::Str("hello"),
            ParamValue::Bytes(&blob),
            ParamValue::DateTime(
                chrono::NaiveDate::from_ymd_opt(2024, 6, 15)
                    .unwrap()
                    .and_hms_micro_opt(1, 2, 3, 4)
                    .unwrap(),
            ),
            ParamValue::Time(TimeDelta::seconds(90061)),
        ];
        for param in &params {
            let mut out = Vec::new();
            param.encode_value(&mut out);
            assert!(
                out.len() <= param.encoded_len(),
                "{param:?}: encoded {} > budgeted {}",
                out.len(),
                param.encoded_len()
            );
        }
    }

    #[test]
    fn tuple_params_collect_in_order() {
        let params = (42i32, "gopher", Option::<i64>::None);
        let values = params.values();
        assert_eq!(values.len(), 3);
        assert!(matches!(values[0], ParamValue::Int(42)));
        assert!(matches!(values[1], ParamValue::Str("gopher")));
        assert!(matches!(values[2], ParamValue::Null));
    }

    #[test]
    fn long_data_placeholder() {
        let params = [ParamValue::Str("short"), ParamValue::Str("pretend-long")];
        let mut out = Vec::new();
        encode_values(&mut out, &params, &[false, true]).unwrap();
        // "short" lenenc, then a zero-length placeholder
        assert_eq!(out, vec![5, b's', b'h', b'o', b'r', b't', 0]);
    }
}
