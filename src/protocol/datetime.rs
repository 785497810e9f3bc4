//! Binary-protocol temporal values.
//!
//! DATETIME/TIMESTAMP/DATE arrive length-prefixed as 0, 4, 7 or 11 bytes;
//! TIME as 0, 8 or 12 bytes. Any other length is a protocol violation.

use std::fmt;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone as _, Timelike};
use zerocopy::byteorder::little_endian::U32 as U32LE;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::error::{Error, Result};
use crate::opts::TimeZone;
use crate::protocol::primitive::*;

/// DATE / 4-byte DATETIME prefix: year, month, day.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
pub struct Timestamp4 {
    year: [u8; 2],
    pub month: u8,
    pub day: u8,
}

/// 7-byte DATETIME: date plus hour/minute/second.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
pub struct Timestamp7 {
    pub date: Timestamp4,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// 11-byte DATETIME: everything plus microseconds.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
pub struct Timestamp11 {
    pub time: Timestamp7,
    micros: U32LE,
}

/// 8-byte TIME: sign, day count, hour/minute/second.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
pub struct Time8 {
    pub negative: u8,
    days: U32LE,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// 12-byte TIME: everything plus microseconds.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
pub struct Time12 {
    pub time: Time8,
    micros: U32LE,
}

impl Timestamp4 {
    pub fn year(&self) -> u16 {
        u16::from_le_bytes(self.year)
    }
}

impl Timestamp11 {
    pub fn micros(&self) -> u32 {
        self.micros.get()
    }
}

impl Time8 {
    pub fn days(&self) -> u32 {
        self.days.get()
    }

    /// Day count carried into hours.
    pub fn total_hours(&self) -> u64 {
        self.days() as u64 * 24 + self.hour as u64
    }
}

impl Time12 {
    pub fn micros(&self) -> u32 {
        self.micros.get()
    }
}

/// A decoded DATE/DATETIME/TIMESTAMP value of any wire width.
#[derive(Debug, Clone, Copy)]
pub enum DateTimeValue<'a> {
    /// 0-byte form, rendered `0000-00-00`.
    Zero,
    Date(&'a Timestamp4),
    DateTime(&'a Timestamp7),
    DateTimeMicro(&'a Timestamp11),
}

/// A decoded TIME value of any wire width.
#[derive(Debug, Clone, Copy)]
pub enum TimeValue<'a> {
    /// 0-byte form, rendered `00:00:00`.
    Zero,
    Time(&'a Time8),
    TimeMicro(&'a Time12),
}

/// Read a length-prefixed binary DATE/DATETIME/TIMESTAMP value.
pub fn read_datetime(data: &[u8]) -> Result<(DateTimeValue<'_>, &[u8])> {
    let (len, data) = read_int_1(data)?;
    let (raw, rest) = read_string_fix(data, len as usize)?;
    let value = match len {
        0 => DateTimeValue::Zero,
        4 => DateTimeValue::Date(
            Timestamp4::ref_from_bytes(raw).map_err(|_| Error::MalformedPacket)?,
        ),
        7 => DateTimeValue::DateTime(
            Timestamp7::ref_from_bytes(raw).map_err(|_| Error::MalformedPacket)?,
        ),
        11 => DateTimeValue::DateTimeMicro(
            Timestamp11::ref_from_bytes(raw).map_err(|_| Error::MalformedPacket)?,
        ),
        _ => return Err(Error::MalformedPacket),
    };
    Ok((value, rest))
}

/// Read a length-prefixed binary TIME value.
pub fn read_time(data: &[u8]) -> Result<(TimeValue<'_>, &[u8])> {
    let (len, data) = read_int_1(data)?;
    let (raw, rest) = read_string_fix(data, len as usize)?;
    let value = match len {
        0 => TimeValue::Zero,
        8 => TimeValue::Time(Time8::ref_from_bytes(raw).map_err(|_| Error::MalformedPacket)?),
        12 => TimeValue::TimeMicro(Time12::ref_from_bytes(raw).map_err(|_| Error::MalformedPacket)?),
        _ => return Err(Error::MalformedPacket),
    };
    Ok((value, rest))
}

impl fmt::Display for DateTimeValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateTimeValue::Zero => f.write_str("0000-00-00"),
            DateTimeValue::Date(d) => {
                write!(f, "{:04}-{:02}-{:02}", d.year(), d.month, d.day)
            }
            DateTimeValue::DateTime(t) => write!(
                f,
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                t.date.year(),
                t.date.month,
                t.date.day,
                t.hour,
                t.minute,
                t.second
            ),
            DateTimeValue::DateTimeMicro(t) => write!(
                f,
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                t.time.date.year(),
                t.time.date.month,
                t.time.date.day,
                t.time.hour,
                t.time.minute,
                t.time.second,
                t.micros()
            ),
        }
    }
}

impl fmt::Display for TimeValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Zero => f.write_str("00:00:00"),
            TimeValue::Time(t) => {
                let sign = if t.negative != 0 { "-" } else { "" };
                write!(
                    f,
                    "{sign}{:02}:{:02}:{:02}",
                    t.total_hours(),
                    t.minute,
                    t.second
                )
            }
            TimeValue::TimeMicro(t) => {
                let sign = if t.time.negative != 0 { "-" } else { "" };
                write!(
                    f,
                    "{sign}{:02}:{:02}:{:02}.{:06}",
                    t.time.total_hours(),
                    t.time.minute,
                    t.time.second,
                    t.micros()
                )
            }
        }
    }
}

impl DateTimeValue<'_> {
    /// Convert to a timestamp in the connection's configured location.
    /// The zero value and out-of-range dates yield `None`.
    pub fn to_chrono(&self, loc: TimeZone) -> Option<chrono::DateTime<FixedOffset>> {
        let naive = self.to_naive()?;
        Some(match loc {
            TimeZone::Utc => naive.and_utc().fixed_offset(),
            TimeZone::Local => chrono::Local
                .from_local_datetime(&naive)
                .earliest()?
                .fixed_offset(),
            TimeZone::Fixed(offset) => offset.from_local_datetime(&naive).earliest()?,
        })
    }

    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        let (date, h, m, s, micro) = match self {
            DateTimeValue::Zero => return None,
            DateTimeValue::Date(d) => (**d, 0, 0, 0, 0),
            DateTimeValue::DateTime(t) => (t.date, t.hour, t.minute, t.second, 0),
            DateTimeValue::DateTimeMicro(t) => (
                t.time.date,
                t.time.hour,
                t.time.minute,
                t.time.second,
                t.micros(),
            ),
        };
        NaiveDate::from_ymd_opt(date.year() as i32, date.month as u32, date.day as u32)?
            .and_hms_micro_opt(h as u32, m as u32, s as u32, micro)
    }
}

/// Shift a UTC-naive timestamp into the configured location's wall-clock
/// rendering. Used when encoding parameters.
pub fn naive_in_location(value: &NaiveDateTime, loc: crate::opts::TimeZone) -> NaiveDateTime {
    match loc {
        crate::opts::TimeZone::Utc => *value,
        crate::opts::TimeZone::Local => chrono::Local.from_utc_datetime(value).naive_local(),
        crate::opts::TimeZone::Fixed(offset) => offset.from_utc_datetime(value).naive_local(),
    }
}

/// Write a binary DATETIME value, choosing the shortest wire form.
pub fn write_datetime(out: &mut Vec<u8>, value: &NaiveDateTime) {
    let micros = value.and_utc().timestamp_subsec_micros();
    let (h, m, s) = (value.hour(), value.minute(), value.second());
    let len: u8 = if micros != 0 {
        11
    } else if (h, m, s) != (0, 0, 0) {
        7
    } else {
        4
    };
    write_int_1(out, len);
    write_int_2(out, value.year() as u16);
    write_int_1(out, value.month() as u8);
    write_int_1(out, value.day() as u8);
    if len >= 7 {
        write_int_1(out, h as u8);
        write_int_1(out, m as u8);
        write_int_1(out, s as u8);
    }
    if len == 11 {
        write_int_4(out, micros);
    }
}

/// Write a binary TIME value from a signed duration.
pub fn write_time(out: &mut Vec<u8>, value: chrono::TimeDelta) {
    let negative = value < chrono::TimeDelta::zero();
    let value = value.abs();
    let secs = value.num_seconds();
    let micros = value.subsec_nanos() as u32 / 1000;
    if secs == 0 && micros == 0 {
        write_int_1(out, 0);
        return;
    }
    let len: u8 = if micros != 0 { 12 } else { 8 };
    write_int_1(out, len);
    write_int_1(out, negative as u8);
    write_int_4(out, (secs / 86_400) as u32);
    write_int_1(out, ((secs % 86_400) / 3600) as u8);
    write_int_1(out, ((secs % 3600) / 60) as u8);
    write_int_1(out, (secs % 60) as u8);
    if len == 12 {
        write_int_4(out, micros);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn datetime_widths() {
        let (v, rest) = read_datetime(&[0]).unwrap();
        assert!(rest.is_empty());
        assert_eq!(v.to_string(), "0000-00-00");

        let (v, _) = read_datetime(&[4, 0xE8, 0x07, 6, 15]).unwrap();
        assert_eq!(v.to_string(), "2024-06-15");

        let (v, _) = read_datetime(&[7, 0xE8, 0x07, 6, 15, 13, 5, 9]).unwrap();
        assert_eq!(v.to_string(), "2024-06-15 13:05:09");

        let (v, _) =
            read_datetime(&[11, 0xE8, 0x07, 6, 15, 13, 5, 9, 0x40, 0xE2, 0x01, 0x00]).unwrap();
        assert_eq!(v.to_string(), "2024-06-15 13:05:09.123456");
    }

    #[test]
    fn datetime_rejects_other_lengths() {
        assert!(read_datetime(&[3, 1, 2, 3]).is_err());
        assert!(read_datetime(&[5, 1, 2, 3, 4, 5]).is_err());
    }

    #[test]
    fn time_rendering_carries_days_into_hours() {
        // 2 days, 3:04:05 -> 51:04:05
        let raw = [8u8, 0, 2, 0, 0, 0, 3, 4, 5];
        let (v, _) = read_time(&raw).unwrap();
        assert_eq!(v.to_string(), "51:04:05");

        // negative with microseconds
        let raw = [12u8, 1, 0, 0, 0, 0, 0, 0, 1, 0x40, 0xE2, 0x01, 0x00];
        let (v, _) = read_time(&raw).unwrap();
        assert_eq!(v.to_string(), "-00:00:01.123456");
    }

    #[test]
    fn time_rejects_other_lengths() {
        assert!(read_time(&[4, 1, 2, 3, 4]).is_err());
    }

    #[test]
    fn datetime_write_shortest_form() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();

        let mut out = Vec::new();
        write_datetime(&mut out, &date.and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(out[0], 4);

        out.clear();
        write_datetime(&mut out, &date.and_hms_opt(13, 5, 9).unwrap());
        assert_eq!(out[0], 7);

        out.clear();
        write_datetime(&mut out, &date.and_hms_micro_opt(13, 5, 9, 42).unwrap());
        assert_eq!(out[0], 11);

        // what we wrote reads back
        let (v, rest) = read_datetime(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(v.to_string(), "2024-06-15 13:05:09.000042");
    }

    #[test]
    fn time_write_round_trip() {
        let mut out = Vec::new();
        write_time(&mut out, chrono::TimeDelta::seconds(-(2 * 86_400 + 3 * 3600 + 4 * 60 + 5)));
        let (v, rest) = read_time(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(v.to_string(), "-51:04:05");

        out.clear();
        write_time(&mut out, chrono::TimeDelta::zero());
        assert_eq!(out, [0]);
    }

    #[test]
    fn chrono_conversion_respects_location() {
        let raw = [7u8, 0xE8, 0x07, 1, 2, 3, 4, 5];
        let (v, _) = read_datetime(&raw).unwrap();
        let utc = v.to_chrono(TimeZone::Utc).unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        let off = FixedOffset::east_opt(9 * 3600).unwrap();
        let tokyo = v.to_chrono(TimeZone::Fixed(off)).unwrap();
        assert_eq!(tokyo.to_rfc3339(), "2024-01-02T03:04:05+09:00");
    }
}
