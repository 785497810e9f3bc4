//! Client-side parameter interpolation.
//!
//! Replaces each `?` placeholder with a literal rendering of the
//! corresponding argument, saving a server round trip. `?` inside string
//! literals is not recognized; that ambiguity, a placeholder/argument
//! mismatch, or an oversized rendering all make the caller fall back to a
//! server-side prepare instead.

use crate::constant::ServerStatusFlags;
use crate::error::Result;
use crate::opts::TimeZone;
use crate::protocol::datetime::naive_in_location;
use crate::protocol::param::ParamValue;

/// Outcome of an interpolation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interpolation {
    /// The fully rendered query. Bytes, because `_binary'...'` literals may
    /// not be valid UTF-8.
    Done(Vec<u8>),
    /// Placeholders and arguments disagree, or the rendering outgrew
    /// `max_allowed_packet`: use the server-side prepare path.
    Skip,
}

/// Escape one byte using backslash escapes (`NO_BACKSLASH_ESCAPES` clear).
fn escape_byte_backslash(out: &mut Vec<u8>, byte: u8) {
    match byte {
        0 => out.extend_from_slice(b"\\0"),
        b'\n' => out.extend_from_slice(b"\\n"),
        b'\r' => out.extend_from_slice(b"\\r"),
        0x1a => out.extend_from_slice(b"\\Z"),
        b'\'' => out.extend_from_slice(b"\\'"),
        b'\\' => out.extend_from_slice(b"\\\\"),
        byte => out.push(byte),
    }
}

/// Escape a string with backslash escapes (`NO_BACKSLASH_ESCAPES` clear).
pub fn escape_bytes_backslash(out: &mut Vec<u8>, value: &[u8]) {
    for &byte in value {
        escape_byte_backslash(out, byte);
    }
}

/// Escape a string by doubling quotes (`NO_BACKSLASH_ESCAPES` set).
pub fn escape_bytes_quotes(out: &mut Vec<u8>, value: &[u8]) {
    for &byte in value {
        if byte == b'\'' {
            out.extend_from_slice(b"''");
        } else {
            out.push(byte);
        }
    }
}

fn escape_into(out: &mut Vec<u8>, value: &[u8], no_backslash_escapes: bool) {
    if no_backslash_escapes {
        escape_bytes_quotes(out, value);
    } else {
        escape_bytes_backslash(out, value);
    }
}

/// Interpolate `query`, or decide to skip back to the server-side path.
pub fn interpolate_params(
    query: &str,
    params: &[ParamValue<'_>],
    status: ServerStatusFlags,
    loc: TimeZone,
    max_allowed_packet: usize,
) -> Result<Interpolation> {
    if query.matches('?').count() != params.len() {
        return Ok(Interpolation::Skip);
    }

    let no_backslash_escapes =
        status.contains(ServerStatusFlags::SERVER_STATUS_NO_BACKSLASH_ESCAPES);
    let mut out = Vec::with_capacity(query.len() + params.len() * 16);
    let mut params_iter = params.iter();

    for segment in query.split('?') {
        out.extend_from_slice(segment.as_bytes());
        let Some(param) = params_iter.next() else {
            continue;
        };
        match param {
            ParamValue::Null => out.extend_from_slice(b"NULL"),
            ParamValue::Int(v) => out.extend_from_slice(v.to_string().as_bytes()),
            ParamValue::UInt(v) => out.extend_from_slice(v.to_string().as_bytes()),
            // shortest round-trip renderings
            ParamValue::Float(v) => out.extend_from_slice(v.to_string().as_bytes()),
            ParamValue::Double(v) => out.extend_from_slice(v.to_string().as_bytes()),
            ParamValue::Bool(v) => out.push(if *v { b'1' } else { b'0' }),
            ParamValue::Str(v) | ParamValue::Json(v) => {
                out.push(b'\'');
                escape_into(&mut out, v.as_bytes(), no_backslash_escapes);
                out.push(b'\'');
            }
            ParamValue::Bytes(v) => {
                out.extend_from_slice(b"_binary'");
                escape_into(&mut out, v, no_backslash_escapes);
                out.push(b'\'');
            }
            ParamValue::DateTime(v) => {
                let rendered = naive_in_location(v, loc)
                    .format("%Y-%m-%d %H:%M:%S%.6f")
                    .to_string();
                out.push(b'\'');
                out.extend_from_slice(rendered.as_bytes());
                out.push(b'\'');
            }
            ParamValue::Time(v) => {
                let negative = *v < chrono::TimeDelta::zero();
                let abs = v.abs();
                let secs = abs.num_seconds();
                let micros = abs.subsec_nanos() / 1000;
                out.push(b'\'');
                if negative {
                    out.push(b'-');
                }
                let rendered = format!(
                    "{:02}:{:02}:{:02}.{:06}",
                    secs / 3600,
                    (secs % 3600) / 60,
                    secs % 60,
                    micros
                );
                out.extend_from_slice(rendered.as_bytes());
                out.push(b'\'');
            }
        }

        if out.len() > max_allowed_packet {
            return Ok(Interpolation::Skip);
        }
    }

    Ok(Interpolation::Done(out))
}

#[cfg(test)]
#[path = "interpolate_test.rs"]
mod interpolate_test;
