use pretty_assertions::assert_eq;

use crate::constant::ServerStatusFlags;
use crate::interpolate::{Interpolation, interpolate_params};
use crate::opts::TimeZone;
use crate::protocol::param::ParamValue;

fn run(query: &str, params: &[ParamValue<'_>], status: ServerStatusFlags) -> Interpolation {
    interpolate_params(query, params, status, TimeZone::Utc, 1 << 20).unwrap()
}

fn done(query: &str, params: &[ParamValue<'_>]) -> String {
    match run(query, params, ServerStatusFlags::empty()) {
        Interpolation::Done(bytes) => String::from_utf8(bytes).unwrap(),
        Interpolation::Skip => panic!("unexpected skip"),
    }
}

#[test]
fn int_and_string() {
    assert_eq!(
        done("SELECT ?+?", &[ParamValue::Int(42), ParamValue::Str("gopher")]),
        "SELECT 42+'gopher'"
    );
}

#[test]
fn placeholder_mismatch_skips() {
    assert_eq!(
        run("SELECT ?+?", &[ParamValue::Int(1)], ServerStatusFlags::empty()),
        Interpolation::Skip
    );
    assert_eq!(
        run(
            "SELECT ?",
            &[ParamValue::Int(1), ParamValue::Int(2)],
            ServerStatusFlags::empty()
        ),
        Interpolation::Skip
    );
}

#[test]
fn null_bool_and_floats() {
    assert_eq!(
        done(
            "VALUES (?, ?, ?, ?)",
            &[
                ParamValue::Null,
                ParamValue::Bool(true),
                ParamValue::Bool(false),
                ParamValue::Double(1.25),
            ]
        ),
        "VALUES (NULL, 1, 0, 1.25)"
    );
}

#[test]
fn backslash_escaping() {
    assert_eq!(
        done("SELECT ?", &[ParamValue::Str("a'b\\c\nd")]),
        "SELECT 'a\\'b\\\\c\\nd'"
    );
}

#[test]
fn quote_doubling_under_no_backslash_escapes() {
    let rendered = match run(
        "SELECT ?",
        &[ParamValue::Str("a'b\\c")],
        ServerStatusFlags::SERVER_STATUS_NO_BACKSLASH_ESCAPES,
    ) {
        Interpolation::Done(bytes) => String::from_utf8(bytes).unwrap(),
        Interpolation::Skip => panic!("unexpected skip"),
    };
    assert_eq!(rendered, "SELECT 'a''b\\c'");
}

#[test]
fn quote_doubling_round_trips_through_a_tokenizer() {
    // Doubled-quote form: un-escaping '' back to ' must restore the input.
    let input = "it's a 'quoted' string, isn't it";
    let rendered = match run(
        "?",
        &[ParamValue::Str(input)],
        ServerStatusFlags::SERVER_STATUS_NO_BACKSLASH_ESCAPES,
    ) {
        Interpolation::Done(bytes) => String::from_utf8(bytes).unwrap(),
        Interpolation::Skip => panic!("unexpected skip"),
    };
    let inner = rendered
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap();
    assert_eq!(inner.replace("''", "'"), input);
}

#[test]
fn binary_literal() {
    assert_eq!(
        done("INSERT INTO t VALUES (?)", &[ParamValue::Bytes(b"a\x00b")]),
        "INSERT INTO t VALUES (_binary'a\\0b')"
    );
}

#[test]
fn datetime_rendering_with_microseconds() {
    let value = chrono::NaiveDate::from_ymd_opt(2024, 6, 15)
        .unwrap()
        .and_hms_micro_opt(13, 5, 9, 123456)
        .unwrap();
    assert_eq!(
        done("SELECT ?", &[ParamValue::DateTime(value)]),
        "SELECT '2024-06-15 13:05:09.123456'"
    );
}

#[test]
fn oversized_rendering_skips() {
    let big = "x".repeat(64);
    let outcome = interpolate_params(
        "SELECT ?",
        &[ParamValue::Str(&big)],
        ServerStatusFlags::empty(),
        TimeZone::Utc,
        32,
    )
    .unwrap();
    assert_eq!(outcome, Interpolation::Skip);
}
