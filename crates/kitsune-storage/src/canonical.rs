//! Canonical text encoding of a token's `events` claim.
//!
//! The stored text has object keys sorted at every level, `", "` and `": "`
//! separators, and non-ASCII characters escaped as `\uXXXX`. This matches the
//! text written by the legacy Python service, so rows from both writers can be
//! compared byte-for-byte.
//!
//! Numbers keep the text they arrived with (serde_json's
//! `arbitrary_precision`). Integers of any size are written verbatim. Other
//! numbers are written as the nearest double in Python `repr` form
//! (`1e+16`, `100000.0`, `1e-05`), so they compare equal by value after a
//! decode, not always by text.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};

use crate::error::StorageError;

/// Encodes an `events` mapping as canonical text.
///
/// # Errors
///
/// Returns `StorageError::InvalidRecord` if serialization fails.
pub fn encode_events(events: &Map<String, Value>) -> Result<String, StorageError> {
    let sorted = sort_keys_map(events);
    let mut buf = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut buf, LegacyFormatter);
    sorted.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| StorageError::invalid_record(e.to_string()))
}

/// Parses canonical (or any JSON object) text back into an `events` mapping.
///
/// # Errors
///
/// Returns `StorageError::InvalidRecord` if the text is not a JSON object.
pub fn decode_events(text: &str) -> Result<Map<String, Value>, StorageError> {
    match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::invalid_record(format!(
            "events must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn sort_keys_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), sort_keys(v)))
        .collect()
}

// Rebuilding in sorted order keeps the output stable even if serde_json is
// compiled with `preserve_order`.
fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sort_keys_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Shortest round-trip digits, positional when the decimal exponent is in
/// `[-4, 16)`, otherwise `d.ddde±XX`.
fn float_repr(value: f64) -> String {
    let sci = format!("{value:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return sci;
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    // Position of the decimal point relative to the first digit.
    let point = exp + 1;
    if (-3..=16).contains(&point) {
        let shift = point.unsigned_abs() as usize;
        if point <= 0 {
            format!("{sign}0.{}{digits}", "0".repeat(shift))
        } else if shift >= digits.len() {
            format!("{sign}{digits}{}.0", "0".repeat(shift - digits.len()))
        } else {
            let (int_part, frac_part) = digits.split_at(shift);
            format!("{sign}{int_part}.{frac_part}")
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let exp_sign = if exp < 0 { '-' } else { '+' };
        let dot = if rest.is_empty() { "" } else { "." };
        format!("{sign}{first}{dot}{rest}e{exp_sign}{:02}", exp.unsigned_abs())
    }
}

struct LegacyFormatter;

impl Formatter for LegacyFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_number_str<W>(&mut self, writer: &mut W, value: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if is_integer_literal(value) {
            let text = if value == "-0" { "0" } else { value };
            return writer.write_all(text.as_bytes());
        }
        match value.parse::<f64>() {
            Ok(f) if f.is_finite() => writer.write_all(float_repr(f).as_bytes()),
            _ => writer.write_all(value.as_bytes()),
        }
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(&bytes[start..i])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(&bytes[start..])
    }
}
