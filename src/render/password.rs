//! Password-shape discrimination
//!
//! A registry password is either plain text or a structured JSON blob (for
//! example a GCE service-account key). Plain text is emitted as an escaped
//! TOML basic string; a blob is serialized to JSON and emitted verbatim inside
//! a TOML literal string.

use crate::error::{CharmError, Result};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::io;
use toml_edit::Value;

/// Registry password
#[derive(Clone, PartialEq, Eq)]
pub enum Password {
    /// Plain-text password, rendered double-quoted and escaped
    PlainText(String),
    /// Structured credential, rendered as single-quoted JSON
    JsonBlob(Map<String, serde_json::Value>),
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Password::PlainText(_) => write!(f, "PlainText(<redacted>)"),
            Password::JsonBlob(map) => write!(f, "JsonBlob({} keys)", map.len()),
        }
    }
}

impl Password {
    /// Classify a raw JSON password value.
    ///
    /// Returns `Ok(None)` for `null` and the empty string. A string whose
    /// content is itself a JSON object is rejected: it could be meant either
    /// way, so the caller must supply the object form explicitly.
    pub fn classify(value: &JsonValue) -> Result<Option<Password>> {
        match value {
            JsonValue::Null => Ok(None),
            JsonValue::String(s) if s.is_empty() => Ok(None),
            JsonValue::String(s) => {
                if let Ok(JsonValue::Object(_)) = serde_json::from_str::<JsonValue>(s.trim()) {
                    return Err(CharmError::Validation(
                        "password is a string containing a JSON object; supply it as an object instead"
                            .to_string(),
                    ));
                }
                Ok(Some(Password::PlainText(s.clone())))
            }
            JsonValue::Object(map) => Ok(Some(Password::JsonBlob(map.clone()))),
            other => Err(CharmError::Validation(format!(
                "password must be a string or an object, got {}",
                json_kind(other)
            ))),
        }
    }

    /// TOML value for this password
    pub fn to_toml(&self) -> Result<Value> {
        match self {
            Password::PlainText(s) => basic_string(s),
            Password::JsonBlob(map) => {
                let json = spaced_json(map)?;
                if json.contains('\'') {
                    return Err(CharmError::Validation(
                        "JSON password cannot contain a single quote".to_string(),
                    ));
                }
                if json.chars().any(|c| c.is_control() && c != '\t') {
                    return Err(CharmError::Validation(
                        "JSON password cannot contain control characters".to_string(),
                    ));
                }
                parse_value(&format!("'{}'", json))
            }
        }
    }
}

/// Double-quoted TOML basic string.
///
/// JSON string escapes are a subset of TOML's; DEL is the one character
/// TOML additionally requires escaped.
fn basic_string(s: &str) -> Result<Value> {
    let quoted = serde_json::to_string(s)?.replace('\u{7f}', "\\u007F");
    parse_value(&quoted)
}

fn parse_value(repr: &str) -> Result<Value> {
    let mut value: Value = repr
        .parse()
        .map_err(|e| CharmError::Validation(format!("password is not expressible in TOML: {}", e)))?;
    value.decor_mut().clear();
    Ok(value)
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// JSON with `", "` and `": "` separators, keys in insertion order
fn spaced_json(map: &Map<String, JsonValue>) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    map.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| CharmError::Internal(format!("JSON was not UTF-8: {}", e)))
}

struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
