//! Lenient parsing of the connection descriptor.
//!
//! The descriptor is usually pasted by hand into a hosting dashboard, so it
//! tends to arrive wrapped in prose (`const cfg = {...};`), with bare keys or
//! single-quoted strings. Strict JSON is tried first; only when that fails are
//! the repair rules below applied, one after another, before a second parse.
//!
//! Repair rules:
//! - `single_quotes`: `'text'` becomes `"text"` (inner `"` is escaped).
//! - `bare_keys`: an identifier key right after `{` or `,` gets double quotes.
//!
//! Any other malformation is reported, not guessed at.

use std::error::Error;
use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

pub const REQUIRED_FIELD: &str = "apiKey";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    SourceNotFound,
    Malformed(String),
    MissingRequiredField(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::SourceNotFound => write!(f, "configuration source not found"),
            ConfigError::Malformed(reason) => {
                write!(f, "configuration is not valid JSON even after repair: {}", reason)
            }
            ConfigError::MissingRequiredField(field) => {
                write!(f, "configuration is missing required field '{}'", field)
            }
        }
    }
}

impl Error for ConfigError {}

/// A parsed connection descriptor. Always holds a non-empty `apiKey`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDescriptor(Map<String, Value>);

impl ConnectionDescriptor {
    pub fn api_key(&self) -> &str {
        self.0
            .get(REQUIRED_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn project_id(&self) -> Option<&str> {
        self.0.get("projectId").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

pub fn parse_structured_config(raw: Option<&str>) -> Result<ConnectionDescriptor, ConfigError> {
    let raw = match raw.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ => return Err(ConfigError::SourceNotFound),
    };

    let candidate = extract_braced_block(raw);
    let value = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => value,
        Err(_) => {
            let repaired = quote_bare_keys(&double_quote_strings(candidate));
            serde_json::from_str::<Value>(&repaired)
                .map_err(|e| ConfigError::Malformed(e.to_string()))?
        }
    };

    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(ConfigError::Malformed(format!(
                "expected an object, found {}",
                json_kind(&other)
            )))
        }
    };

    match map.get(REQUIRED_FIELD).and_then(Value::as_str) {
        Some(key) if !key.trim().is_empty() => Ok(ConnectionDescriptor(map)),
        _ => Err(ConfigError::MissingRequiredField(REQUIRED_FIELD)),
    }
}

/// Slices from the first `{` through the last `}`; returns the input untouched otherwise.
fn extract_braced_block(raw: &str) -> &str {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    }
}

fn double_quote_strings(text: &str) -> String {
    static SINGLE_QUOTED: OnceLock<Regex> = OnceLock::new();
    let rule = SINGLE_QUOTED
        .get_or_init(|| Regex::new(r"'((?:[^'\\]|\\.)*)'").expect("valid single-quote rule"));

    rule.replace_all(text, |caps: &Captures| {
        let inner = caps[1].replace("\\'", "'").replace('"', "\\\"");
        format!("\"{}\"", inner)
    })
    .into_owned()
}

fn quote_bare_keys(text: &str) -> String {
    static BARE_KEY: OnceLock<Regex> = OnceLock::new();
    let rule = BARE_KEY.get_or_init(|| {
        Regex::new(r"([{,]\s*)([A-Za-z_$][A-Za-z0-9_$]*)(\s*):").expect("valid bare-key rule")
    });

    rule.replace_all(text, "${1}\"${2}\"${3}:").into_owned()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
