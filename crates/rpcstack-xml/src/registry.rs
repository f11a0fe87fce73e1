//! Type-tag registry: maps XML-RPC type tag names to value decoders.
//!
//! The registry is built once from a [`DecoderConfig`] and never mutated
//! afterwards, so a single instance can serve concurrent decodes.

use std::collections::HashMap;

use base64::Engine;
use bytes::Bytes;
use chrono::NaiveDateTime;
use rpcstack_model::Value;

use crate::config::DecoderConfig;
use crate::error::DecodeError;

/// Naive timestamp layouts accepted for `dateTime.iso8601`, tried in order.
/// `%.f` also matches an absent fraction.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y%m%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y%m%dT%H%M%S",
    "%Y%m%dT%H:%M:%S%.fZ",
];

/// The value kinds a type tag can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// `string`, or any unknown tag under the string fallback.
    String,
    /// `int` / `i4`.
    Int,
    /// `i8`.
    Long,
    /// `boolean`.
    Boolean,
    /// `double`.
    Double,
    /// `dateTime.iso8601`.
    DateTime,
    /// `base64`.
    Base64,
    /// `struct`.
    Struct,
    /// `array`.
    Array,
    /// `nil`.
    Nil,
}

impl ValueType {
    /// Returns `true` for types whose content is child elements, not text.
    #[must_use]
    pub fn is_container(self) -> bool {
        matches!(self, Self::Struct | Self::Array)
    }

    /// Decode the text content of a scalar element.
    ///
    /// # Errors
    ///
    /// Returns a `TypeCoercion` error when the text does not fit the type,
    /// and a `Structural` error when called on a container type.
    pub fn decode_scalar(self, text: String) -> Result<Value, DecodeError> {
        match self {
            Self::String => Ok(Value::String(text)),
            Self::Int => decode_int(&text),
            Self::Long => decode_long(&text),
            Self::Boolean => decode_boolean(&text),
            Self::Double => decode_double(&text),
            Self::DateTime => decode_datetime(&text),
            Self::Base64 => decode_base64(&text),
            Self::Nil => decode_nil(&text),
            Self::Struct | Self::Array => Err(DecodeError::structural(format!(
                "{self:?} content must be child elements"
            ))),
        }
    }
}

/// Read-only lookup table from type tag name to [`ValueType`].
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<&'static str, ValueType>,
    unknown_as_string: bool,
}

impl TypeRegistry {
    /// Build the registry for the given configuration.
    ///
    /// The standard XML-RPC types are always present; `i8`, `nil` and the
    /// `ex:` extension tags are registered only when enabled.
    #[must_use]
    pub fn new(config: &DecoderConfig) -> Self {
        let mut types = HashMap::from([
            ("string", ValueType::String),
            ("int", ValueType::Int),
            ("i4", ValueType::Int),
            ("boolean", ValueType::Boolean),
            ("double", ValueType::Double),
            ("dateTime.iso8601", ValueType::DateTime),
            ("base64", ValueType::Base64),
            ("struct", ValueType::Struct),
            ("array", ValueType::Array),
        ]);

        if config.allow_i8 {
            types.insert("i8", ValueType::Long);
        }
        if config.allow_nil {
            types.insert("nil", ValueType::Nil);
        }
        if config.apache_extensions {
            types.insert("ex:i8", ValueType::Long);
            types.insert("ex:nil", ValueType::Nil);
        }

        Self {
            types,
            unknown_as_string: config.unknown_types_as_string,
        }
    }

    /// Look up a tag without applying the unknown-tag fallback.
    #[must_use]
    pub fn lookup(&self, tag: &str) -> Option<ValueType> {
        self.types.get(tag).copied()
    }

    /// Resolve a tag, applying the unknown-tag fallback when configured.
    ///
    /// # Errors
    ///
    /// Returns an `UnsupportedType` error for unknown tags when the fallback
    /// is disabled.
    pub fn resolve(&self, tag: &str) -> Result<ValueType, DecodeError> {
        if let Some(value_type) = self.lookup(tag) {
            return Ok(value_type);
        }
        if self.unknown_as_string {
            tracing::warn!(tag, "decoding unknown XML-RPC type as string");
            return Ok(ValueType::String);
        }
        Err(DecodeError::unsupported_type(tag))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(&DecoderConfig::default())
    }
}

fn decode_int(text: &str) -> Result<Value, DecodeError> {
    let s = text.trim();
    s.parse::<i32>()
        .map(Value::Int)
        .map_err(|e| DecodeError::type_coercion(format!("invalid int '{s}': {e}")))
}

fn decode_long(text: &str) -> Result<Value, DecodeError> {
    let s = text.trim();
    s.parse::<i64>()
        .map(Value::Long)
        .map_err(|e| DecodeError::type_coercion(format!("invalid i8 '{s}': {e}")))
}

fn decode_boolean(text: &str) -> Result<Value, DecodeError> {
    match text.trim() {
        "1" => Ok(Value::Boolean(true)),
        "0" => Ok(Value::Boolean(false)),
        s if s.eq_ignore_ascii_case("true") => Ok(Value::Boolean(true)),
        s if s.eq_ignore_ascii_case("false") => Ok(Value::Boolean(false)),
        s => Err(DecodeError::type_coercion(format!("invalid boolean: {s}"))),
    }
}

fn decode_double(text: &str) -> Result<Value, DecodeError> {
    let s = text.trim();
    s.parse::<f64>()
        .map(Value::Double)
        .map_err(|e| DecodeError::type_coercion(format!("invalid double '{s}': {e}")))
}

fn decode_datetime(text: &str) -> Result<Value, DecodeError> {
    let s = text.trim();
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Value::DateTime(dt));
        }
    }
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| Value::DateTime(dt.naive_utc()))
        .map_err(|e| DecodeError::type_coercion(format!("invalid dateTime.iso8601 '{s}': {e}")))
}

fn decode_base64(text: &str) -> Result<Value, DecodeError> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map(|decoded| Value::Base64(Bytes::from(decoded)))
        .map_err(|e| DecodeError::type_coercion(format!("invalid base64: {e}")))
}

fn decode_nil(text: &str) -> Result<Value, DecodeError> {
    if text.trim().is_empty() {
        Ok(Value::Nil)
    } else {
        Err(DecodeError::type_coercion(format!(
            "nil must be empty, found '{}'",
            text.trim()
        )))
    }
}
