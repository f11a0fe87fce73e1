//! XML-RPC `Value` type.
//!
//! `Value` is a tagged union over the XML-RPC scalar and container types.
//! Struct members keep document order; member names are unique once the
//! decoder has applied its duplicate-member policy.

use std::fmt;

use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Timestamp format used for the JSON view of `dateTime.iso8601` values.
const JSON_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// A decoded XML-RPC value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `<string>` or bare text.
    String(String),
    /// `<int>` / `<i4>`, a signed 32-bit integer.
    Int(i32),
    /// `<i8>` extension, a signed 64-bit integer.
    Long(i64),
    /// `<boolean>`.
    Boolean(bool),
    /// `<double>`.
    Double(f64),
    /// `<dateTime.iso8601>`. XML-RPC timestamps carry no timezone.
    DateTime(NaiveDateTime),
    /// `<base64>`, already decoded.
    Base64(Bytes),
    /// `<struct>`: ordered `(name, value)` members.
    Struct(Vec<(String, Value)>),
    /// `<array>`: values in document order.
    Array(Vec<Value>),
    /// `<nil/>` extension.
    Nil,
}

impl Value {
    /// Returns the XML-RPC type tag of this value (e.g. `"int"`, `"struct"`).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Long(_) => "i8",
            Self::Boolean(_) => "boolean",
            Self::Double(_) => "double",
            Self::DateTime(_) => "dateTime.iso8601",
            Self::Base64(_) => "base64",
            Self::Struct(_) => "struct",
            Self::Array(_) => "array",
            Self::Nil => "nil",
        }
    }

    /// Returns `true` if this is a string value.
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// Returns `true` if this is a struct value.
    #[must_use]
    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// Returns `true` if this is an array value.
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns `true` if this is the nil value.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns the string if this is a `String` variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int` variant.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the integer widened to 64 bits for `Int` and `Long` variants.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i64::from(*i)),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Boolean` variant.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the double if this is a `Double` variant.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a `DateTime` variant.
    #[must_use]
    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Returns the decoded bytes if this is a `Base64` variant.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Base64(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the members if this is a `Struct` variant.
    #[must_use]
    pub fn as_struct(&self) -> Option<&[(String, Value)]> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Returns the elements if this is an `Array` variant.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a struct member by name.
    ///
    /// Returns `None` for non-struct values and for missing members.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_struct()?
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, value)| value)
    }

    /// Takes the text out of a `String` variant, or hands the value back.
    pub fn into_string(mut self) -> Result<String, Value> {
        if let Self::String(text) = &mut self {
            return Ok(std::mem::take(text));
        }
        Err(self)
    }

    /// Takes the members out of a `Struct` variant, or hands the value back.
    pub fn into_struct(mut self) -> Result<Vec<(String, Value)>, Value> {
        if let Self::Struct(members) = &mut self {
            return Ok(std::mem::take(members));
        }
        Err(self)
    }

    /// Takes the elements out of an `Array` variant, or hands the value back.
    pub fn into_array(mut self) -> Result<Vec<Value>, Value> {
        if let Self::Array(items) = &mut self {
            return Ok(std::mem::take(items));
        }
        Err(self)
    }
}

/// Containers are torn down through a heap worklist, so dropping an
/// arbitrarily nested value never recurses.
impl Drop for Value {
    fn drop(&mut self) {
        let mut pending = match self {
            Self::Array(items) if !items.is_empty() => std::mem::take(items),
            Self::Struct(members) if !members.is_empty() => {
                members.drain(..).map(|(_, value)| value).collect()
            }
            _ => return,
        };

        while let Some(mut value) = pending.pop() {
            match &mut value {
                Self::Array(items) => pending.append(items),
                Self::Struct(members) => pending.extend(members.drain(..).map(|(_, v)| v)),
                _ => {}
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{{string: {s}}}"),
            Self::Int(i) => write!(f, "{{int: {i}}}"),
            Self::Long(l) => write!(f, "{{i8: {l}}}"),
            Self::Boolean(b) => write!(f, "{{boolean: {b}}}"),
            Self::Double(d) => write!(f, "{{double: {d}}}"),
            Self::DateTime(dt) => write!(f, "{{dateTime.iso8601: {dt}}}"),
            Self::Base64(b) => write!(f, "{{base64: {} bytes}}", b.len()),
            Self::Struct(m) => write!(f, "{{struct: {} members}}", m.len()),
            Self::Array(v) => write!(f, "{{array: {} items}}", v.len()),
            Self::Nil => f.write_str("{nil}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Self::Long(l)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

/// JSON-friendly view: scalars map to their natural JSON form, structs to
/// objects in member order, binary to standard base64 text.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Int(i) => serializer.serialize_i32(*i),
            Self::Long(l) => serializer.serialize_i64(*l),
            Self::Boolean(b) => serializer.serialize_bool(*b),
            Self::Double(d) => serializer.serialize_f64(*d),
            Self::DateTime(dt) => {
                serializer.collect_str(&dt.format(JSON_DATETIME_FORMAT))
            }
            Self::Base64(b) => {
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(b);
                serializer.serialize_str(&encoded)
            }
            Self::Struct(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (name, value) in members {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Nil => serializer.serialize_unit(),
        }
    }
}
