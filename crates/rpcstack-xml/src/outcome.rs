//! The three-way result of decoding a response document.

use rpcstack_model::{Fault, Value};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::deserialize::MethodResponse;
use crate::error::DecodeError;

/// Exactly one of: the returned value, the server's fault, or the reason the
/// document could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// The server returned a value.
    Value(Value),
    /// The server reported an application-level fault.
    Fault(Fault),
    /// The document could not be decoded.
    Error(DecodeError),
}

/// A fault or a decode error, for callers that treat both as failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResponseError {
    /// The server reported a fault.
    #[error(transparent)]
    Fault(#[from] Fault),
    /// The response could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ResponseOutcome {
    /// Returns `true` if the server returned a value.
    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns `true` if the server reported a fault.
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// Returns `true` if decoding failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns the value if the server returned one.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Convert into a `Result`, folding faults and decode errors together.
    ///
    /// # Errors
    ///
    /// Returns [`ResponseError::Fault`] for a server fault and
    /// [`ResponseError::Decode`] for a decode failure.
    pub fn into_result(self) -> Result<Value, ResponseError> {
        match self {
            Self::Value(v) => Ok(v),
            Self::Fault(f) => Err(ResponseError::Fault(f)),
            Self::Error(e) => Err(ResponseError::Decode(e)),
        }
    }
}

impl From<Result<MethodResponse, DecodeError>> for ResponseOutcome {
    fn from(result: Result<MethodResponse, DecodeError>) -> Self {
        match result {
            Ok(Ok(value)) => Self::Value(value),
            Ok(Err(fault)) => Self::Fault(fault),
            Err(err) => Self::Error(err),
        }
    }
}

impl Serialize for DecodeError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DecodeError", 2)?;
        state.serialize_field("kind", self.kind.as_str())?;
        state.serialize_field("detail", &self.detail)?;
        state.end()
    }
}

/// Single-key objects: `{"value": ..}`, `{"fault": ..}` or `{"error": ..}`.
impl Serialize for ResponseOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Self::Value(v) => map.serialize_entry("value", v)?,
            Self::Fault(f) => map.serialize_entry("fault", f)?,
            Self::Error(e) => map.serialize_entry("error", e)?,
        }
        map.end()
    }
}
