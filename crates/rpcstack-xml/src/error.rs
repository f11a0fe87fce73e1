//! Decode error types.
//!
//! Every decode-time failure is a [`DecodeError`] carrying an [`ErrorKind`]
//! and a human-readable detail. Server faults are not errors here; they are
//! reported through [`crate::ResponseOutcome::Fault`].

use std::fmt;
use std::io;

/// Category of a decode-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The document violates the `methodResponse` grammar.
    Structural,
    /// Element text cannot be converted to the type its tag declares.
    TypeCoercion,
    /// A `<value>` child names a type tag the registry does not know.
    UnsupportedType,
    /// The underlying XML is not well-formed.
    MalformedXml,
    /// Reading the input stream failed.
    Io,
}

impl ErrorKind {
    /// Returns the stable identifier of this kind (e.g. `"Structural"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "Structural",
            Self::TypeCoercion => "TypeCoercion",
            Self::UnsupportedType => "UnsupportedType",
            Self::MalformedXml => "MalformedXml",
            Self::Io => "Io",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Structural => "invalid XML-RPC response structure",
            Self::TypeCoercion => "failed to convert value",
            Self::UnsupportedType => "unsupported XML-RPC type",
            Self::MalformedXml => "malformed XML",
            Self::Io => "I/O error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A decode-time failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct DecodeError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Where and why, for humans.
    pub detail: String,
}

impl DecodeError {
    /// Create an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Grammar violation.
    #[must_use]
    pub fn structural(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Structural, detail)
    }

    /// Text that does not fit its declared type.
    #[must_use]
    pub fn type_coercion(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeCoercion, detail)
    }

    /// Unknown type tag.
    #[must_use]
    pub fn unsupported_type(tag: &str) -> Self {
        Self::new(ErrorKind::UnsupportedType, format!("<{tag}>"))
    }

    /// Markup that is not well-formed.
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedXml, detail)
    }
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<quick_xml::Error> for DecodeError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(io) => Self::new(ErrorKind::Io, io.to_string()),
            other => Self::malformed(other.to_string()),
        }
    }
}
