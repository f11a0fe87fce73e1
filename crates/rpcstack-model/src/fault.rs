//! Server-reported XML-RPC faults.

use serde::Serialize;

/// An application-level error returned by the server in a `<fault>` block.
///
/// The display form matches what callers conventionally show to users:
/// the fault string followed by the numeric code in brackets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message} [{code}]")]
pub struct Fault {
    /// Value of the `faultCode` member.
    pub code: i32,
    /// Value of the `faultString` member.
    pub message: String,
}

impl Fault {
    /// Create a fault from its code and message.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
