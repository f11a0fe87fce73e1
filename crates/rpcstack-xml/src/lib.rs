//! XML-RPC response decoding for RpcStack.
//!
//! This crate turns an XML-RPC `methodResponse` document into either the
//! returned [`Value`], the [`Fault`] the server reported, or a [`DecodeError`]
//! explaining why the document was rejected. It is independent of the
//! transport that produced the document.
//!
//! # Key components
//!
//! - [`Decoder`] and the [`decode`] / [`from_xml`] entry points
//! - [`DecoderConfig`] for the permissive parsing options
//! - [`TypeRegistry`] mapping type tags to value decoders
//! - [`ResponseOutcome`] for the three-way result
//!
//! # Accepted laxity
//!
//! - The `<?xml ...?>` declaration may be omitted
//! - Comments may appear between elements and inside text
//! - A `<value>` without a type tag is a string
//!
//! # Example
//!
//! ```
//! use rpcstack_xml::{ResponseOutcome, from_xml};
//!
//! let outcome = from_xml(br#"<?xml version="1.0"?>
//! <methodResponse><params><param>
//!   <value><string>to&lt;to</string></value>
//! </param></params></methodResponse>"#);
//!
//! assert_eq!(outcome.value().and_then(|v| v.as_str()), Some("to<to"));
//! ```

pub mod config;
pub mod deserialize;
pub mod error;
pub mod outcome;
pub mod registry;

use std::io::BufRead;

pub use config::{DecoderConfig, DuplicateMembers};
pub use deserialize::{Decoder, MethodResponse};
pub use error::{DecodeError, ErrorKind};
pub use outcome::{ResponseError, ResponseOutcome};
pub use registry::{TypeRegistry, ValueType};
pub use rpcstack_model::{Fault, Value};

/// Decode one response document from a stream with the given configuration.
pub fn decode<R: BufRead>(reader: R, config: &DecoderConfig) -> ResponseOutcome {
    Decoder::new(config.clone()).decode(reader)
}

/// Decode one in-memory response document with the default configuration.
pub fn from_xml(xml: &[u8]) -> ResponseOutcome {
    Decoder::default().decode_slice(xml)
}
