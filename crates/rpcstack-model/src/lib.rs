//! XML-RPC value model for RpcStack.
//!
//! This crate defines the values a decoded XML-RPC response can carry:
//!
//! - [`Value`]: the tagged union over XML-RPC scalar and container types
//! - [`Fault`]: the `faultCode`/`faultString` pair a server reports instead of a value
//!
//! Both implement `serde::Serialize` with a natural JSON view.

mod fault;
mod value;

pub use fault::Fault;
pub use value::Value;
