//! JSON-RPC / MCP protocol model
//!
//! Message and response representations plus the response validator.

pub mod message;
pub mod validator;

pub use message::{describe_id, Message, Response, JSONRPC_VERSION};
pub use validator::{validate, ErrorPolicy, Expectation, Violation};
