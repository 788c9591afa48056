//! Middleware components for HTTP request processing.
//!
//! - `acl`: path based access control, evaluated before the handler
//! - `cors`: CORS layer built from configuration
//! - `envelope`: adds the `meta` block to every outgoing body
//! - `request_log`: structured, redacted request/response records
//! - `security_headers`: helmet-style response headers

pub mod acl;
pub mod cors;
pub mod envelope;
pub mod request_log;
pub mod security_headers;

pub use envelope::{skip_envelope, SkipEnvelope};
