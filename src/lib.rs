//! # the-api
//!
//! A web-API scaffold: an axum router over a SQLite pool, with every response
//! reshaped into one envelope and an ordered, idempotent shutdown.
//!
//! ## Architecture
//!
//! - **Axum**: HTTP server, routing and middleware
//! - **SQLx**: asynchronous SQLite pool, raw queries and transactions
//! - **Tokio**: async runtime, signal handling and the shutdown state channel
//! - **Tracing**: structured, redacted request logging
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration (embedded defaults, files, environment)
//! - [`db`]: database pool contract: query, execute, transaction, health check, shutdown
//! - [`error`]: the application error type and its HTTP rendering
//! - [`logging`]: subscriber setup and credential redaction
//! - [`middleware`]: envelope, ACL, request logging, CORS and security headers
//! - [`reply`]: canned success/error/paginated response bodies
//! - [`routes`]: HTTP handlers
//! - [`server`]: router assembly and the listener task
//! - [`shutdown`]: signal-driven shutdown coordinator and fault trap
//! - [`state`]: shared application state

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod reply;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

#[cfg(test)]
mod tests;
