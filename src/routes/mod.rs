//! HTTP route handlers.
//!
//! - `health`: hello, ping, liveness, status and version endpoints
//! - `users`: sample resource showing paginated lists, lookups and
//!   transactional writes through the reply builder

pub mod health;
pub mod users;
