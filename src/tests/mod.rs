//! Unit and router-level tests.
//!
//! - **reply_tests**: canned response bodies and pagination math
//! - **envelope_tests**: payload classification and meta injection
//! - **acl_tests**: rule evaluation and the 403 path
//! - **shutdown_tests**: ordering and idempotence of the close sequence
//! - **config_tests**: configuration loading and validation
//! - **db_tests**: pool contract against in-memory SQLite
//! - **error_tests**: error taxonomy and HTTP rendering
//! - **logging_tests**: header and body redaction
//! - **api_tests**: the assembled router end to end

pub mod envelope_tests;
pub mod error_tests;

use std::io;
use std::sync::{Arc, Mutex};

use sqlx::sqlite::SqlitePoolOptions;

use crate::config::AppConfig;
use crate::db::Database;
use crate::state::AppState;

/// In-memory database with the schema applied. One connection, so every
/// query sees the same memory database.
pub async fn mk_db() -> Database {
    let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
    let db = Database::from_pool(pool);
    db.init_schema().await.unwrap();
    db
}

pub async fn mk_state() -> AppState {
    AppState::new(mk_db().await, AppConfig::default())
}

/// In-memory log sink for asserting on emitted records.
///
/// `install` scopes a DEBUG subscriber to the current thread, which covers a
/// current-thread `#[tokio::test]` and everything it spawns.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
