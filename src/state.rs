use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::db::Database;
use crate::middleware::acl::AccessControl;

/// The shared application state.
///
/// Handlers receive their collaborators from here instead of reaching for
/// globals; everything inside is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The database pool.
    pub db: Database,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Path ACL table and caller principal source.
    pub acl: Arc<AccessControl>,
    /// Process start, reported by `/status`.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        let acl = AccessControl::from_config(&config.acl);
        Self {
            db,
            config: Arc::new(config),
            acl: Arc::new(acl),
            started_at: Instant::now(),
        }
    }
}
