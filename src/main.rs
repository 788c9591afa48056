use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::{migrate::MigrateDatabase, Sqlite};
use tracing::info;

use the_api::{
    config,
    db::Database,
    logging,
    server::{self, ServerHandle},
    shutdown::{self, ShutdownCoordinator},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (embedded defaults -> the-api.toml -> env/.env)
    let app_cfg = config::load()?;

    // Keep the guards until exit so the non-blocking writers flush
    let log_guards = logging::init(&app_cfg.app, &app_cfg.logging)?;
    shutdown::install_fault_trap();

    // Prepare data dir (if sqlite)
    let db_url = &app_cfg.database.url;
    config::ensure_sqlite_parent_dir(db_url)?;
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        info!("Creating SQLite database at {}", db_url);
        Sqlite::create_database(db_url).await?;
    }
    let db = Database::connect(&app_cfg.database).await?;
    db.init_schema().await?;

    let drain_timeout = Duration::from_secs(app_cfg.server.shutdown_timeout_secs);
    let addr: SocketAddr = format!("{}:{}", app_cfg.server.host, app_cfg.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!("invalid listen addr {}:{} - {}", app_cfg.server.host, app_cfg.server.port, e)
        })?;

    let state = AppState::new(db.clone(), app_cfg);
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = ServerHandle::spawn(listener, app)?;
    info!("Everything is Loaded..!");

    let coordinator = Arc::new(ShutdownCoordinator::new(Arc::new(db), Arc::new(server), drain_timeout));
    let code = coordinator.run().await?;

    info!(exit_code = code, "Process exiting");
    drop(log_guards);
    std::process::exit(code);
}
