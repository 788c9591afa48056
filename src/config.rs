use std::collections::HashSet;
use std::path::Path;

use axum::http::{HeaderName, Method};
use serde::Deserialize;

use crate::middleware::acl::{AclRule, PrincipalId};

#[derive(Debug, Clone, Deserialize)]
pub struct AppInfoConfig {
    pub name: String,
    pub environment: String,
}

impl AppInfoConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub idle_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Explicit filter directive; `RUST_LOG` still takes precedence.
    pub level: Option<String>,
    /// Directory for the daily rolling file. No file output when unset.
    pub directory: Option<String>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_file_prefix() -> String {
    "the-api.log".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub referrer_policy: Option<String>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AclConfig {
    pub caller_principals: HashSet<PrincipalId>,
    #[serde(default)]
    pub rules: Vec<AclRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppInfoConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    pub acl: AclConfig,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
            .and_then(|cfg| cfg.try_deserialize())
        {
            Ok(app_cfg) => app_cfg,
            Err(e) => {
                eprintln!("FATAL: Failed to load embedded default config: {}", e);
                panic!("Failed to load embedded default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();
    let custom_path = std::env::var("THE_API_CONFIG").ok();
    load_with(custom_path.as_deref())
}

/// Layers the embedded defaults, `the-api.toml`, `custom_path` and the
/// `THE_API__*` environment, then validates the result.
pub fn load_with(custom_path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: the-api.toml (in CWD)
        .add_source(::config::File::with_name("the-api").required(false));

    if let Some(custom_path) = custom_path {
        builder = builder.add_source(::config::File::with_name(custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("THE_API").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }
    if cfg.server.shutdown_timeout_secs == 0 {
        return Err(anyhow::anyhow!("server.shutdown_timeout_secs must be > 0"));
    }

    // Database
    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }
    if cfg.database.min_connections > cfg.database.max_connections {
        return Err(anyhow::anyhow!(
            "database.min_connections ({}) must not exceed database.max_connections ({})",
            cfg.database.min_connections,
            cfg.database.max_connections
        ));
    }

    // CORS
    for m in &cfg.cors.allowed_methods {
        if Method::from_bytes(m.as_bytes()).is_err() {
            return Err(anyhow::anyhow!("cors.allowed_methods contains invalid method: {}", m));
        }
    }
    for h in &cfg.cors.allowed_headers {
        if HeaderName::from_bytes(h.as_bytes()).is_err() {
            return Err(anyhow::anyhow!("cors.allowed_headers contains invalid header: {}", h));
        }
    }

    // ACL
    for (i, rule) in cfg.acl.rules.iter().enumerate() {
        if rule.paths.is_empty() {
            return Err(anyhow::anyhow!("acl.rules[{}] must list at least one path", i));
        }
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() || path == ":memory:" {
            return Ok(());
        }
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
