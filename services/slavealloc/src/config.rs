use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    /// Apply migrations at startup.
    pub run_migrations: bool,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub migrations_dir: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/slavealloc".to_string(),
            max_connections: 5,
            min_connections: 1,
            migrations_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = var("SLAVEALLOC_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8010".to_string())
            .parse()?;

        let log_level = var("SLAVEALLOC_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let run_migrations = var("SLAVEALLOC_RUN_MIGRATIONS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: var("DATABASE_URL").unwrap_or(defaults.url),
            max_connections: parse_or(var("DB_MAX_CONNECTIONS"), defaults.max_connections)?,
            min_connections: parse_or(var("DB_MIN_CONNECTIONS"), defaults.min_connections)?,
            migrations_dir: var("SLAVEALLOC_MIGRATIONS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.migrations_dir),
        };

        Ok(Self {
            listen_addr,
            log_level,
            run_migrations,
            database,
        })
    }
}

fn parse_or(value: Option<String>, default: u32) -> Result<u32> {
    match value {
        Some(v) => Ok(v.parse()?),
        None => Ok(default),
    }
}
