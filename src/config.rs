//! Runtime configuration, centralizing environment lookups the CLI and
//! HTTP transport otherwise scatter across `std::env::var` call sites.
//!
//! Named environment variables so a deployed Smaragda node and its CLI
//! client agree on the same defaults without duplicating flag parsing.
use std::path::PathBuf;

/// Environment variable naming the remote sync server's base URL.
pub const ENV_SERVER_URL: &str = "SMARAGDA_SERVER_URL";
/// Environment variable naming the bearer auth token for sync requests.
pub const ENV_AUTH_TOKEN: &str = "SMARAGDA_AUTH_TOKEN";
/// Environment variable naming this replica's device/replica identifier.
pub const ENV_DEVICE_ID: &str = "SMARAGDA_DEVICE_ID";
/// Environment variable naming the on-disk database directory.
pub const ENV_DB_PATH: &str = "SMARAGDA_DB_PATH";
/// Environment variable controlling the tracing log filter (see
/// [`crate::init_logging_with_level`]).
pub const ENV_LOG: &str = "SMARAGDA_LOG";

/// Resolved runtime configuration for the CLI and server binaries.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the WAL and lock file.
    pub db_path: PathBuf,
    /// Base URL of a remote sync peer, if configured.
    pub server_url: Option<String>,
    /// Bearer token presented to (and required of) sync peers.
    pub auth_token: Option<String>,
    /// This node's self-reported identifier in sync requests.
    pub device_id: Option<String>,
}

impl Config {
    /// Read configuration from environment variables, falling back to
    /// `~/.smaragda/db` for the database path when unset.
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var(ENV_DB_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_db_path()),
            server_url: std::env::var(ENV_SERVER_URL).ok(),
            auth_token: std::env::var(ENV_AUTH_TOKEN).ok(),
            device_id: std::env::var(ENV_DEVICE_ID).ok(),
        }
    }

    /// Build a config with an explicit db path, env vars providing the rest.
    pub fn from_env_with_db_path(db_path: PathBuf) -> Self {
        Self {
            db_path,
            ..Self::from_env()
        }
    }
}

/// The default database directory: `~/.smaragda/db`.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".smaragda")
        .join("db")
}
