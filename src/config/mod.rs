//! Configuration module - environment variable parsing

use std::env;
use std::path::PathBuf;

use crate::net::link::MAX_JOIN_LINE;

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Game server host
    pub server_host: String,
    /// Game server port
    pub server_port: u16,
    /// Command line sent on connect; the server takes the first six
    /// characters as the player name
    pub join_line: String,
    /// Optional text layout replacing the built-in maze
    pub layout_path: Option<PathBuf>,
    /// Fixed seed for spawn positions
    pub seed: Option<u64>,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns `None` for unset keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_port = match lookup("MAZE_PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port))?,
            None => 8082,
        };

        let join_line = lookup("MAZE_JOIN").ok_or(ConfigError::Missing("MAZE_JOIN"))?;
        if join_line.is_empty()
            || join_line.len() > MAX_JOIN_LINE
            || join_line.contains(&['\n', '\r'][..])
        {
            return Err(ConfigError::InvalidJoinLine);
        }

        let seed = match lookup("MAZE_SEED") {
            Some(seed) => Some(seed.parse().map_err(|_| ConfigError::InvalidSeed(seed))?),
            None => None,
        };

        Ok(Self {
            server_host: lookup("MAZE_SERVER").unwrap_or_else(|| "localhost".to_string()),
            server_port,
            join_line,
            layout_path: lookup("MAZE_LAYOUT").map(PathBuf::from),
            seed,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|format| format.eq_ignore_ascii_case("json")),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server port: {0}")]
    InvalidPort(String),

    #[error("Invalid MAZE_SEED: {0}")]
    InvalidSeed(String),

    #[error("MAZE_JOIN must be 1-{max} characters on one line", max = MAX_JOIN_LINE)]
    InvalidJoinLine,
}
