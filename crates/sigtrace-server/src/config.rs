//! Server configuration read from `SIGTRACE_*` environment variables.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::ServerError;

pub const DEFAULT_DB_PATH: &str = "sigtrace.db";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7777;
/// Port value that asks the OS to pick a free port.
pub const AUTO_ASSIGNED_PORT: u16 = 0;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10024;
pub const DEFAULT_FLUSH_THRESHOLD: usize = 128;

/// Runtime configuration of a [`crate::SignatureServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// SQLite database path of the durable store.
    pub db_path: String,
    /// Listen address.
    pub host: String,
    /// Listen port, [`AUTO_ASSIGNED_PORT`] for an OS-assigned one.
    pub port: u16,
    /// Capacity of the observation queue.
    pub queue_capacity: usize,
    /// Staged contract / pending call count above which the merge loop flushes.
    pub flush_threshold: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            db_path: DEFAULT_DB_PATH.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    ///
    /// - `SIGTRACE_DB_PATH`: SQLite database file path (default: "sigtrace.db")
    /// - `SIGTRACE_HOST`: listen address (default: "127.0.0.1")
    /// - `SIGTRACE_PORT`: listen port, 0 to auto-assign (default: 7777)
    /// - `SIGTRACE_QUEUE_CAPACITY`: observation queue capacity (default: 10024)
    /// - `SIGTRACE_FLUSH_THRESHOLD`: flush threshold (default: 128)
    pub fn from_env() -> Result<Self, ServerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServerConfig::default();
        let config = ServerConfig {
            db_path: lookup("SIGTRACE_DB_PATH").unwrap_or(defaults.db_path),
            host: lookup("SIGTRACE_HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "SIGTRACE_PORT")?.unwrap_or(defaults.port),
            queue_capacity: parse_var(&lookup, "SIGTRACE_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
            flush_threshold: parse_var(&lookup, "SIGTRACE_FLUSH_THRESHOLD")?
                .unwrap_or(defaults.flush_threshold),
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns a copy listening on `port`.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Rejects sizes the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.queue_capacity == 0 {
            return Err(config_error("SIGTRACE_QUEUE_CAPACITY", "must be greater than zero"));
        }
        if self.flush_threshold == 0 {
            return Err(config_error("SIGTRACE_FLUSH_THRESHOLD", "must be greater than zero"));
        }
        Ok(())
    }

    /// `host:port` as passed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ServerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| config_error(key, &format!("{raw:?}: {e}"))),
        None => Ok(None),
    }
}

fn config_error(key: &str, reason: &str) -> ServerError {
    ServerError::Config {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
