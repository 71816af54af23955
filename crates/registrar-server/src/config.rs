use std::net::SocketAddr;
use std::path::PathBuf;

use registrar_core::policy::{DEFAULT_MAX_CREDITS, DEFAULT_MIN_CREDITS};
use registrar_core::RegistrationPolicy;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    pub policy: RegistrationPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = lookup("REGISTRAR_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("REGISTRAR_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let db_path = lookup("REGISTRAR_DB_PATH")
            .unwrap_or_else(|| "./registrar.redb".to_string())
            .into();

        let min_credits = match lookup("REGISTRAR_MIN_CREDITS") {
            Some(v) => v.parse::<u32>().map_err(|_| {
                ConfigError::Invalid("REGISTRAR_MIN_CREDITS", "must be a non-negative integer")
            })?,
            None => DEFAULT_MIN_CREDITS,
        };

        let max_credits = match lookup("REGISTRAR_MAX_CREDITS") {
            Some(v) => v.parse::<u32>().map_err(|_| {
                ConfigError::Invalid("REGISTRAR_MAX_CREDITS", "must be a non-negative integer")
            })?,
            None => DEFAULT_MAX_CREDITS,
        };

        let policy = RegistrationPolicy::new(min_credits, max_credits).map_err(|_| {
            ConfigError::Invalid(
                "REGISTRAR_MAX_CREDITS",
                "must be positive and at least REGISTRAR_MIN_CREDITS",
            )
        })?;

        Ok(Config {
            listen_addr,
            db_path,
            policy,
        })
    }
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}
