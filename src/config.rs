use std::path::PathBuf;

use crate::constants::{DEFAULT_INFLIGHT_SLOTS, DEFAULT_RATE_LIMIT_PER_MIN};
use crate::error::{AppError, Result};

/// Process configuration, read once at startup from the environment.
///
/// The process refuses to start when the gateway coordinates are unusable;
/// everything else falls back to defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream gateway host.
    pub gateway_host: String,
    /// Upstream gateway port.
    pub gateway_port: u16,
    /// Client id reported to the gateway session.
    pub client_id: u32,
    /// HTTP listen port for the API.
    pub listen_port: u16,
    /// Directory for persisted state (expiry calendars).
    pub state_dir: PathBuf,
    /// Upstream pacing budget per minute.
    pub rate_limit_per_min: u32,
    /// Concurrent in-flight upstream request bound.
    pub inflight_slots: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let gateway_host = std::env::var("QD_GATEWAY_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        if gateway_host.trim().is_empty() {
            return Err(AppError::Config("QD_GATEWAY_HOST is empty".into()));
        }

        let gateway_port = parse_env("QD_GATEWAY_PORT", 5000u16)?;
        if gateway_port == 0 {
            return Err(AppError::Config("QD_GATEWAY_PORT must be non-zero".into()));
        }

        // A fixed client id collides when several processes restart against the
        // same gateway; derive from the pid unless overridden.
        let client_id = match std::env::var("QD_CLIENT_ID") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| AppError::Config(format!("QD_CLIENT_ID is not a number: '{}'", raw)))?,
            Err(_) => 1 + (std::process::id() % 1000),
        };

        let listen_port = parse_env("QD_LISTEN_PORT", 8000u16)?;

        let state_dir = std::env::var("QD_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("state"));

        let rate_limit_per_min = parse_env("QD_RATE_LIMIT_PER_MIN", DEFAULT_RATE_LIMIT_PER_MIN)?;
        if rate_limit_per_min == 0 {
            return Err(AppError::Config("QD_RATE_LIMIT_PER_MIN must be positive".into()));
        }

        let inflight_slots = parse_env("QD_INFLIGHT_SLOTS", DEFAULT_INFLIGHT_SLOTS)?;
        if inflight_slots == 0 {
            return Err(AppError::Config("QD_INFLIGHT_SLOTS must be positive".into()));
        }

        Ok(Self {
            gateway_host,
            gateway_port,
            client_id,
            listen_port,
            state_dir,
            rate_limit_per_min,
            inflight_slots,
        })
    }

    /// Base URL of the upstream gateway API.
    pub fn gateway_base_url(&self) -> String {
        format!("http://{}:{}/v1", self.gateway_host, self.gateway_port)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} is not valid: '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}
