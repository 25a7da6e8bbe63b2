//! Runtime configuration for the relay daemon.
//!
//! The listen port comes from the command line; everything else is read
//! from the environment:
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `RELAY_BIND_ADDR` | `0.0.0.0` | Interface to listen on |
//! | `RELAY_MAX_FRAME_BYTES` | unset (no cap) | Largest accepted frame payload |
//! | `RELAY_WRITE_TIMEOUT_MS` | `10000` | Per-frame write timeout |

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default listen port
pub const DEFAULT_PORT: u16 = 5555;

/// Default write timeout (10 seconds)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

pub const ENV_BIND_ADDR: &str = "RELAY_BIND_ADDR";
pub const ENV_MAX_FRAME_BYTES: &str = "RELAY_MAX_FRAME_BYTES";
pub const ENV_WRITE_TIMEOUT_MS: &str = "RELAY_WRITE_TIMEOUT_MS";

/// Relay daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interface to listen on
    pub bind_addr: IpAddr,

    /// TCP port to listen on (0 picks an ephemeral port)
    pub port: u16,

    /// Largest frame payload accepted or sent; `None` means no cap
    pub max_frame_length: Option<usize>,

    /// How long a single frame write may take before the peer is dropped
    pub write_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            max_frame_length: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl RelayConfig {
    /// Builds a configuration for `port`, taking the remaining settings
    /// from the process environment.
    pub fn from_env(port: u16) -> Result<Self, ConfigError> {
        Self::from_lookup(port, |key| env::var(key).ok())
    }

    /// Builds a configuration for `port`, resolving settings through
    /// `lookup` instead of the process environment.
    pub fn from_lookup<F>(port: u16, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            port,
            ..Self::default()
        };

        if let Some(value) = lookup(ENV_BIND_ADDR) {
            config.bind_addr = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_BIND_ADDR, &value, e))?;
        }

        if let Some(value) = lookup(ENV_MAX_FRAME_BYTES) {
            let max: usize = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_MAX_FRAME_BYTES, &value, e))?;
            if max == 0 {
                return Err(ConfigError::invalid(
                    ENV_MAX_FRAME_BYTES,
                    &value,
                    "must be greater than zero",
                ));
            }
            config.max_frame_length = Some(max);
        }

        if let Some(value) = lookup(ENV_WRITE_TIMEOUT_MS) {
            let millis: u64 = value
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_WRITE_TIMEOUT_MS, &value, e))?;
            if millis == 0 {
                return Err(ConfigError::invalid(
                    ENV_WRITE_TIMEOUT_MS,
                    &value,
                    "must be greater than zero",
                ));
            }
            config.write_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Returns the socket address to bind.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Returns the per-connection channel settings.
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            max_frame_length: self.max_frame_length,
            write_timeout: self.write_timeout,
        }
    }
}

/// Settings applied to every peer's framed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    pub max_frame_length: Option<usize>,
    pub write_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        RelayConfig::default().channel_settings()
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
