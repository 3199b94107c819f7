//! Command line and environment configuration.
//!
//! Every option can be given as a flag or through the environment (a `.env`
//! file is loaded first by the binary). Unset options fall back to the
//! defaults in [`rfgate_core::constants`].

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use rfgate_auth::{CacheConfig, HttpAuthorizerConfig};
use rfgate_core::constants::{
    DEFAULT_AUTH_TIMEOUT_MS, DEFAULT_AUTO_CLOSE_MS, DEFAULT_CACHE_CAPACITY,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_HEALTHCHECK_INTERVAL_MS, DEFAULT_MAX_RECONNECT_ATTEMPTS,
};
use rfgate_core::{AntennaConfig, DeviceId, Direction};
use rfgate_gate::GateConfig;
use rfgate_network::SupervisorConfig;
use rfgate_protocol::{CommandFrame, CommandSet};

/// RFID vehicular gate controller.
///
/// Keeps a TCP connection to one antenna, authorizes tags read at the gate
/// against the access-control service and drives the gate relay.
#[derive(Parser, Debug, Clone)]
#[command(name = "rfgate", version)]
pub struct Args {
    /// Antenna device identifier.
    #[arg(long, env = "ANTENNA_DEVICE_ID")]
    pub device_id: DeviceId,

    /// Antenna host name or IP address.
    #[arg(long, env = "ANTENNA_HOST")]
    pub host: String,

    /// Antenna TCP port.
    #[arg(long, env = "ANTENNA_PORT")]
    pub port: u16,

    /// Direction controlled by the gate (entry or exit).
    #[arg(long, env = "ANTENNA_DIRECTION", default_value = "entry")]
    pub direction: Direction,

    /// Human-readable antenna name, sent with access events.
    #[arg(long, env = "ANTENNA_NAME", default_value = "gate")]
    pub name: String,

    /// Link inactivity before a healthcheck is sent, in milliseconds.
    #[arg(long, env = "HEALTHCHECK_INTERVAL_MS", default_value_t = DEFAULT_HEALTHCHECK_INTERVAL_MS)]
    pub healthcheck_interval_ms: u64,

    /// How long the gate stays open, in milliseconds.
    #[arg(long, env = "GATE_AUTO_CLOSE_MS", default_value_t = DEFAULT_AUTO_CLOSE_MS)]
    pub auto_close_ms: u64,

    /// Reconnect attempts before the process exits.
    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value_t = DEFAULT_MAX_RECONNECT_ATTEMPTS)]
    pub max_reconnect_attempts: u32,

    /// Read-filter command frame as hex, replacing the built-in filter.
    #[arg(long, env = "READ_FILTER_HEX")]
    pub read_filter_hex: Option<String>,

    /// Base URL of the access-control service.
    #[arg(long, env = "AUTH_BASE_URL")]
    pub auth_base_url: String,

    /// Bound on each call to the access-control service, in milliseconds.
    #[arg(long, env = "AUTH_TIMEOUT_MS", default_value_t = DEFAULT_AUTH_TIMEOUT_MS)]
    pub auth_timeout_ms: u64,

    /// Lifetime of a cached authorization decision, in seconds.
    #[arg(long, env = "TAG_CACHE_TTL_SECS", default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached authorization decisions.
    #[arg(long, env = "TAG_CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: usize,

    /// Address for the manual-control HTTP API.
    #[arg(long, env = "API_BIND", default_value = "0.0.0.0:8080")]
    pub api_bind: SocketAddr,
}

impl Args {
    pub fn antenna(&self) -> AntennaConfig {
        AntennaConfig::new(
            self.device_id,
            self.host.clone(),
            self.port,
            self.direction,
            self.name.clone(),
        )
    }

    /// Supervisor configuration, with the configured read filter if any.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommandFrame` if `READ_FILTER_HEX` is not a
    /// well-formed frame.
    pub fn supervisor_config(&self) -> rfgate_core::Result<SupervisorConfig> {
        let commands = match &self.read_filter_hex {
            Some(hex) => CommandSet::new(CommandFrame::from_hex(hex)?),
            None => CommandSet::default(),
        };

        Ok(SupervisorConfig::default()
            .healthcheck_interval(Duration::from_millis(self.healthcheck_interval_ms))
            .max_reconnect_attempts(self.max_reconnect_attempts)
            .commands(commands))
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig::default().auto_close(Duration::from_millis(self.auto_close_ms))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
            .ttl(Duration::from_secs(self.cache_ttl_secs))
            .capacity(self.cache_capacity)
            .timeout(Duration::from_millis(self.auth_timeout_ms))
    }

    pub fn authorizer_config(&self) -> HttpAuthorizerConfig {
        HttpAuthorizerConfig::new(self.auth_base_url.clone())
            .timeout(Duration::from_millis(self.auth_timeout_ms))
    }
}
