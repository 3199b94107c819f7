use std::time::Duration;

use rfgate_core::constants::{
    DEFAULT_HEALTHCHECK_GRACE_MS, DEFAULT_HEALTHCHECK_INTERVAL_MS, DEFAULT_IO_TIMEOUT_MS,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SETTLE_DELAY_MS,
};
use rfgate_protocol::CommandSet;

/// Connection supervisor configuration.
///
/// # Example
///
/// ```
/// use rfgate_network::SupervisorConfig;
/// use std::time::Duration;
///
/// let config = SupervisorConfig::default()
///     .healthcheck_interval(Duration::from_secs(10))
///     .max_reconnect_attempts(3);
///
/// assert_eq!(config.max_reconnect_attempts, 3);
/// assert_eq!(config.settle_delay, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Link inactivity that triggers a healthcheck
    pub healthcheck_interval: Duration,

    /// How long a healthcheck may stay unanswered
    pub healthcheck_grace: Duration,

    /// Pause between the startup relay-close and the read filter
    pub settle_delay: Duration,

    /// Pause before each reconnect attempt
    pub reconnect_delay: Duration,

    /// Reconnects allowed before giving up
    pub max_reconnect_attempts: u32,

    /// Bound on connect and on each write
    pub io_timeout: Duration,

    /// Outbound frames, including the configured read filter
    pub commands: CommandSet,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            healthcheck_interval: Duration::from_millis(DEFAULT_HEALTHCHECK_INTERVAL_MS),
            healthcheck_grace: Duration::from_millis(DEFAULT_HEALTHCHECK_GRACE_MS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MS),
            commands: CommandSet::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn healthcheck_interval(mut self, interval: Duration) -> Self {
        self.healthcheck_interval = interval;
        self
    }

    pub fn healthcheck_grace(mut self, grace: Duration) -> Self {
        self.healthcheck_grace = grace;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn commands(mut self, commands: CommandSet) -> Self {
        self.commands = commands;
        self
    }
}
