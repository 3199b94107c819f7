//! Default timings and limits for the gate controller.
//!
//! Every value here is a default only: the binary lets each one be overridden
//! through the environment. Durations are kept as integer milliseconds (or
//! seconds where noted) so they can be used directly in `const` context and
//! in CLI defaults.
//!
//! # Usage
//!
//! ```
//! use rfgate_core::constants::*;
//! use std::time::Duration;
//!
//! let idle = Duration::from_millis(DEFAULT_HEALTHCHECK_INTERVAL_MS);
//! assert!(idle > Duration::from_millis(DEFAULT_HEALTHCHECK_GRACE_MS));
//! ```

// ============================================================================
// Connection supervision
// ============================================================================

/// Idle interval after which a healthcheck frame is sent.
///
/// The idle timer is re-armed on every frame read or written, so on a busy
/// link healthchecks are never sent.
pub const DEFAULT_HEALTHCHECK_INTERVAL_MS: u64 = 30_000;

/// How long a healthcheck may stay unanswered before the link is declared dead.
pub const DEFAULT_HEALTHCHECK_GRACE_MS: u64 = 3_000;

/// Pause between the startup relay-close and the read-filter command.
///
/// The antenna firmware drops the second of two back-to-back commands.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 1_000;

/// Delay before a reconnect attempt after the socket closed.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;

/// Reconnect attempts tolerated before the process gives up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Timeout for TCP connect and for each frame write.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 3_000;

// ============================================================================
// Gate
// ============================================================================

/// How long the gate stays open before closing on its own.
pub const DEFAULT_AUTO_CLOSE_MS: u64 = 10_000;

/// Upper bound on the CLOSING state when no gate-closed ack arrives.
pub const DEFAULT_CLOSING_SETTLE_MS: u64 = 2_000;

/// Number of gate transitions kept for inspection.
pub const MAX_GATE_HISTORY: usize = 100;

// ============================================================================
// Tag authorization
// ============================================================================

/// Minimum tag length in hex characters after sanitising.
pub const MIN_TAG_LENGTH: usize = 8;

/// Maximum tag length in hex characters after sanitising.
pub const MAX_TAG_LENGTH: usize = 16;

/// Time-to-live of a cached authorization decision (seconds).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Maximum number of cached tags.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Timeout for calls to the external authorization service.
pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Device identity
// ============================================================================

/// Lowest valid device identifier.
pub const MIN_DEVICE_ID: u32 = 1;
