//! Per-connection session state.
//!
//! A fresh [`SessionState`] is built on every successful connect, so nothing
//! here survives a reconnect. The retry counter lives on the supervisor.

use std::fmt;
use std::time::Duration;

use rfgate_gate::GateState;
use tokio::time::Instant;

/// What to do when the link has been idle for the configured interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleVerdict {
    /// The gate is open with no traffic: treat as a safety fault
    StuckOpen,
    /// A healthcheck is already outstanding: the link is dead
    LinkDead,
    /// Probe the link
    SendHealthcheck,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Connecting failed
    ConnectFailed(String),
    /// The antenna closed the connection
    PeerClosed,
    /// Read, write or codec failure
    Fault(String),
    /// The antenna rejected the read filter
    FilterRejected,
    /// Idle while the gate was open
    StuckOpen,
    /// Idle with a healthcheck already outstanding
    LinkDead,
    /// Healthcheck unanswered within the grace period
    HealthcheckTimeout,
    /// Manual restart request
    Restart,
    /// Shutdown request
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::ConnectFailed(e) => write!(f, "connect failed: {e}"),
            SessionEnd::PeerClosed => f.write_str("antenna closed the connection"),
            SessionEnd::Fault(e) => write!(f, "connection fault: {e}"),
            SessionEnd::FilterRejected => f.write_str("read filter rejected"),
            SessionEnd::StuckOpen => f.write_str("idle while gate open"),
            SessionEnd::LinkDead => f.write_str("idle with healthcheck pending"),
            SessionEnd::HealthcheckTimeout => f.write_str("healthcheck unanswered"),
            SessionEnd::Restart => f.write_str("restart requested"),
            SessionEnd::Shutdown => f.write_str("shutdown requested"),
        }
    }
}

/// Liveness and provisioning state of one connection.
#[derive(Debug)]
pub struct SessionState {
    idle_interval: Duration,
    grace: Duration,

    idle_at: Instant,
    grace_until: Option<Instant>,
    settle_until: Option<Instant>,

    pending_healthcheck: bool,
    filter_applied: bool,
}

impl SessionState {
    /// New session; the idle deadline is armed from `now`.
    pub fn new(idle_interval: Duration, grace: Duration, now: Instant) -> Self {
        Self {
            idle_interval,
            grace,
            idle_at: now + idle_interval,
            grace_until: None,
            settle_until: None,
            pending_healthcheck: false,
            filter_applied: false,
        }
    }

    /// Bytes moved: push the idle deadline back.
    pub fn touch(&mut self, now: Instant) {
        self.idle_at = now + self.idle_interval;
    }

    pub fn idle_deadline(&self) -> Option<Instant> {
        Some(self.idle_at)
    }

    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_until
    }

    pub fn settle_deadline(&self) -> Option<Instant> {
        self.settle_until
    }

    pub fn pending_healthcheck(&self) -> bool {
        self.pending_healthcheck
    }

    pub fn filter_applied(&self) -> bool {
        self.filter_applied
    }

    /// Decide what an idle timeout means.
    ///
    /// `SendHealthcheck` marks the probe as pending, arms the grace deadline
    /// and re-arms the idle deadline.
    pub fn on_idle(&mut self, gate: GateState, now: Instant) -> IdleVerdict {
        if gate == GateState::Open {
            return IdleVerdict::StuckOpen;
        }
        if self.pending_healthcheck {
            return IdleVerdict::LinkDead;
        }
        self.pending_healthcheck = true;
        self.grace_until = Some(now + self.grace);
        self.idle_at = now + self.idle_interval;
        IdleVerdict::SendHealthcheck
    }

    pub fn on_healthcheck_ack(&mut self) {
        self.pending_healthcheck = false;
        self.grace_until = None;
    }

    /// Grace deadline reached. Returns `true` if the probe is still
    /// unanswered.
    pub fn on_grace_elapsed(&mut self) -> bool {
        self.grace_until = None;
        self.pending_healthcheck
    }

    /// The startup relay-close went out: schedule the read filter.
    pub fn arm_settle(&mut self, now: Instant, delay: Duration) {
        self.settle_until = Some(now + delay);
    }

    /// Settle deadline reached: clear it so the filter goes out once.
    pub fn on_settle_elapsed(&mut self) {
        self.settle_until = None;
    }

    pub fn on_filter_ack(&mut self) {
        self.filter_applied = true;
    }
}
