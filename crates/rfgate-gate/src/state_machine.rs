//! Gate state machine implementation.
//!
//! # States
//!
//! - `Closed`: relay released, ready for a new cycle
//! - `Opening`: relay-open issued, write not yet confirmed
//! - `Open`: gate open, auto-close deadline armed
//! - `Closing`: relay-close issued, waiting for the ack or the settle bound
//!
//! # Valid Transitions
//!
//! - Closed → Opening → Open → Closing → Closed
//! - any → Closed on [`Gate::reset`] (session change)
//!
//! # Timers
//!
//! Timers are deadlines stored on the machine, not spawned tasks. The
//! supervisor sleeps until [`Gate::auto_close_deadline`] or
//! [`Gate::closing_deadline`] and then calls the matching handler. Replacing
//! or clearing a deadline is the only way to re-arm or cancel it, so a stale
//! timer can never fire.
//!
//! # Examples
//!
//! ```
//! use rfgate_gate::{Gate, GateConfig, GateState};
//! use rfgate_protocol::Command;
//! use tokio::time::Instant;
//!
//! let mut gate = Gate::new(GateConfig::default(), "1");
//! let now = Instant::now();
//!
//! assert_eq!(gate.open(None, None), Ok(Command::RelayOpen));
//! gate.confirm_open(now);
//! assert_eq!(gate.state(), GateState::Open);
//!
//! // A second open is rejected while the gate is not closed
//! assert!(gate.open(None, None).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use rfgate_core::TagId;
use rfgate_core::constants::{DEFAULT_AUTO_CLOSE_MS, DEFAULT_CLOSING_SETTLE_MS, MAX_GATE_HISTORY};
use rfgate_protocol::Command;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Physical gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    Closed,
    Opening,
    Open,
    Closing,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            GateState::Closed => "CLOSED",
            GateState::Opening => "OPENING",
            GateState::Open => "OPEN",
            GateState::Closing => "CLOSING",
        };
        f.write_str(state_str)
    }
}

/// Why a transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    /// An authorized tag or a manual request asked for the gate
    OpenRequested,
    /// The relay-open write completed
    OpenConfirmed,
    /// Explicit close request
    CloseRequested,
    /// The auto-close deadline passed
    AutoClose,
    /// The antenna acknowledged the relay release
    ClosedAck,
    /// No ack arrived within the closing settle bound
    ClosingSettled,
    /// The connection session changed
    Reset,
}

/// One recorded transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateTransition {
    pub from: GateState,
    pub to: GateState,
    pub cause: TransitionCause,
    pub at: DateTime<Utc>,
}

/// A rejected gate operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The operation is only valid from another state
    #[error("Gate is {current}, operation requires {required}")]
    InvalidState {
        current: GateState,
        required: GateState,
    },
}

/// Gate timing configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// How long the gate stays open without a holder re-read
    pub auto_close: Duration,

    /// Upper bound on the CLOSING state
    pub closing_settle: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            auto_close: Duration::from_millis(DEFAULT_AUTO_CLOSE_MS),
            closing_settle: Duration::from_millis(DEFAULT_CLOSING_SETTLE_MS),
        }
    }
}

impl GateConfig {
    pub fn auto_close(mut self, duration: Duration) -> Self {
        self.auto_close = duration;
        self
    }

    pub fn closing_settle(mut self, duration: Duration) -> Self {
        self.closing_settle = duration;
        self
    }
}

/// State machine for one gate.
///
/// # Thread Safety
///
/// Not synchronised. The connection supervisor owns the gate and drives it
/// from its event loop.
#[derive(Debug)]
pub struct Gate {
    state: GateState,
    config: GateConfig,

    /// Metrics label
    device: String,

    /// Tag whose presence keeps the gate open (None for manual opens)
    holder: Option<TagId>,

    /// Hold duration of the current cycle (configured or overridden)
    hold_for: Duration,

    auto_close_at: Option<Instant>,
    closing_until: Option<Instant>,

    history: VecDeque<GateTransition>,
}

impl Gate {
    /// Create a closed gate.
    pub fn new(config: GateConfig, device: impl Into<String>) -> Self {
        let hold_for = config.auto_close;
        Self {
            state: GateState::Closed,
            config,
            device: device.into(),
            holder: None,
            hold_for,
            auto_close_at: None,
            closing_until: None,
            history: VecDeque::with_capacity(MAX_GATE_HISTORY),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn holder(&self) -> Option<&TagId> {
        self.holder.as_ref()
    }

    /// Whether `tag` is the tag currently holding the gate open.
    pub fn is_held_by(&self, tag: &TagId) -> bool {
        self.state == GateState::Open && self.holder.as_ref() == Some(tag)
    }

    pub fn auto_close_deadline(&self) -> Option<Instant> {
        self.auto_close_at
    }

    pub fn closing_deadline(&self) -> Option<Instant> {
        self.closing_until
    }

    /// Transition history, oldest first.
    pub fn history(&self) -> &VecDeque<GateTransition> {
        &self.history
    }

    /// The most recent `count` transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<GateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Start an open cycle.
    ///
    /// Accepted only from `Closed`. On acceptance the gate enters `Opening`,
    /// remembers the holder and hold duration, and returns the relay-open
    /// command for the caller to write.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidState` without any state change when the
    /// gate is not closed.
    pub fn open(
        &mut self,
        holder: Option<TagId>,
        hold_for: Option<Duration>,
    ) -> Result<Command, GateError> {
        self.require(GateState::Closed)?;

        self.holder = holder;
        self.hold_for = hold_for.unwrap_or(self.config.auto_close);
        self.change_state(GateState::Opening, TransitionCause::OpenRequested);

        counter!("gate_open_total", "device" => self.device.clone()).increment(1);
        info!(
            device = %self.device,
            holder = ?self.holder.as_ref().map(TagId::as_str),
            hold_ms = self.hold_for.as_millis() as u64,
            "Opening gate"
        );

        Ok(Command::RelayOpen)
    }

    /// The relay-open write completed: enter `Open` and arm auto-close.
    pub fn confirm_open(&mut self, now: Instant) {
        if self.state != GateState::Opening {
            return;
        }
        self.auto_close_at = Some(now + self.hold_for);
        self.change_state(GateState::Open, TransitionCause::OpenConfirmed);
    }

    /// Gate-opened ack from the antenna.
    pub fn on_opened_ack(&mut self, now: Instant) {
        self.confirm_open(now);
    }

    /// Re-arm auto-close for the full hold duration if `tag` holds the gate.
    ///
    /// Returns `true` when the deadline was pushed back.
    pub fn rearm(&mut self, tag: &TagId, now: Instant) -> bool {
        if !self.is_held_by(tag) {
            return false;
        }
        self.auto_close_at = Some(now + self.hold_for);
        debug!(device = %self.device, tag = %tag, "Holder re-read, auto-close re-armed");
        true
    }

    /// Explicit close request.
    ///
    /// # Errors
    ///
    /// Returns `GateError::InvalidState` when the gate is not open.
    pub fn close(&mut self, now: Instant) -> Result<Command, GateError> {
        self.begin_closing(now, TransitionCause::CloseRequested)
    }

    /// Handle the auto-close deadline. Returns the relay command if the gate
    /// started closing.
    pub fn on_auto_close(&mut self, now: Instant) -> Option<Command> {
        match self.auto_close_at {
            Some(deadline) if deadline <= now => {
                self.begin_closing(now, TransitionCause::AutoClose).ok()
            }
            _ => None,
        }
    }

    /// Gate-closed ack from the antenna.
    pub fn on_closed_ack(&mut self) {
        if self.state == GateState::Closing {
            self.closing_until = None;
            self.change_state(GateState::Closed, TransitionCause::ClosedAck);
        }
    }

    /// Handle the closing settle deadline.
    pub fn on_closing_settled(&mut self, now: Instant) {
        match self.closing_until {
            Some(deadline) if deadline <= now && self.state == GateState::Closing => {
                self.closing_until = None;
                self.change_state(GateState::Closed, TransitionCause::ClosingSettled);
            }
            _ => {}
        }
    }

    /// Force the gate back to `Closed` and drop every deadline.
    ///
    /// Used when a connection session ends or begins: the supervisor sends
    /// relay-close on connect, so the physical baseline is closed.
    pub fn reset(&mut self) {
        self.holder = None;
        self.hold_for = self.config.auto_close;
        self.auto_close_at = None;
        self.closing_until = None;
        if self.state != GateState::Closed {
            self.change_state(GateState::Closed, TransitionCause::Reset);
        }
    }

    fn begin_closing(&mut self, now: Instant, cause: TransitionCause) -> Result<Command, GateError> {
        self.require(GateState::Open)?;

        self.holder = None;
        self.auto_close_at = None;
        self.closing_until = Some(now + self.config.closing_settle);
        self.change_state(GateState::Closing, cause);

        counter!("gate_close_total", "device" => self.device.clone()).increment(1);
        info!(device = %self.device, ?cause, "Closing gate");

        Ok(Command::RelayClose)
    }

    fn require(&self, required: GateState) -> Result<(), GateError> {
        if self.state != required {
            return Err(GateError::InvalidState {
                current: self.state,
                required,
            });
        }
        Ok(())
    }

    fn change_state(&mut self, to: GateState, cause: TransitionCause) {
        let transition = GateTransition {
            from: self.state,
            to,
            cause,
            at: Utc::now(),
        };
        debug!(device = %self.device, from = %transition.from, to = %to, ?cause, "Gate transition");
        self.state = to;

        self.history.push_back(transition);
        if self.history.len() > MAX_GATE_HISTORY {
            self.history.pop_front();
        }
    }
}
