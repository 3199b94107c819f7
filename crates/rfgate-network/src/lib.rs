//! Antenna connection supervision.
//!
//! [`Supervisor`] owns the TCP connection to one antenna for the lifetime of
//! the process: it connects, provisions the antenna (force-close then read
//! filter), keeps the link alive with idle-driven healthchecks, routes
//! classified frames to the gate and the authorization cache, and reconnects
//! with a bounded retry budget.
//!
//! Everything that touches the socket runs inside the supervisor's event
//! loop. Manual control reaches it through a [`ControlHandle`].
//!
//! # Architecture
//!
//! ```text
//! ControlHandle ──(mpsc)──┐
//!                         ▼
//! Antenna ◄──(TCP)──► Supervisor ──► Gate
//!                         │  ▲
//!                  spawn  ▼  │ (mpsc, session epoch)
//!                      TagCache ──► Authorizer
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod session;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use control::{ControlHandle, ControlRequest, ControlResponse, GateStatus};
pub use error::SupervisorError;
pub use session::{IdleVerdict, SessionEnd, SessionState};
pub use supervisor::Supervisor;
