//! Gate state machine.
//!
//! Owns the CLOSED/OPENING/OPEN/CLOSING cycle of one vehicular gate. The
//! machine never touches the socket: every transition that needs the relay
//! returns the [`Command`](rfgate_protocol::Command) to send, and the
//! connection supervisor writes it through its single write path.

pub mod state_machine;

pub use state_machine::{Gate, GateConfig, GateError, GateState, GateTransition, TransitionCause};
