//! Connection supervisor.
//!
//! # Connection Lifecycle
//!
//! 1. Connect with timeout, set `TCP_NODELAY`, reset the retry counter
//! 2. Write relay-close to force a closed baseline
//! 3. After the settle delay, write the read filter
//! 4. Serve frames, timers, authorization results and control requests
//! 5. On any session end, reset the gate, count a retry and reconnect after
//!    the reconnect delay, or give up once the budget is spent
//!
//! # Timers
//!
//! Every timer is a deadline field (on [`SessionState`] or on the gate)
//! awaited by the event loop. Replacing the field re-arms the timer, and a
//! new session starts with fresh fields, so a timer from an old session can
//! never act on the new socket.
//!
//! # Authorization
//!
//! Tag verification runs in spawned tasks so a slow authorization service
//! never blocks frame handling. Results come back over a channel tagged with
//! the session epoch; results from an earlier session are discarded.

use std::collections::HashSet;
use std::future::pending;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use rfgate_auth::{Authorizer, TagCache, ValidationResult};
use rfgate_core::{AntennaConfig, TagId};
use rfgate_gate::{Gate, GateConfig, GateState};
use rfgate_protocol::{AntennaCodec, Command, InboundFrame};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, trace, warn};

use crate::control::{CONTROL_QUEUE_SIZE, STATUS_HISTORY_LEN};
use crate::{
    ControlHandle, ControlRequest, ControlResponse, GateStatus, IdleVerdict, SessionEnd,
    SessionState, SupervisorConfig, SupervisorError,
};

type AntennaStream = Framed<TcpStream, AntennaCodec>;

/// Message when a manual request arrives without a connection.
const NOT_CONNECTED: &str = "not connected";

/// Result of a spawned authorization task.
#[derive(Debug)]
struct AuthOutcome {
    epoch: u64,
    tag: TagId,
    result: ValidationResult,
}

/// How the wait between sessions ended.
enum Pause {
    Elapsed,
    Shutdown,
}

/// Supervises the connection to one antenna and drives its gate.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use rfgate_auth::{CacheConfig, HttpAuthorizer, HttpAuthorizerConfig, TagCache};
/// use rfgate_core::{AntennaConfig, DeviceId, Direction};
/// use rfgate_gate::GateConfig;
/// use rfgate_network::{Supervisor, SupervisorConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let antenna = AntennaConfig::new(DeviceId::new(1)?, "10.0.0.5", 6000, Direction::Entry, "North");
/// let authorizer = HttpAuthorizer::new(HttpAuthorizerConfig::new("http://auth.local"))?;
/// let cache = Arc::new(TagCache::new(authorizer, CacheConfig::default()));
///
/// let (supervisor, handle) =
///     Supervisor::new(antenna, SupervisorConfig::default(), GateConfig::default(), cache);
/// let task = tokio::spawn(supervisor.run());
///
/// handle.open(None).await?;
/// handle.shutdown().await?;
/// task.await??;
/// # Ok(())
/// # }
/// ```
pub struct Supervisor<A> {
    antenna: AntennaConfig,
    config: SupervisorConfig,
    gate: Gate,
    cache: Arc<TagCache<A>>,

    control_rx: mpsc::Receiver<ControlRequest>,
    status_tx: watch::Sender<GateStatus>,
    auth_tx: mpsc::UnboundedSender<AuthOutcome>,
    auth_rx: mpsc::UnboundedReceiver<AuthOutcome>,

    /// Consecutive failed sessions; reset on successful connect
    retries: u32,
    /// Incremented whenever a session ends
    epoch: u64,
    /// Tags with a verification in flight
    pending_auth: HashSet<TagId>,
    connected: bool,
}

impl<A: Authorizer> Supervisor<A> {
    /// Create a supervisor and the handle used to control it.
    ///
    /// Nothing happens until [`run`](Self::run) is awaited.
    pub fn new(
        antenna: AntennaConfig,
        config: SupervisorConfig,
        gate_config: GateConfig,
        cache: Arc<TagCache<A>>,
    ) -> (Self, ControlHandle) {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
        let (status_tx, status_rx) =
            watch::channel(GateStatus::initial(antenna.device_id.as_u32()));
        let (auth_tx, auth_rx) = mpsc::unbounded_channel();
        let gate = Gate::new(gate_config, antenna.device_id.to_string());

        let supervisor = Self {
            antenna,
            config,
            gate,
            cache,
            control_rx,
            status_tx,
            auth_tx,
            auth_rx,
            retries: 0,
            epoch: 0,
            pending_auth: HashSet::new(),
            connected: false,
        };

        (supervisor, ControlHandle::new(control_tx, status_rx))
    }

    /// Supervise the antenna until shutdown or until the reconnect budget
    /// is spent.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::RetriesExhausted` once more than
    /// `max_reconnect_attempts` consecutive sessions have failed. No further
    /// reconnect is scheduled after that.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        info!(antenna = %self.antenna, "Starting connection supervisor");

        loop {
            let end = match self.connect().await {
                Ok(framed) => {
                    self.retries = 0;
                    self.run_session(framed).await
                }
                Err(e) => SessionEnd::ConnectFailed(e.to_string()),
            };

            self.end_session();

            match end {
                SessionEnd::Shutdown => {
                    info!(device_id = %self.antenna.device_id, "Supervisor stopped");
                    return Ok(());
                }
                SessionEnd::Restart => {
                    info!(device_id = %self.antenna.device_id, "Restarting connection");
                    continue;
                }
                ref other => {
                    warn!(device_id = %self.antenna.device_id, reason = %other, "Session ended");
                }
            }

            self.retries += 1;
            self.publish(None);
            if self.retries > self.config.max_reconnect_attempts {
                error!(
                    device_id = %self.antenna.device_id,
                    max = self.config.max_reconnect_attempts,
                    "Reconnect attempts exhausted"
                );
                return Err(SupervisorError::RetriesExhausted {
                    max: self.config.max_reconnect_attempts,
                });
            }

            info!(
                device_id = %self.antenna.device_id,
                attempt = self.retries,
                max = self.config.max_reconnect_attempts,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            if let Pause::Shutdown = self.pause_before_reconnect().await {
                info!(device_id = %self.antenna.device_id, "Supervisor stopped");
                return Ok(());
            }
        }
    }

    async fn connect(&self) -> Result<AntennaStream, SupervisorError> {
        let address = self.antenna.address();
        info!(device_id = %self.antenna.device_id, %address, "Connecting to antenna");

        let stream = match timeout(self.config.io_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(%address, error = %e, "Connection failed");
                return Err(e.into());
            }
            Err(_) => {
                let ms = self.config.io_timeout.as_millis() as u64;
                warn!(%address, "Connection timeout after {}ms", ms);
                return Err(SupervisorError::ConnectionTimeout(ms));
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {} - relay latency may be impacted", e);
        }

        info!(device_id = %self.antenna.device_id, %address, "Connected to antenna");
        Ok(Framed::new(stream, AntennaCodec::new()))
    }

    async fn run_session(&mut self, mut framed: AntennaStream) -> SessionEnd {
        let mut session = SessionState::new(
            self.config.healthcheck_interval,
            self.config.healthcheck_grace,
            Instant::now(),
        );
        self.gate.reset();
        self.connected = true;
        self.publish(Some(&session));

        // Baseline first; the filter follows only after the settle delay
        if let Err(e) = self.write(&mut framed, &mut session, Command::RelayClose).await {
            return SessionEnd::Fault(e.to_string());
        }
        session.arm_settle(Instant::now(), self.config.settle_delay);

        loop {
            let end = tokio::select! {
                frame = framed.next() => match frame {
                    Some(Ok(frame)) => {
                        session.touch(Instant::now());
                        self.on_frame(frame, &mut session)
                    }
                    Some(Err(e)) => Some(SessionEnd::Fault(e.to_string())),
                    None => Some(SessionEnd::PeerClosed),
                },

                _ = until(session.idle_deadline()) => {
                    match session.on_idle(self.gate.state(), Instant::now()) {
                        IdleVerdict::StuckOpen => Some(SessionEnd::StuckOpen),
                        IdleVerdict::LinkDead => Some(SessionEnd::LinkDead),
                        IdleVerdict::SendHealthcheck => {
                            debug!(device_id = %self.antenna.device_id, "Link idle, sending healthcheck");
                            self.send(&mut framed, &mut session, Command::Healthcheck).await
                        }
                    }
                }

                _ = until(session.grace_deadline()) => {
                    session
                        .on_grace_elapsed()
                        .then_some(SessionEnd::HealthcheckTimeout)
                }

                _ = until(session.settle_deadline()) => {
                    session.on_settle_elapsed();
                    self.send(&mut framed, &mut session, Command::ReadFilter).await
                }

                _ = until(self.gate.auto_close_deadline()) => {
                    match self.gate.on_auto_close(Instant::now()) {
                        Some(command) => self.send(&mut framed, &mut session, command).await,
                        None => None,
                    }
                }

                _ = until(self.gate.closing_deadline()) => {
                    self.gate.on_closing_settled(Instant::now());
                    None
                }

                Some(outcome) = self.auth_rx.recv() => {
                    self.on_auth_outcome(outcome, &mut framed, &mut session).await
                }

                Some(request) = self.control_rx.recv() => {
                    self.on_control(request, &mut framed, &mut session).await
                }
            };

            self.publish(Some(&session));
            if let Some(end) = end {
                return end;
            }
        }
    }

    fn on_frame(&mut self, frame: InboundFrame, session: &mut SessionState) -> Option<SessionEnd> {
        trace!(device_id = %self.antenna.device_id, kind = frame.label(), "Frame received");

        match frame {
            InboundFrame::HealthcheckAck => {
                session.on_healthcheck_ack();
                None
            }
            InboundFrame::FilterAck { success: true } => {
                session.on_filter_ack();
                info!(device_id = %self.antenna.device_id, "Read filter applied");
                None
            }
            InboundFrame::FilterAck { success: false } => {
                error!(device_id = %self.antenna.device_id, "Antenna rejected the read filter");
                Some(SessionEnd::FilterRejected)
            }
            InboundFrame::GateClosedAck => {
                self.gate.on_closed_ack();
                None
            }
            InboundFrame::GateOpenedAck => {
                self.gate.on_opened_ack(Instant::now());
                None
            }
            InboundFrame::TagRead { tag } => {
                self.on_tag_read(&tag);
                None
            }
            InboundFrame::Unknown { hex } => {
                debug!(device_id = %self.antenna.device_id, %hex, "Unknown frame");
                None
            }
        }
    }

    /// Route a tag read by gate state. Reads during OPENING or CLOSING, and
    /// reads of any tag but the holder while OPEN, are dropped.
    fn on_tag_read(&mut self, raw: &str) {
        let tag = match TagId::parse(raw) {
            Ok(tag) => tag,
            Err(e) => {
                debug!(device_id = %self.antenna.device_id, raw, error = %e, "Ignoring malformed tag");
                return;
            }
        };

        let state = self.gate.state();
        match state {
            GateState::Closed => self.spawn_authorization(tag),
            GateState::Open => {
                if !self.gate.rearm(&tag, Instant::now()) {
                    debug!(device_id = %self.antenna.device_id, tag = %tag, "Gate held by another tag");
                }
            }
            GateState::Opening | GateState::Closing => {
                debug!(device_id = %self.antenna.device_id, tag = %tag, %state, "Tag read ignored");
            }
        }
    }

    fn spawn_authorization(&mut self, tag: TagId) {
        if !self.pending_auth.insert(tag.clone()) {
            trace!(tag = %tag, "Verification already in flight");
            return;
        }

        let cache = Arc::clone(&self.cache);
        let antenna = self.antenna.clone();
        let outcomes = self.auth_tx.clone();
        let epoch = self.epoch;

        tokio::spawn(async move {
            let result = cache.authorize(tag.as_str(), &antenna).await;
            // The supervisor may have stopped; nothing left to notify
            let _ = outcomes.send(AuthOutcome { epoch, tag, result });
        });
    }

    async fn on_auth_outcome(
        &mut self,
        outcome: AuthOutcome,
        framed: &mut AntennaStream,
        session: &mut SessionState,
    ) -> Option<SessionEnd> {
        if outcome.epoch != self.epoch {
            debug!(tag = %outcome.tag, "Discarding verification from a previous session");
            return None;
        }
        self.pending_auth.remove(&outcome.tag);

        let AuthOutcome { tag, result, .. } = outcome;
        self.spawn_registration(tag.clone(), result.is_valid);

        if !result.is_valid {
            info!(
                device_id = %self.antenna.device_id,
                tag = %tag,
                reason = result.reason.as_deref().unwrap_or(""),
                "Access denied"
            );
            return None;
        }

        match self.gate.open(Some(tag.clone()), None) {
            Ok(command) => {
                info!(device_id = %self.antenna.device_id, tag = %tag, cached = result.cached, "Access granted");
                let end = self.send(framed, session, command).await;
                if end.is_none() {
                    self.gate.confirm_open(Instant::now());
                }
                end
            }
            Err(e) => {
                debug!(device_id = %self.antenna.device_id, tag = %tag, error = %e, "Authorized tag ignored");
                None
            }
        }
    }

    fn spawn_registration(&self, tag: TagId, authorized: bool) {
        let cache = Arc::clone(&self.cache);
        let antenna = self.antenna.clone();
        tokio::spawn(async move {
            cache.register_access(&tag, &antenna, authorized).await;
        });
    }

    async fn on_control(
        &mut self,
        request: ControlRequest,
        framed: &mut AntennaStream,
        session: &mut SessionState,
    ) -> Option<SessionEnd> {
        match request {
            ControlRequest::Open { auto_close, reply } => match self.gate.open(None, auto_close) {
                Ok(command) => {
                    info!(device_id = %self.antenna.device_id, "Manual open");
                    let end = self.send(framed, session, command).await;
                    let response = match &end {
                        None => {
                            self.gate.confirm_open(Instant::now());
                            ControlResponse::ok("Gate opened", self.gate.state())
                        }
                        Some(e) => ControlResponse::failed(e.to_string(), self.gate.state()),
                    };
                    respond(reply, response);
                    end
                }
                Err(e) => {
                    respond(reply, ControlResponse::failed(e.to_string(), self.gate.state()));
                    None
                }
            },
            ControlRequest::Close { reply } => match self.gate.close(Instant::now()) {
                Ok(command) => {
                    info!(device_id = %self.antenna.device_id, "Manual close");
                    let end = self.send(framed, session, command).await;
                    let response = match &end {
                        None => ControlResponse::ok("Gate closing", self.gate.state()),
                        Some(e) => ControlResponse::failed(e.to_string(), self.gate.state()),
                    };
                    respond(reply, response);
                    end
                }
                Err(e) => {
                    respond(reply, ControlResponse::failed(e.to_string(), self.gate.state()));
                    None
                }
            },
            ControlRequest::Restart { reply } => {
                respond(reply, ControlResponse::ok("Restarting connection", self.gate.state()));
                Some(SessionEnd::Restart)
            }
            ControlRequest::Shutdown => Some(SessionEnd::Shutdown),
        }
    }

    /// Wait out the reconnect delay, answering control requests meanwhile.
    async fn pause_before_reconnect(&mut self) -> Pause {
        let deadline = Instant::now() + self.config.reconnect_delay;

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return Pause::Elapsed,

                Some(request) = self.control_rx.recv() => match request {
                    ControlRequest::Shutdown => return Pause::Shutdown,
                    ControlRequest::Restart { reply } => {
                        respond(reply, ControlResponse::ok("Reconnecting now", GateState::Closed));
                        return Pause::Elapsed;
                    }
                    ControlRequest::Open { reply, .. } | ControlRequest::Close { reply } => {
                        respond(reply, ControlResponse::failed(NOT_CONNECTED, self.gate.state()));
                    }
                },
            }
        }
    }

    /// Write `command`, mapping failure to a session end.
    async fn send(
        &self,
        framed: &mut AntennaStream,
        session: &mut SessionState,
        command: Command,
    ) -> Option<SessionEnd> {
        match self.write(framed, session, command).await {
            Ok(()) => None,
            Err(e) => Some(SessionEnd::Fault(e.to_string())),
        }
    }

    async fn write(
        &self,
        framed: &mut AntennaStream,
        session: &mut SessionState,
        command: Command,
    ) -> Result<(), SupervisorError> {
        trace!(device_id = %self.antenna.device_id, %command, "Writing command");

        let frame = self.config.commands.frame(command);
        match timeout(self.config.io_timeout, framed.send(frame)).await {
            Ok(Ok(())) => {
                session.touch(Instant::now());
                Ok(())
            }
            Ok(Err(e)) => {
                error!(%command, error = %e, "Failed to write command");
                Err(e.into())
            }
            Err(_) => {
                let ms = self.config.io_timeout.as_millis() as u64;
                warn!(%command, "Write timeout after {}ms", ms);
                Err(SupervisorError::WriteTimeout(ms))
            }
        }
    }

    /// Tear down per-session state. Runs after every session, including
    /// failed connects.
    fn end_session(&mut self) {
        self.connected = false;
        self.epoch += 1;
        self.pending_auth.clear();
        self.gate.reset();
        self.publish(None);
    }

    fn publish(&self, session: Option<&SessionState>) {
        self.status_tx.send_replace(GateStatus {
            device_id: self.antenna.device_id.as_u32(),
            state: self.gate.state(),
            connected: self.connected,
            filter_applied: session.is_some_and(SessionState::filter_applied),
            holder: self.gate.holder().map(|tag| tag.as_str().to_string()),
            reconnect_attempts: self.retries,
            recent_transitions: self.gate.last_transitions(STATUS_HISTORY_LEN),
        });
    }
}

fn respond(reply: oneshot::Sender<ControlResponse>, response: ControlResponse) {
    if reply.send(response).is_err() {
        debug!("Control caller went away before the response");
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_until_sleeps_to_deadline() {
        let start = Instant::now();
        until(Some(start + Duration::from_secs(3))).await;
        assert_eq!(Instant::now() - start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_none_never_fires() {
        let fired = timeout(Duration::from_secs(3600), until(None)).await;
        assert!(fired.is_err());
    }
}
