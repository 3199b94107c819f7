//! Manual control of a running supervisor.
//!
//! Requests are queued to the supervisor's event loop and executed there, so
//! a manual open goes through the same state guard and the same write path
//! as an authorized tag.

use std::time::Duration;

use rfgate_gate::{GateState, GateTransition};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::SupervisorError;

/// Capacity of the control request queue.
pub(crate) const CONTROL_QUEUE_SIZE: usize = 32;

/// Transitions included in a status snapshot.
pub(crate) const STATUS_HISTORY_LEN: usize = 10;

/// Request executed by the supervisor loop.
#[derive(Debug)]
pub enum ControlRequest {
    Open {
        auto_close: Option<Duration>,
        reply: oneshot::Sender<ControlResponse>,
    },
    Close {
        reply: oneshot::Sender<ControlResponse>,
    },
    Restart {
        reply: oneshot::Sender<ControlResponse>,
    },
    Shutdown,
}

/// Structured answer to a manual request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub state: GateState,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>, state: GateState) -> Self {
        Self {
            success: true,
            message: message.into(),
            state,
        }
    }

    pub fn failed(message: impl Into<String>, state: GateState) -> Self {
        Self {
            success: false,
            message: message.into(),
            state,
        }
    }
}

/// Snapshot published after every supervisor event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub device_id: u32,
    pub state: GateState,
    pub connected: bool,
    /// The antenna acknowledged the read filter on the current connection
    pub filter_applied: bool,
    pub holder: Option<String>,
    pub reconnect_attempts: u32,
    pub recent_transitions: Vec<GateTransition>,
}

impl GateStatus {
    pub(crate) fn initial(device_id: u32) -> Self {
        Self {
            device_id,
            state: GateState::Closed,
            connected: false,
            filter_applied: false,
            holder: None,
            reconnect_attempts: 0,
            recent_transitions: Vec::new(),
        }
    }
}

/// Cloneable handle to a [`Supervisor`](crate::Supervisor).
#[derive(Debug, Clone)]
pub struct ControlHandle {
    requests: mpsc::Sender<ControlRequest>,
    status: watch::Receiver<GateStatus>,
}

impl ControlHandle {
    pub(crate) fn new(
        requests: mpsc::Sender<ControlRequest>,
        status: watch::Receiver<GateStatus>,
    ) -> Self {
        Self { requests, status }
    }

    /// Open the gate, optionally overriding the auto-close duration.
    pub async fn open(&self, auto_close: Option<Duration>) -> Result<ControlResponse, SupervisorError> {
        self.request(|reply| ControlRequest::Open { auto_close, reply })
            .await
    }

    pub async fn close(&self) -> Result<ControlResponse, SupervisorError> {
        self.request(|reply| ControlRequest::Close { reply }).await
    }

    /// Drop the current connection and reconnect without waiting.
    pub async fn restart(&self) -> Result<ControlResponse, SupervisorError> {
        self.request(|reply| ControlRequest::Restart { reply }).await
    }

    /// Stop the supervisor. `run` returns `Ok(())` afterwards.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        self.requests
            .send(ControlRequest::Shutdown)
            .await
            .map_err(|_| SupervisorError::Stopped)
    }

    /// Latest published status.
    pub fn status(&self) -> GateStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<GateStatus> {
        self.status.clone()
    }

    async fn request<F>(&self, build: F) -> Result<ControlResponse, SupervisorError>
    where
        F: FnOnce(oneshot::Sender<ControlResponse>) -> ControlRequest,
    {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| SupervisorError::Stopped)?;
        response.await.map_err(|_| SupervisorError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_round_trip() {
        let (tx, mut rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
        let (_status_tx, status_rx) = watch::channel(GateStatus::initial(1));
        let handle = ControlHandle::new(tx, status_rx);

        tokio::spawn(async move {
            if let Some(ControlRequest::Open { auto_close, reply }) = rx.recv().await {
                assert_eq!(auto_close, Some(Duration::from_secs(5)));
                reply
                    .send(ControlResponse::ok("Gate opened", GateState::Open))
                    .unwrap();
            }
        });

        let response = handle.open(Some(Duration::from_secs(5))).await.unwrap();
        assert!(response.success);
        assert_eq!(response.state, GateState::Open);
    }

    #[tokio::test]
    async fn test_stopped_supervisor() {
        let (tx, rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
        let (_status_tx, status_rx) = watch::channel(GateStatus::initial(1));
        let handle = ControlHandle::new(tx, status_rx);
        drop(rx);

        assert!(matches!(handle.close().await, Err(SupervisorError::Stopped)));
        assert!(matches!(handle.shutdown().await, Err(SupervisorError::Stopped)));
    }

    #[tokio::test]
    async fn test_dropped_reply_is_stopped() {
        let (tx, mut rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
        let (_status_tx, status_rx) = watch::channel(GateStatus::initial(1));
        let handle = ControlHandle::new(tx, status_rx);

        tokio::spawn(async move {
            // Receive and drop without replying
            let _ = rx.recv().await;
        });

        assert!(matches!(handle.restart().await, Err(SupervisorError::Stopped)));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let json = serde_json::to_value(GateStatus::initial(7)).unwrap();
        assert_eq!(json["deviceId"], 7);
        assert_eq!(json["state"], "CLOSED");
        assert_eq!(json["reconnectAttempts"], 0);
        assert_eq!(json["connected"], false);
        assert_eq!(json["filterApplied"], false);
    }
}
