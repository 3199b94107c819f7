//! Boundary contract with the external access-control service.
//!
//! Responses are validated once, here, into the closed [`AuthDecision`] sum
//! type. Nothing past this module inspects raw response bodies.

use std::future::Future;

use chrono::{DateTime, Utc};
use rfgate_core::{AntennaConfig, Direction, TagId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;

/// Body of `POST /access/verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub tag_id: String,
    pub device_id: u32,
    pub direction: Direction,
}

impl VerifyRequest {
    pub fn new(tag: &TagId, antenna: &AntennaConfig) -> Self {
        Self {
            tag_id: tag.as_str().to_string(),
            device_id: antenna.device_id.as_u32(),
            direction: antenna.direction,
        }
    }
}

/// Outcome of one verification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized,
    Denied { reason: String },
    /// The service did not answer within the client timeout
    TimedOut,
    /// The service could not be reached or answered outside the contract
    TransportError { reason: String },
}

impl AuthDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthDecision::Authorized)
    }
}

/// Body of `POST /access/register`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub event_id: Uuid,
    pub tag_id: String,
    pub device_id: u32,
    pub direction: Direction,
    pub antenna_name: String,
    pub authorized: bool,
    pub timestamp: DateTime<Utc>,
}

impl AccessEvent {
    /// New event with a fresh v4 id, stamped now.
    pub fn new(tag: &TagId, antenna: &AntennaConfig, authorized: bool) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tag_id: tag.as_str().to_string(),
            device_id: antenna.device_id.as_u32(),
            direction: antenna.direction,
            antenna_name: antenna.name.clone(),
            authorized,
            timestamp: Utc::now(),
        }
    }
}

/// Response of `POST /access/register`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisterStatus {
    pub status: String,
}

/// External authorization collaborator.
///
/// Implementations must be cheap to share: the supervisor calls them from
/// spawned tasks through an `Arc<TagCache<_>>`.
pub trait Authorizer: Send + Sync + 'static {
    /// Ask whether `request.tag_id` may pass.
    fn verify(&self, request: &VerifyRequest) -> impl Future<Output = AuthDecision> + Send;

    /// Record an access event for the audit trail.
    fn register(&self, event: &AccessEvent) -> impl Future<Output = AuthResult<RegisterStatus>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfgate_core::DeviceId;

    fn antenna() -> AntennaConfig {
        AntennaConfig::new(
            DeviceId::new(4).unwrap(),
            "10.0.0.4",
            6000,
            Direction::Exit,
            "Exit lane",
        )
    }

    #[test]
    fn test_verify_request_is_camel_case() {
        let tag = TagId::parse("0123456789").unwrap();
        let json = serde_json::to_value(VerifyRequest::new(&tag, &antenna())).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "tagId": "0123456789",
                "deviceId": 4,
                "direction": "exit"
            })
        );
    }

    #[test]
    fn test_access_event_payload() {
        let tag = TagId::parse("0123456789").unwrap();
        let event = AccessEvent::new(&tag, &antenna(), true);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["tagId"], "0123456789");
        assert_eq!(json["antennaName"], "Exit lane");
        assert_eq!(json["authorized"], true);
        assert_eq!(json["eventId"].as_str().unwrap().len(), 36);
        assert!(
            DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok()
        );
    }

    #[test]
    fn test_events_get_distinct_ids() {
        let tag = TagId::parse("0123456789").unwrap();
        let a = AccessEvent::new(&tag, &antenna(), false);
        let b = AccessEvent::new(&tag, &antenna(), false);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_decision_is_authorized() {
        assert!(AuthDecision::Authorized.is_authorized());
        assert!(
            !AuthDecision::TransportError {
                reason: "down".into()
            }
            .is_authorized()
        );
    }
}
