//! HTTP client for the access-control service.
//!
//! - `POST {base}/access/verify` with [`VerifyRequest`] → `{authorized, reason?}`
//! - `POST {base}/access/register` with [`AccessEvent`] → `{status}`

use std::time::Duration;

use rfgate_core::constants::DEFAULT_AUTH_TIMEOUT_MS;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::{AccessEvent, AuthDecision, AuthError, AuthResult, Authorizer, RegisterStatus, VerifyRequest};

const VERIFY_PATH: &str = "/access/verify";
const REGISTER_PATH: &str = "/access/register";

/// Reason used when the service denies without giving one.
const DEFAULT_DENY_REASON: &str = "denied";

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    authorized: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP authorizer configuration.
#[derive(Debug, Clone)]
pub struct HttpAuthorizerConfig {
    /// Service root, e.g. `http://auth.local:8080`
    pub base_url: String,

    /// Client-side bound on each request
    pub timeout: Duration,
}

impl HttpAuthorizerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_millis(DEFAULT_AUTH_TIMEOUT_MS),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`Authorizer`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAuthorizer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthorizer {
    /// Build a client for `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the base URL is not an
    /// `http://` or `https://` URL, and `AuthError::Http` if the client
    /// cannot be built.
    pub fn new(config: HttpAuthorizerConfig) -> AuthResult<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(AuthError::Configuration(format!(
                "Authorization base URL must be http(s), got {:?}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_verify(&self, request: &VerifyRequest) -> AuthResult<VerifyResponse> {
        let url = format!("{}{VERIFY_PATH}", self.base_url);
        trace!(%url, tag = %request.tag_id, "Verifying tag");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<VerifyResponse>().await?)
    }
}

impl Authorizer for HttpAuthorizer {
    async fn verify(&self, request: &VerifyRequest) -> AuthDecision {
        match self.post_verify(request).await {
            Ok(VerifyResponse {
                authorized: true, ..
            }) => AuthDecision::Authorized,
            Ok(VerifyResponse {
                authorized: false,
                reason,
            }) => AuthDecision::Denied {
                reason: reason.unwrap_or_else(|| DEFAULT_DENY_REASON.to_string()),
            },
            Err(AuthError::Http(e)) if e.is_timeout() => {
                debug!(tag = %request.tag_id, error = %e, "Verify request timed out");
                AuthDecision::TimedOut
            }
            Err(e) => {
                debug!(tag = %request.tag_id, error = %e, "Verify request failed");
                AuthDecision::TransportError {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn register(&self, event: &AccessEvent) -> AuthResult<RegisterStatus> {
        let url = format!("{}{REGISTER_PATH}", self.base_url);
        trace!(%url, event_id = %event.event_id, "Registering access");

        let response = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<RegisterStatus>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let authorizer =
            HttpAuthorizer::new(HttpAuthorizerConfig::new("http://auth.local:8080/")).unwrap();
        assert_eq!(authorizer.base_url(), "http://auth.local:8080");
    }

    #[rstest]
    #[case("")]
    #[case("auth.local")]
    #[case("ftp://auth.local")]
    fn test_rejects_non_http_base_url(#[case] base_url: &str) {
        assert!(matches!(
            HttpAuthorizer::new(HttpAuthorizerConfig::new(base_url)),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_verify_response_reason_is_optional() {
        let response: VerifyResponse = serde_json::from_str(r#"{"authorized": true}"#).unwrap();
        assert!(response.authorized);
        assert!(response.reason.is_none());
    }
}
