use thiserror::Error;

/// Failures talking to the authorization service.
///
/// Verification never surfaces these to the gate: they are folded into
/// [`AuthDecision::TransportError`](crate::AuthDecision::TransportError) and
/// from there into a denied result. Registration failures are logged only.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Request could not be sent, returned a non-2xx status, or had a body
    /// that did not match the contract
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The call did not finish within the client-side bound
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    /// Authorizer configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized result type for authorization operations
pub type AuthResult<T> = Result<T, AuthError>;
