//! Tag authorization for rfgate.
//!
//! [`TagCache`] sits in front of an external [`Authorizer`]: it sanitises and
//! validates raw tag strings, serves live cached decisions, bounds every
//! external call with a timeout and fails closed on any ambiguity.
//! [`HttpAuthorizer`] is the production authorizer speaking to the
//! access-control service over HTTP.

pub mod authorizer;
pub mod cache;
pub mod error;
pub mod http;

pub use authorizer::{AccessEvent, AuthDecision, Authorizer, RegisterStatus, VerifyRequest};
pub use cache::{CacheConfig, TagCache, ValidationResult};
pub use error::{AuthError, AuthResult};
pub use http::{HttpAuthorizer, HttpAuthorizerConfig};
