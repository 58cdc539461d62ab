//! Provider abstraction for outbound request authorization
//!
//! Defines the `Provider` trait that decouples the HTTP collaborator from the
//! credential strategy. Every credential source (fixed key, account pool,
//! refresh token, client-supplied header) implements the same trait, so the
//! proxy only ever asks "what Authorization value goes on this request?".

pub mod client_supplied;

pub use client_supplied::ClientSuppliedProvider;

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Health status reported by a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderHealth {
    /// Overall status: "healthy", "degraded", or "unhealthy"
    pub status: String,
    /// Provider-specific details (e.g. pool account counts in pool mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ProviderHealth {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            detail: None,
        }
    }
}

/// Errors from obtaining an outbound credential.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("no authorization available: configure a fixed key or refresh token, or send an Authorization header")]
    NoAuthorizationAvailable,

    #[error("internal provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Suggested HTTP status for the collaborator that turns this into a response.
    ///
    /// A missing client credential is the caller's fault (401); everything
    /// else means the gateway could not produce a credential right now.
    pub fn status_code(&self) -> u16 {
        match self {
            ProviderError::NoAuthorizationAvailable => 401,
            ProviderError::PoolExhausted(_) => 503,
            ProviderError::Auth(_) => 502,
            ProviderError::Internal(_) => 500,
        }
    }
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Abstraction over outbound credential strategies.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Provider>`).
pub trait Provider: Send + Sync {
    /// Identifier for logging and health reporting (e.g. "pool", "fixed_key")
    fn id(&self) -> &str;

    /// Produce the full `Authorization` header value for one outbound request.
    ///
    /// `client_authorization` is the inbound request's own Authorization
    /// header, if any. Only the client-supplied provider uses it.
    fn authorization<'a>(
        &'a self,
        client_authorization: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Provider health for diagnostics.
    fn health(&self) -> Pin<Box<dyn Future<Output = ProviderHealth> + Send + '_>>;

    /// Obtain credentials ahead of the first request. Providers without
    /// refreshable state have nothing to do.
    fn warm_up(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_by_variant() {
        assert_eq!(ProviderError::NoAuthorizationAvailable.status_code(), 401);
        assert_eq!(ProviderError::PoolExhausted("x".into()).status_code(), 503);
        assert_eq!(ProviderError::Auth("x".into()).status_code(), 502);
        assert_eq!(ProviderError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn health_serializes_without_empty_detail() {
        let json = serde_json::to_value(ProviderHealth::healthy()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "healthy"}));
    }
}
