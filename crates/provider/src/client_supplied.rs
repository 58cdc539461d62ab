//! Client-supplied provider: forwards the inbound Authorization header.
//!
//! Active when no local credential source is configured. The gateway holds
//! no state in this mode; the client must bring its own credential.

use crate::{Provider, ProviderError, ProviderHealth};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Passes the client's Authorization header through verbatim.
#[derive(Debug, Default)]
pub struct ClientSuppliedProvider;

impl ClientSuppliedProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Provider for ClientSuppliedProvider {
    fn id(&self) -> &str {
        "client_supplied"
    }

    fn authorization<'a>(
        &'a self,
        client_authorization: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = crate::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            match client_authorization {
                Some(value) if !value.is_empty() => {
                    debug!("using client authorization header");
                    Ok(value.to_string())
                }
                _ => Err(ProviderError::NoAuthorizationAvailable),
            }
        })
    }

    fn health(&self) -> Pin<Box<dyn Future<Output = ProviderHealth> + Send + '_>> {
        Box::pin(async { ProviderHealth::healthy() })
    }
}
