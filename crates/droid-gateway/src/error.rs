//! Error types for gateway initialization and authorization

use provider::ProviderError;

/// Errors surfaced by the authorization façade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] common::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl Error {
    /// Suggested HTTP status for the collaborator that turns this into a response.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Provider(e) => e.status_code(),
        }
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_keep_their_status() {
        let err = Error::from(ProviderError::NoAuthorizationAvailable);
        assert_eq!(err.status_code(), 401);
        assert!(err.to_string().starts_with("no authorization available"));
    }

    #[test]
    fn config_errors_are_internal() {
        let err = Error::from(common::Error::Config("bad endpoint".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.to_string(), "Configuration error: bad endpoint");
    }
}
