//! Error types for token refresh and persistence

/// Errors from token refresh and credential-file operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("no access token available: {0}")]
    MissingToken(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
