//! Identity-provider constants
//!
//! The refresh endpoint and client-id prefix identify the public client
//! registration. They are not secrets; the secrets are the refresh and
//! access tokens held by each account.

use std::time::Duration;

/// Token endpoint for refresh-token exchange
pub const TOKEN_ENDPOINT: &str = "https://api.workos.com/user_management/authenticate";

/// Literal prefix the identity provider expects on every client id
pub const CLIENT_ID_PREFIX: &str = "client_01";

/// Cached access tokens older than this are refreshed before use.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Nominal access-token lifetime reported by the identity provider.
/// Informational only: refresh is driven solely by `REFRESH_INTERVAL`.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(8 * 60 * 60);

/// Upper bound on a single refresh request.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_interval_is_six_hours_in_millis() {
        assert_eq!(REFRESH_INTERVAL.as_millis(), 21_600_000);
    }

    #[test]
    fn refresh_happens_before_nominal_expiry() {
        assert!(REFRESH_INTERVAL < TOKEN_LIFETIME);
    }
}
