//! Client id generation
//!
//! Every refresh call carries a `client_id` of the form `client_01<suffix>`,
//! where the suffix is a fixed-length, time-ordered unique id. One id is
//! generated per process and reused for every refresh.

use uuid::Uuid;

use crate::constants::CLIENT_ID_PREFIX;

/// Source of the process-wide client id.
pub trait ClientIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Generates `client_01` followed by a UUIDv7 in 32-char simple form.
///
/// UUIDv7 leads with a millisecond timestamp, so ids sort by creation time.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7ClientId;

impl ClientIdGenerator for UuidV7ClientId {
    fn generate(&self) -> String {
        format!("{CLIENT_ID_PREFIX}{}", Uuid::now_v7().as_simple())
    }
}

/// Always returns the configured id (a registered client).
#[derive(Debug, Clone)]
pub struct FixedClientId(pub String);

impl ClientIdGenerator for FixedClientId {
    fn generate(&self) -> String {
        self.0.clone()
    }
}
