//! Token lifecycle for the droid gateway
//!
//! Provides refresh-token exchange against the identity provider, credential
//! file persistence, and the `Account` type that ties a credential to its
//! staleness state. This crate has no knowledge of pools or credential
//! sources; it can be tested and used on its own.
//!
//! Refresh flow for one refreshable account:
//! 1. `Account::ensure_token()` finds the cached access token missing or older than 6 hours
//! 2. `TokenRefresher::refresh()` exchanges the refresh token (form POST)
//! 3. The account swaps in the rotated access/refresh pair
//! 4. Singleton accounts write the pair through `TokenFile::save()`

pub mod account;
pub mod client_id;
pub mod constants;
pub mod error;
pub mod token;
pub mod token_file;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use account::{Account, AccountKind, AccountSnapshot, is_stale};
pub use client_id::{ClientIdGenerator, FixedClientId, UuidV7ClientId};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{TokenRefresher, TokenResponse, UserInfo};
pub use token_file::TokenFile;
