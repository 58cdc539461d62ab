//! Outbound credential management for the droid gateway
//!
//! Decides once at startup where outbound credentials come from (fixed key,
//! account pool, refresh token from env or file, or the client's own header)
//! and produces an `Authorization` value for every proxied request, keeping
//! refreshable tokens fresh and persisting rotated ones.
//!
//! ```no_run
//! # async fn run() -> droid_gateway::Result<()> {
//! use droid_gateway::{AuthorizationProvider, Config};
//!
//! droid_gateway::telemetry::init();
//! let config = Config::load_or_default(&Config::resolve_path(None))?;
//! let auth = AuthorizationProvider::initialize(&config).await?;
//! let header = auth.authorization(None).await?;
//! # let _ = header;
//! # Ok(())
//! # }
//! ```

pub mod authorization;
pub mod config;
pub mod error;
pub mod provider_impl;
pub mod resolver;
pub mod telemetry;

/// Serializes tests that mutate process environment variables; every test
/// module in this crate that calls `set_var`/`remove_var` must hold it.
#[cfg(test)]
pub(crate) static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

pub use authorization::AuthorizationProvider;
pub use config::Config;
pub use error::{Error, Result};
pub use resolver::{
    CredentialSource, CredentialSourceResolver, Resolution, ResolveInputs, ResolveStrategy,
};
