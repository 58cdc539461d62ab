//! Shared types for the droid gateway credential crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
