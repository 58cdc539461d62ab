//! Multi-account pool with round-robin failover
//!
//! Holds a fixed, ordered set of accounts (static keys and refreshable token
//! pairs) and hands out one Bearer credential per request. Each request
//! starts at the rotation cursor and tries every account at most once,
//! skipping accounts whose refresh fails. Failed accounts stay in the pool
//! and are tried again on later requests.
//!
//! Pool accounts are never persisted to disk; their rotated tokens live only
//! in memory for the process lifetime.

pub mod error;
pub mod pool;
pub mod refresh;

pub use error::{Error, Result};
pub use pool::AccountPool;
pub use refresh::spawn_refresh_task;
