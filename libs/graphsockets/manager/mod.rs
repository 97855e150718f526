//! # GraphSockets Manager
//!
//! Shares open streaming connections between subscriptions.

pub mod pool;

pub use pool::{ConnectionPool, PoolKey};
