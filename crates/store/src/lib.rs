// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Shared key-value store backends for the locking engine
//!
//! The engine only talks to the [`Store`] trait. [`RedisStore`] is the
//! production backend; `FakeStore` is an in-memory stand-in with the same
//! semantics, available to tests via the `test-support` feature.

mod redis_store;
pub mod traced;
pub mod transaction;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use redis_store::RedisStore;
pub use traced::TracedStore;
pub use transaction::{Command, Plan, Read, Snapshot, MAX_TRANSACTION_ATTEMPTS};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeStore, StoreCall};

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },
    #[error("timed out after {0:?} connecting to redis")]
    ConnectTimeout(Duration),
    #[error("transaction on {keys:?} kept conflicting after {attempts} attempts")]
    TransactionConflict { keys: Vec<String>, attempts: u32 },
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Missing,
    Persistent,
    Expires(Duration),
}

/// Capabilities the locking engine needs from the shared store
///
/// Single-key operations are individually atomic. Anything touching more
/// than one key goes through [`Store::transaction`].
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys matching a glob pattern (`*`, `?`)
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    async fn ttl(&self, key: &str) -> Result<Ttl, StoreError>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Pop the head of a list without blocking
    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Pop the head of a list, parking until an item arrives or `timeout`
    /// elapses. `None` waits forever. Waiters are served in FIFO order.
    async fn blpop(&self, key: &str, timeout: Option<Duration>)
        -> Result<Option<String>, StoreError>;

    async fn llen(&self, key: &str) -> Result<u64, StoreError>;

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// The store's own clock, as fractional seconds since the Unix epoch
    async fn time(&self) -> Result<f64, StoreError>;

    /// Read `reads` under a watch, plan commands from the snapshot and apply
    /// them atomically. Re-plans on conflict, up to
    /// [`MAX_TRANSACTION_ATTEMPTS`] times.
    async fn transaction<T, F>(&self, reads: &[Read], plan: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnMut(&Snapshot) -> Plan<T> + Send;
}
