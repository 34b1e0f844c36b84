// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced store wrapper for consistent observability

use crate::transaction::{Plan, Read, Snapshot};
use crate::{Store, StoreError, Ttl};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Wrapper that adds tracing to any Store
#[derive(Clone)]
pub struct TracedStore<S> {
    inner: S,
}

impl<S> TracedStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[async_trait]
impl<S: Store> Store for TracedStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self.inner.get(key).await;
        tracing::trace!(key, found = ?result.as_ref().ok().map(Option::is_some), "get");
        result
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        let span = tracing::info_span!("store.del", keys = ?keys);
        async {
            let result = self.inner.del(keys).await;
            match &result {
                Ok(deleted) => tracing::debug!(deleted, "deleted"),
                Err(e) => tracing::error!(error = %e, "delete failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let result = self.inner.exists(key).await;
        tracing::trace!(key, exists = ?result.as_ref().ok(), "checked");
        result
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let start = Instant::now();
        let result = self.inner.keys(pattern).await;
        tracing::debug!(
            pattern,
            count = result.as_ref().map(Vec::len).ok(),
            elapsed_ms = elapsed_ms(start),
            "scanned keys"
        );
        result
    }

    async fn ttl(&self, key: &str) -> Result<Ttl, StoreError> {
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let result = self.inner.expire(key, ttl).await;
        tracing::trace!(
            key,
            ttl_ms = ttl.as_millis() as u64,
            applied = ?result.as_ref().ok(),
            "expire"
        );
        result
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self.inner.lpop(key).await;
        match &result {
            Ok(popped) => tracing::debug!(key, popped = ?popped, "lpop"),
            Err(e) => tracing::error!(key, error = %e, "lpop failed"),
        }
        result
    }

    async fn blpop(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, StoreError> {
        let timeout_ms = timeout.map(|t| t.as_millis() as u64);
        let span = tracing::info_span!("store.blpop", key, timeout_ms);
        async {
            tracing::debug!("waiting");
            let start = Instant::now();
            let result = self.inner.blpop(key, timeout).await;

            match &result {
                Ok(Some(token)) => tracing::debug!(%token, elapsed_ms = elapsed_ms(start), "popped"),
                Ok(None) => tracing::debug!(elapsed_ms = elapsed_ms(start), "timed out"),
                Err(e) => tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "blpop failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        self.inner.llen(key).await
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.lrange(key).await
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let result = self.inner.hset(key, field, value).await;
        if let Err(e) = &result {
            tracing::error!(key, field, error = %e, "hset failed");
        }
        result
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.inner.hexists(key, field).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.inner.hgetall(key).await
    }

    async fn time(&self) -> Result<f64, StoreError> {
        self.inner.time().await
    }

    async fn transaction<T, F>(&self, reads: &[Read], plan: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnMut(&Snapshot) -> Plan<T> + Send,
    {
        let keys: Vec<&str> = reads.iter().map(Read::key).collect();
        let span = tracing::info_span!("store.transaction", keys = ?keys);
        async {
            let start = Instant::now();
            let result = self.inner.transaction(reads, plan).await;

            match &result {
                Ok(_) => tracing::debug!(elapsed_ms = elapsed_ms(start), "committed"),
                Err(e) => {
                    tracing::error!(elapsed_ms = elapsed_ms(start), error = %e, "transaction failed")
                }
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
