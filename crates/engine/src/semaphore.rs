// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counting semaphore shared across processes through the store
//!
//! A pool of interchangeable tokens lives in `AVAILABLE`. Acquiring pops a
//! token and records its checkout time in `GRABBED`; releasing moves it
//! back. Tokens whose holder crashed are reclaimed by the stale sweep.

use crate::keys::SemaphoreKeys;
use crate::scripts::{self, Sweep};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uj_core::{Clock, Config, RandomTokenGen, SystemClock, TokenGen, Wait, WorkerOptions};
use uj_store::{Store, StoreError};

/// Semaphore configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SemaphoreConfig {
    /// Pool size; 1 makes a plain mutex
    pub resources: u32,
    /// TTL reapplied to every key after each mutation
    pub expiration: Option<Duration>,
    /// Checked-out tokens older than this are reclaimed on acquire
    pub stale_client_timeout: Option<Duration>,
    /// Timestamp with the process clock instead of the store's
    pub use_local_time: bool,
    pub sweep_lease: Duration,
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self {
            resources: 1,
            expiration: None,
            stale_client_timeout: None,
            use_local_time: false,
            sweep_lease: Duration::from_secs(10),
        }
    }
}

impl SemaphoreConfig {
    pub fn new(resources: u32) -> Self {
        Self {
            resources,
            ..Self::default()
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_stale_client_timeout(mut self, timeout: Duration) -> Self {
        self.stale_client_timeout = Some(timeout);
        self
    }

    pub fn with_local_time(mut self) -> Self {
        self.use_local_time = true;
        self
    }

    pub fn with_sweep_lease(mut self, lease: Duration) -> Self {
        self.sweep_lease = lease;
        self
    }

    /// Settings for a worker class's semaphore, leased for `expiration_secs`
    pub fn for_worker(options: &WorkerOptions, config: &Config, expiration_secs: u64) -> Self {
        Self {
            resources: options.lock_resources.unwrap_or(1).max(1),
            expiration: Some(Duration::from_secs(expiration_secs)),
            stale_client_timeout: options.stale_client_timeout,
            use_local_time: options.use_local_time,
            sweep_lease: config.stale_sweep_lease,
        }
    }
}

/// Handle on one semaphore, identified by its digest
///
/// Clones share the set of tokens this process holds.
#[derive(Clone)]
pub struct Semaphore<S, C = SystemClock, G = RandomTokenGen> {
    store: S,
    digest: String,
    keys: SemaphoreKeys,
    owner: String,
    pub(crate) config: SemaphoreConfig,
    clock: C,
    token_gen: G,
    held: Arc<Mutex<Vec<String>>>,
}

impl<S: Store> Semaphore<S> {
    pub fn new(store: S, digest: impl Into<String>, config: SemaphoreConfig) -> Self {
        let digest = digest.into();
        Self {
            store,
            keys: SemaphoreKeys::new(&digest),
            digest,
            owner: RandomTokenGen.next(),
            config,
            clock: SystemClock,
            token_gen: RandomTokenGen,
            held: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<S: Store, C: Clock, G: TokenGen> Semaphore<S, C, G> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Semaphore<S, C2, G> {
        Semaphore {
            store: self.store,
            digest: self.digest,
            keys: self.keys,
            owner: self.owner,
            config: self.config,
            clock,
            token_gen: self.token_gen,
            held: self.held,
        }
    }

    pub fn with_token_gen<G2: TokenGen>(self, token_gen: G2) -> Semaphore<S, C, G2> {
        Semaphore {
            store: self.store,
            digest: self.digest,
            keys: self.keys,
            owner: self.owner,
            config: self.config,
            clock: self.clock,
            token_gen,
            held: self.held,
        }
    }

    /// Value written to `EXISTS` if this handle creates the semaphore
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn keys(&self) -> &SemaphoreKeys {
        &self.keys
    }

    pub fn config(&self) -> &SemaphoreConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    /// Tokens this process believes it holds
    pub fn held_tokens(&self) -> Vec<String> {
        self.held().clone()
    }

    fn held(&self) -> MutexGuard<'_, Vec<String>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn forget_held(&self) {
        self.held().clear();
    }

    async fn now(&self) -> Result<f64, StoreError> {
        if self.config.use_local_time {
            Ok(self.clock.epoch_secs())
        } else {
            self.store.time().await
        }
    }

    /// Create the pool unless it exists; `true` if this call created it
    pub async fn ensure_initialized(&self) -> Result<bool, StoreError> {
        let created = scripts::create_if_absent(
            &self.store,
            &self.keys,
            &self.owner,
            self.config.resources,
            self.config.expiration,
        )
        .await?;
        if created {
            tracing::debug!(
                digest = %self.digest,
                resources = self.config.resources,
                "created semaphore"
            );
        }
        Ok(created)
    }

    /// Check out a token
    ///
    /// Returns `None` when no token became available within `wait`.
    ///
    /// # Cancellation
    ///
    /// Dropping the future while it waits on `AVAILABLE` loses nothing. Once
    /// a token is popped it sits in neither `AVAILABLE` nor `GRABBED` until
    /// the grab commits, and dropping the future inside that window (an
    /// outer `tokio::time::timeout`, a losing `select!` arm) strands it where
    /// no sweep can find it. Only key expiry gives it back, so with
    /// `expiration: None` the pool shrinks for good. Bound the wait with
    /// `Wait::Timeout` instead of cancelling from outside.
    pub async fn acquire(&self, wait: Wait) -> Result<Option<String>, StoreError> {
        self.ensure_initialized().await?;
        if self.config.stale_client_timeout.is_some() {
            self.release_stale_locks().await?;
        }

        let popped = match wait {
            Wait::NonBlocking => self.store.lpop(&self.keys.available).await?,
            Wait::Forever => self.store.blpop(&self.keys.available, None).await?,
            Wait::Timeout(timeout) => {
                self.store
                    .blpop(&self.keys.available, Some(timeout))
                    .await?
            }
        };
        let Some(token) = popped else {
            tracing::debug!(digest = %self.digest, %wait, "no token available");
            return Ok(None);
        };

        if let Err(e) = self.check_out(&token).await {
            // Popped but unrecorded: put it back rather than leak capacity
            if let Err(signal_err) = self.signal(Some(&token)).await {
                tracing::warn!(digest = %self.digest, %token, error = %signal_err, "failed to return token");
            }
            return Err(e);
        }
        self.held().push(token.clone());
        tracing::debug!(digest = %self.digest, %token, "acquired");
        Ok(Some(token))
    }

    async fn check_out(&self, token: &str) -> Result<(), StoreError> {
        let now = self.now().await?;
        scripts::grab(&self.store, &self.keys, token, now, self.config.expiration).await
    }

    /// Run `block` holding a token, returning it to the pool afterwards
    ///
    /// The token is signaled back however the block exits, including by
    /// panic, which is resumed once the token is back. `None` if no token
    /// became available.
    pub async fn with_token<T, F, Fut>(&self, wait: Wait, block: F) -> Result<Option<T>, StoreError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(token) = self.acquire(wait).await? else {
            return Ok(None);
        };

        let for_block = token.clone();
        let outcome = AssertUnwindSafe(async move { block(for_block).await })
            .catch_unwind()
            .await;
        let released = self.release_token(&token).await;

        match outcome {
            Ok(value) => {
                released?;
                Ok(Some(value))
            }
            Err(panic) => {
                if let Err(e) = released {
                    tracing::error!(digest = %self.digest, %token, error = %e, "failed to release token after panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    /// Signal back the most recently acquired token; `false` if none held
    pub async fn release(&self) -> Result<bool, StoreError> {
        let popped = self.held().pop();
        let Some(token) = popped else {
            return Ok(false);
        };
        self.signal(Some(&token)).await?;
        Ok(true)
    }

    pub async fn release_token(&self, token: &str) -> Result<(), StoreError> {
        self.held().retain(|t| t != token);
        self.signal(Some(token)).await.map(|_| ())
    }

    /// Return `token` to the pool, or add a fresh token when `None`
    pub async fn signal(&self, token: Option<&str>) -> Result<String, StoreError> {
        let token = scripts::signal(
            &self.store,
            &self.keys,
            token,
            &self.token_gen,
            self.config.expiration,
        )
        .await?;
        tracing::debug!(digest = %self.digest, %token, "signaled");
        Ok(token)
    }

    /// With a token: whether it is checked out. Without: whether any token
    /// this process acquired is still checked out.
    pub async fn is_held(&self, token: Option<&str>) -> Result<bool, StoreError> {
        if let Some(token) = token {
            return self.store.hexists(&self.keys.grabbed, token).await;
        }
        let held = self.held_tokens();
        for token in &held {
            if self.store.hexists(&self.keys.grabbed, token).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn exists(&self) -> Result<bool, StoreError> {
        self.store.exists(&self.keys.exists).await
    }

    /// Free tokens, or the configured pool size if never created
    pub async fn available_count(&self) -> Result<u64, StoreError> {
        if self.exists().await? {
            self.store.llen(&self.keys.available).await
        } else {
            Ok(u64::from(self.config.resources))
        }
    }

    /// Available tokens in pop order, then checked-out tokens
    pub async fn all_tokens(&self) -> Result<Vec<String>, StoreError> {
        let mut tokens = self.store.lrange(&self.keys.available).await?;
        let mut grabbed: Vec<String> = self
            .store
            .hgetall(&self.keys.grabbed)
            .await?
            .into_keys()
            .collect();
        grabbed.sort();
        tokens.extend(grabbed);
        Ok(tokens)
    }

    /// Checked-out tokens with their checkout timestamps
    pub async fn grabbed_tokens(&self) -> Result<HashMap<String, f64>, StoreError> {
        Ok(self
            .store
            .hgetall(&self.keys.grabbed)
            .await?
            .into_iter()
            .filter_map(|(token, at)| at.parse().ok().map(|at| (token, at)))
            .collect())
    }

    /// Reclaim tokens checked out longer than the stale timeout
    ///
    /// A no-op without a stale timeout, or while another process sweeps.
    pub async fn release_stale_locks(&self) -> Result<Vec<String>, StoreError> {
        let Some(stale_after) = self.config.stale_client_timeout else {
            return Ok(Vec::new());
        };
        let sweep = Sweep {
            stale_after,
            lease: self.config.sweep_lease,
            expiration: self.config.expiration,
        };
        let now = self.now().await?;

        match scripts::release_stale_locks(&self.store, &self.keys, sweep, now).await? {
            Some(reclaimed) => {
                if !reclaimed.is_empty() {
                    tracing::info!(digest = %self.digest, tokens = ?reclaimed, "reclaimed stale tokens");
                }
                Ok(reclaimed)
            }
            None => {
                tracing::debug!(digest = %self.digest, "sweep already in progress");
                Ok(Vec::new())
            }
        }
    }

    /// Delete all lock state; returns how many keys existed
    pub async fn destroy(&self) -> Result<u64, StoreError> {
        self.forget_held();
        let deleted = self.store.del(&self.keys.lock_keys()).await?;
        tracing::debug!(digest = %self.digest, deleted, "destroyed semaphore");
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "semaphore_tests.rs"]
mod tests;
