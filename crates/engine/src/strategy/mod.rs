// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock strategies
//!
//! A strategy decides when a work item's lock is taken and dropped across
//! two lifecycle phases: `Enqueue`, when the host submits the item, and
//! `Execute`, when a worker runs it.
//!
//! | Strategy | Enqueue | Execute |
//! |---|---|---|
//! | until-executed | single-holder lock | run, then unlock |
//! | until-executing | single-holder lock | unlock, then run |
//! | until-and-while-executing | single-holder lock | unlock, then run holding a token |
//! | while-executing | - | run holding a token |
//! | reschedule-while-executing | - | run holding the lock, else re-submit |
//!
//! Run-lease tokens come from a separate semaphore under
//! [`run_digest`](crate::keys::run_digest), so a duplicate can be enqueued
//! while the first copy runs but cannot run alongside it.

use crate::error::{LockError, UnreleasedLease, WorkError};
use crate::keys::run_digest;
use crate::semaphore::{Semaphore, SemaphoreConfig};
use crate::single_holder::SingleHolderLock;
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uj_core::{
    acquire_wait, ensure_digest, queue_lock_seconds, run_lock_seconds, Clock, Config,
    RandomTokenGen, StrategyKind, SystemClock, TokenGen, WorkItem, WorkerOptions,
};
use uj_store::Store;

/// Lifecycle phase a lock operation runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Enqueue,
    Execute,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Enqueue => write!(f, "enqueue"),
            Scope::Execute => write!(f, "execute"),
        }
    }
}

/// How `execute` finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteOutcome<T> {
    Completed(T),
    /// The lock was held elsewhere; the item was handed back to the host
    Rescheduled,
}

impl<T> ExecuteOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            ExecuteOutcome::Completed(value) => Some(value),
            ExecuteOutcome::Rescheduled => None,
        }
    }
}

/// Host hook for putting a work item back on its queue
#[async_trait]
pub trait Resubmit: Send + Sync {
    async fn push(&self, item: &WorkItem) -> Result<(), WorkError>;
}

/// Shared dependencies of every lock built for a host
#[derive(Clone)]
pub struct LockContext<S, C = SystemClock, G = RandomTokenGen> {
    pub store: S,
    pub config: Arc<Config>,
    pub clock: C,
    pub token_gen: G,
    pub resubmit: Arc<dyn Resubmit>,
}

impl<S: Store> LockContext<S> {
    pub fn new(store: S, config: Config, resubmit: Arc<dyn Resubmit>) -> Self {
        Self {
            store,
            config: Arc::new(config),
            clock: SystemClock,
            token_gen: RandomTokenGen,
            resubmit,
        }
    }
}

impl<S: Store, C: Clock, G: TokenGen> LockContext<S, C, G> {
    pub fn with_clock<C2: Clock>(self, clock: C2) -> LockContext<S, C2, G> {
        LockContext {
            store: self.store,
            config: self.config,
            clock,
            token_gen: self.token_gen,
            resubmit: self.resubmit,
        }
    }

    pub fn with_token_gen<G2: TokenGen>(self, token_gen: G2) -> LockContext<S, C, G2> {
        LockContext {
            store: self.store,
            config: self.config,
            clock: self.clock,
            token_gen,
            resubmit: self.resubmit,
        }
    }
}

/// The lock guarding one work item, under the strategy it selects
pub struct UniqueLock<S, C = SystemClock, G = RandomTokenGen> {
    kind: StrategyKind,
    item: WorkItem,
    options: WorkerOptions,
    digest: String,
    run_digest: String,
    ctx: LockContext<S, C, G>,
}

impl<S: Store, C: Clock, G: TokenGen> UniqueLock<S, C, G> {
    /// Resolve the item's strategy (item, then class, then global default)
    /// and attach its digest
    pub fn new(mut item: WorkItem, ctx: LockContext<S, C, G>) -> Self {
        let options = ctx.config.worker(&item.class);
        let kind = item
            .unique
            .or(options.unique)
            .unwrap_or(ctx.config.default_lock);
        let digest = ensure_digest(&mut item, &options, &ctx.config.unique_prefix);
        Self {
            kind,
            item,
            options,
            run_digest: run_digest(&digest),
            digest,
            ctx,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn item(&self) -> &WorkItem {
        &self.item
    }

    /// Digest of the semaphore held while the work runs
    pub fn run_digest(&self) -> &str {
        &self.run_digest
    }

    fn semaphore(&self, digest: &str, lease_secs: u64) -> Semaphore<S, C, G> {
        let config = SemaphoreConfig::for_worker(&self.options, &self.ctx.config, lease_secs);
        Semaphore::new(self.ctx.store.clone(), digest, config)
            .with_clock(self.ctx.clock.clone())
            .with_token_gen(self.ctx.token_gen.clone())
            .with_owner(&self.item.jid)
    }

    fn queue_lease(&self) -> u64 {
        queue_lock_seconds(&self.item, &self.options, &self.ctx.config, &self.ctx.clock)
    }

    fn run_lease(&self) -> u64 {
        run_lock_seconds(&self.item, &self.options, &self.ctx.config)
    }

    fn single_holder(&self, lease_secs: u64) -> SingleHolderLock<S, C, G> {
        SingleHolderLock::new(self.semaphore(&self.digest, lease_secs), &self.item.jid)
    }

    fn unreleased(&self) -> UnreleasedLease {
        UnreleasedLease {
            digest: self.digest.clone(),
        }
    }

    fn illegal(&self, operation: &'static str, scope: Scope) -> LockError {
        LockError::IllegalScope {
            strategy: self.kind,
            operation,
            scope,
            digest: self.digest.clone(),
        }
    }

    /// Lock at enqueue time; `false` means a duplicate to be dropped
    pub async fn lock(&self, scope: Scope) -> Result<bool, LockError> {
        if scope != Scope::Enqueue {
            return Err(self.illegal("lock", scope));
        }
        if !self.kind.locks_on_enqueue() {
            return Ok(true);
        }

        let locked = self.single_holder(self.queue_lease()).try_lock().await?;
        if !locked {
            tracing::debug!(
                digest = %self.digest,
                jid = %self.item.jid,
                strategy = %self.kind,
                "duplicate rejected"
            );
        }
        Ok(locked)
    }

    /// Unlock at execution time, if this item still owns the lock
    pub async fn unlock(&self, scope: Scope) -> Result<bool, LockError> {
        if scope != Scope::Execute {
            return Err(self.illegal("unlock", scope));
        }
        Ok(self.single_holder(self.run_lease()).unlock().await?)
    }

    /// Run `work` under the strategy; `callback` runs once the item's lock
    /// has been dropped on its behalf
    pub async fn execute<T, CB, Fut>(
        &self,
        callback: CB,
        work: Fut,
    ) -> Result<ExecuteOutcome<T>, LockError>
    where
        CB: FnOnce() + Send,
        Fut: Future<Output = Result<T, WorkError>> + Send,
    {
        match self.kind {
            StrategyKind::UntilExecuted => self.until_executed(callback, work).await,
            StrategyKind::UntilExecuting => {
                if self.unlock(Scope::Execute).await? {
                    callback();
                }
                Ok(ExecuteOutcome::Completed(work.await?))
            }
            StrategyKind::UntilAndWhileExecuting => {
                self.unlock(Scope::Execute).await?;
                let value = self.while_executing(work).await?;
                callback();
                Ok(ExecuteOutcome::Completed(value))
            }
            StrategyKind::WhileExecuting => {
                let value = self.while_executing(work).await?;
                callback();
                Ok(ExecuteOutcome::Completed(value))
            }
            StrategyKind::RescheduleWhileExecuting => {
                self.reschedule_while_executing(callback, work).await
            }
        }
    }

    async fn until_executed<T, CB, Fut>(
        &self,
        callback: CB,
        work: Fut,
    ) -> Result<ExecuteOutcome<T>, LockError>
    where
        CB: FnOnce() + Send,
        Fut: Future<Output = Result<T, WorkError>> + Send,
    {
        let result = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                match self.unlock(Scope::Execute).await {
                    Ok(true) => {}
                    Ok(false) => self.unreleased().report(),
                    Err(e) => {
                        tracing::error!(digest = %self.digest, jid = %self.item.jid, error = %e, "failed to unlock after panic");
                        self.unreleased().report();
                    }
                }
                std::panic::resume_unwind(panic)
            }
        };
        if matches!(result, Err(WorkError::Shutdown)) {
            // The item may be re-run elsewhere, so its lock stays
            self.unreleased().report();
            return Err(WorkError::Shutdown.into());
        }

        let unlocked = self.unlock(Scope::Execute).await?;
        if !unlocked {
            self.unreleased().report();
        }
        let value = result?;
        if unlocked {
            callback();
        }
        Ok(ExecuteOutcome::Completed(value))
    }

    /// Run holding a run-lease token, failing closed if none frees up in time
    async fn while_executing<T, Fut>(&self, work: Fut) -> Result<T, LockError>
    where
        Fut: Future<Output = Result<T, WorkError>> + Send,
    {
        let wait = acquire_wait(&self.item, &self.options, &self.ctx.config);
        let semaphore = self.semaphore(&self.run_digest, self.run_lease());

        match semaphore.with_token(wait, |_token| work).await? {
            Some(result) => Ok(result?),
            None => {
                tracing::warn!(digest = %self.digest, jid = %self.item.jid, %wait, "timed out waiting for run lock");
                Err(LockError::LockTimeout {
                    digest: self.digest.clone(),
                    wait,
                })
            }
        }
    }

    async fn reschedule_while_executing<T, CB, Fut>(
        &self,
        callback: CB,
        work: Fut,
    ) -> Result<ExecuteOutcome<T>, LockError>
    where
        CB: FnOnce() + Send,
        Fut: Future<Output = Result<T, WorkError>> + Send,
    {
        let lock = self.single_holder(self.run_lease());
        if !lock.try_lock().await? {
            tracing::info!(digest = %self.digest, jid = %self.item.jid, "run lock held elsewhere, rescheduling");
            self.ctx.resubmit.push(&self.item).await?;
            return Ok(ExecuteOutcome::Rescheduled);
        }

        let result = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                if let Err(e) = lock.unlock().await {
                    tracing::error!(digest = %self.digest, jid = %self.item.jid, error = %e, "failed to unlock after panic");
                }
                std::panic::resume_unwind(panic)
            }
        };
        lock.unlock().await?;
        let value = result?;
        callback();
        Ok(ExecuteOutcome::Completed(value))
    }
}

/// Records re-submitted items instead of queueing them
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Default)]
pub struct RecordingResubmit {
    pushed: Arc<std::sync::Mutex<Vec<WorkItem>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingResubmit {
    pub fn pushed(&self) -> Vec<WorkItem> {
        self.pushed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Resubmit for RecordingResubmit {
    async fn push(&self, item: &WorkItem) -> Result<(), WorkError> {
        self.pushed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(item.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
