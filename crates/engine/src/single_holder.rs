// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutex owned by one job id
//!
//! A one-token semaphore whose `EXISTS` key names the owning job. Any
//! process can unlock it on the owner's behalf, but only while `EXISTS`
//! still names that job.

use crate::scripts;
use crate::semaphore::Semaphore;
use uj_core::{Clock, TokenGen, Wait};
use uj_store::{Store, StoreError};

pub struct SingleHolderLock<S, C, G> {
    semaphore: Semaphore<S, C, G>,
    jid: String,
}

impl<S: Store, C: Clock, G: TokenGen> SingleHolderLock<S, C, G> {
    /// Wrap `semaphore` as a mutex owned by `jid`; its pool size is forced to one
    pub fn new(semaphore: Semaphore<S, C, G>, jid: impl Into<String>) -> Self {
        let jid = jid.into();
        let mut semaphore = semaphore.with_owner(jid.clone());
        semaphore.config.resources = 1;
        Self { semaphore, jid }
    }

    pub fn semaphore(&self) -> &Semaphore<S, C, G> {
        &self.semaphore
    }

    /// Take the lock without waiting; `false` if anyone holds it
    pub async fn try_lock(&self) -> Result<bool, StoreError> {
        if self.semaphore.acquire(Wait::NonBlocking).await?.is_none() {
            return Ok(false);
        }
        scripts::claim(
            self.semaphore.store(),
            self.semaphore.keys(),
            &self.jid,
            self.semaphore.config().expiration,
        )
        .await?;
        tracing::debug!(digest = self.semaphore.digest(), jid = %self.jid, "locked");
        Ok(true)
    }

    /// Delete the lock if this job owns it
    pub async fn unlock(&self) -> Result<bool, StoreError> {
        self.semaphore.forget_held();
        let deleted =
            scripts::delete_if_owner(self.semaphore.store(), self.semaphore.keys(), &self.jid)
                .await?;
        if deleted {
            tracing::debug!(digest = self.semaphore.digest(), jid = %self.jid, "unlocked");
        } else {
            tracing::debug!(digest = self.semaphore.digest(), jid = %self.jid, "not the owner, left in place");
        }
        Ok(deleted)
    }

    /// Job id recorded in `EXISTS`
    pub async fn owner(&self) -> Result<Option<String>, StoreError> {
        self.semaphore
            .store()
            .get(&self.semaphore.keys().exists)
            .await
    }

    pub async fn is_locked(&self) -> Result<bool, StoreError> {
        Ok(self.semaphore.available_count().await? == 0)
    }
}

#[cfg(test)]
#[path = "single_holder_tests.rs"]
mod tests;
