// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock inspection and manual cleanup

use clap::Subcommand;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uj_core::Config;
use uj_engine::{Semaphore, SemaphoreConfig};
use uj_store::{Store, StoreError};

#[derive(Subcommand)]
pub enum LockCommand {
    /// Show a lock's tokens and owner
    Show {
        /// Lock digest, e.g. uniquejobs:5501...
        digest: String,
    },
    /// List lock keys
    Keys {
        /// Glob pattern (default: every key under the unique prefix)
        pattern: Option<String>,
    },
    /// Delete a lock so its job can be enqueued again
    Unlock {
        /// Lock digest
        digest: String,
    },
    /// Return tokens checked out for too long to the pool
    Sweep {
        /// Lock digest
        digest: String,
        /// Seconds after which a checked-out token counts as abandoned
        #[arg(long, value_parser = parse_seconds)]
        stale_after: Duration,
    },
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs: f64 = s
        .parse()
        .map_err(|_| format!("invalid number of seconds: '{}'", s))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("invalid number of seconds: '{}'", s))
}

fn semaphore<S: Store>(store: &S, digest: &str, config: SemaphoreConfig) -> Semaphore<S> {
    Semaphore::new(store.clone(), digest, config)
}

#[derive(Debug, Serialize)]
pub struct GrabbedToken {
    pub token: String,
    pub checked_out_at: f64,
    pub age_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct LockReport {
    pub digest: String,
    pub exists: bool,
    pub owner: Option<String>,
    pub version: Option<String>,
    pub available: Vec<String>,
    pub grabbed: Vec<GrabbedToken>,
}

impl fmt::Display for LockReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Digest:    {}", self.digest)?;
        if !self.exists {
            return write!(f, "Status:    unlocked (no lock state)");
        }
        writeln!(f, "Owner:     {}", self.owner.as_deref().unwrap_or("-"))?;
        writeln!(f, "Version:   {}", self.version.as_deref().unwrap_or("-"))?;
        write!(f, "Available: {}", self.available.len())?;
        if !self.available.is_empty() {
            write!(f, " ({})", self.available.join(", "))?;
        }
        write!(f, "\nGrabbed:   {}", self.grabbed.len())?;
        for grabbed in &self.grabbed {
            write!(f, "\n  {:<8} held {:.1}s", grabbed.token, grabbed.age_secs)?;
        }
        Ok(())
    }
}

pub async fn show<S: Store>(store: &S, digest: &str) -> Result<LockReport, StoreError> {
    let sem = semaphore(store, digest, SemaphoreConfig::default());
    let keys = sem.keys();
    let now = store.time().await?;

    let mut grabbed: Vec<GrabbedToken> = sem
        .grabbed_tokens()
        .await?
        .into_iter()
        .map(|(token, at)| GrabbedToken {
            token,
            checked_out_at: at,
            age_secs: (now - at).max(0.0),
        })
        .collect();
    grabbed.sort_by(|a, b| a.token.cmp(&b.token));

    Ok(LockReport {
        digest: digest.to_string(),
        exists: sem.exists().await?,
        owner: store.get(&keys.exists).await?,
        version: store.get(&keys.version).await?,
        available: store.lrange(&keys.available).await?,
        grabbed,
    })
}

/// Keys matching `pattern`, or every key under the unique prefix
pub async fn keys<S: Store>(
    store: &S,
    config: &Config,
    pattern: Option<&str>,
) -> Result<Vec<String>, StoreError> {
    let default = format!("{}:*", config.unique_prefix);
    store.keys(pattern.unwrap_or(&default)).await
}

#[derive(Debug, Serialize)]
pub struct Unlocked {
    pub digest: String,
    pub deleted: u64,
}

impl fmt::Display for Unlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.deleted == 0 {
            write!(f, "No lock found for {}", self.digest)
        } else {
            write!(f, "Removed {} keys for {}", self.deleted, self.digest)
        }
    }
}

pub async fn unlock<S: Store>(store: &S, digest: &str) -> Result<Unlocked, StoreError> {
    let deleted = semaphore(store, digest, SemaphoreConfig::default())
        .destroy()
        .await?;
    tracing::info!(digest, deleted, "manually unlocked");
    Ok(Unlocked {
        digest: digest.to_string(),
        deleted,
    })
}

#[derive(Debug, Serialize)]
pub struct SweepReport {
    pub digest: String,
    pub reclaimed: Vec<String>,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reclaimed {} stale tokens for {}",
            self.reclaimed.len(),
            self.digest
        )?;
        if !self.reclaimed.is_empty() {
            write!(f, ": {}", self.reclaimed.join(", "))?;
        }
        Ok(())
    }
}

pub async fn sweep<S: Store>(
    store: &S,
    config: &Config,
    digest: &str,
    stale_after: Duration,
) -> Result<SweepReport, StoreError> {
    let sem_config = SemaphoreConfig::default()
        .with_stale_client_timeout(stale_after)
        .with_sweep_lease(config.stale_sweep_lease);
    let reclaimed = semaphore(store, digest, sem_config)
        .release_stale_locks()
        .await?;
    Ok(SweepReport {
        digest: digest.to_string(),
        reclaimed,
    })
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
