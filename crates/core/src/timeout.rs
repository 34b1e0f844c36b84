// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease durations from the item > class > global precedence chain
//!
//! A layer set to zero counts as unset, so a lease always resolves to a
//! bounded number of seconds.

use crate::clock::Clock;
use crate::config::Config;
use crate::item::{WorkItem, WorkerOptions};

/// Bounded wait derived from a timeout in seconds
///
/// Mirrors the store's blocking-pop contract: no timeout blocks forever,
/// zero or negative does not block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Forever,
    NonBlocking,
    Timeout(std::time::Duration),
}

impl Wait {
    pub fn from_seconds(seconds: Option<i64>) -> Self {
        match seconds {
            None => Wait::Forever,
            Some(s) if s <= 0 => Wait::NonBlocking,
            Some(s) => Wait::Timeout(std::time::Duration::from_secs(s.unsigned_abs())),
        }
    }
}

impl std::fmt::Display for Wait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Wait::Forever => write!(f, "forever"),
            Wait::NonBlocking => write!(f, "0s"),
            Wait::Timeout(d) => write!(f, "{}s", d.as_secs_f64()),
        }
    }
}

fn first_set(layers: &[Option<u64>]) -> Option<u64> {
    layers.iter().flatten().copied().find(|&s| s > 0)
}

/// Whole seconds until the item is due; zero if due or unscheduled
pub fn time_until_scheduled(item: &WorkItem, clock: &impl Clock) -> u64 {
    item.at
        .map(|at| (at - clock.now()).num_seconds())
        .filter(|&s| s > 0)
        .map_or(0, |s| s.unsigned_abs())
}

/// Lease for an enqueue-scope lock
///
/// Extended by the scheduling delay so the lock cannot lapse while the
/// item is still waiting to be picked up.
pub fn queue_lock_seconds(
    item: &WorkItem,
    options: &WorkerOptions,
    config: &Config,
    clock: &impl Clock,
) -> u64 {
    let base = first_set(&[
        item.lock_expiration,
        options.lock_expiration,
        options.queue_lock_expiration,
    ])
    .unwrap_or(config.default_queue_lock_expiration);
    base.saturating_add(time_until_scheduled(item, clock))
}

/// Lease for an execute-scope lock; bounds execution time only
pub fn run_lock_seconds(item: &WorkItem, options: &WorkerOptions, config: &Config) -> u64 {
    first_set(&[item.lock_expiration, options.run_lock_expiration])
        .unwrap_or(config.default_run_lock_expiration)
}

/// How long an execute-scope acquisition may wait for a token
pub fn acquire_wait(item: &WorkItem, options: &WorkerOptions, config: &Config) -> Wait {
    let seconds = item
        .lock_timeout
        .or(options.lock_timeout)
        .unwrap_or_else(|| i64::try_from(run_lock_seconds(item, options, config)).unwrap_or(i64::MAX));
    Wait::from_seconds(Some(seconds))
}

#[cfg(test)]
#[path = "timeout_tests.rs"]
mod tests;
