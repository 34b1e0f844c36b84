// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work items and the per-class options that govern their locking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which lock strategy protects a work item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Held from enqueue until the work has run
    UntilExecuted,
    /// Held from enqueue until the work starts
    UntilExecuting,
    /// Queue lock until the work starts, then a run lock while it runs
    UntilAndWhileExecuting,
    /// Run lock only, held while the work runs
    #[default]
    WhileExecuting,
    /// Run lock only; contended work is re-submitted
    RescheduleWhileExecuting,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::UntilExecuted,
        StrategyKind::UntilExecuting,
        StrategyKind::UntilAndWhileExecuting,
        StrategyKind::WhileExecuting,
        StrategyKind::RescheduleWhileExecuting,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::UntilExecuted => "until_executed",
            StrategyKind::UntilExecuting => "until_executing",
            StrategyKind::UntilAndWhileExecuting => "until_and_while_executing",
            StrategyKind::WhileExecuting => "while_executing",
            StrategyKind::RescheduleWhileExecuting => "reschedule_while_executing",
        }
    }

    /// Whether the strategy takes a lock at enqueue time
    pub fn locks_on_enqueue(&self) -> bool {
        matches!(
            self,
            StrategyKind::UntilExecuted
                | StrategyKind::UntilExecuting
                | StrategyKind::UntilAndWhileExecuting
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown strategy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lock strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Locking options declared for a worker class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerOptions {
    /// Strategy for this class; falls back to the global default
    pub unique: Option<StrategyKind>,
    /// Lease seconds for both phases
    pub lock_expiration: Option<u64>,
    /// Lease seconds for the enqueue-scope lock
    pub queue_lock_expiration: Option<u64>,
    /// Lease seconds for the execute-scope lock
    pub run_lock_expiration: Option<u64>,
    /// Seconds to wait for an execute-scope token (0 = don't wait)
    pub lock_timeout: Option<i64>,
    /// Semaphore pool size for execute-scope locks
    pub lock_resources: Option<u32>,
    /// Grabbed tokens older than this are reclaimed
    #[serde(with = "humantime_serde")]
    pub stale_client_timeout: Option<Duration>,
    /// Timestamp leases with the local clock instead of the store's
    pub use_local_time: bool,
    /// Leave the queue out of the digest
    pub unique_across_queues: bool,
    /// Leave the class out of the digest
    pub unique_across_workers: bool,
}

/// A unit of work as handed to the engine by the host queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub jid: String,
    pub class: String,
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<StrategyKind>,
    /// When the item is scheduled to run, if not immediately
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_expiration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timeout: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_digest: Option<String>,
}

fn default_queue() -> String {
    "default".to_string()
}

impl WorkItem {
    pub fn new(jid: impl Into<String>, class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            jid: jid.into(),
            class: class.into(),
            queue: default_queue(),
            args,
            unique: None,
            at: None,
            lock_expiration: None,
            lock_timeout: None,
            unique_digest: None,
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_unique(mut self, unique: StrategyKind) -> Self {
        self.unique = Some(unique);
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn with_lock_expiration(mut self, seconds: u64) -> Self {
        self.lock_expiration = Some(seconds);
        self
    }

    pub fn with_lock_timeout(mut self, seconds: i64) -> Self {
        self.lock_timeout = Some(seconds);
        self
    }
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
