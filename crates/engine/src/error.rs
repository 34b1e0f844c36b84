// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the locking engine

use crate::strategy::Scope;
use thiserror::Error;
use uj_core::{StrategyKind, Wait};
use uj_store::StoreError;

/// Why a unit of work did not complete
#[derive(Debug, Error)]
pub enum WorkError {
    /// The host stopped mid-run; the work may be re-run elsewhere
    #[error("worker shut down before the work completed")]
    Shutdown,
    #[error("work failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl WorkError {
    pub fn failed(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        WorkError::Failed(error.into())
    }
}

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    /// No token became available in time; the work did not run
    #[error("timed out after {wait} waiting for a token on {digest}")]
    LockTimeout { digest: String, wait: Wait },
    #[error("{scope} scope can't {operation} {digest} ({strategy})")]
    IllegalScope {
        strategy: StrategyKind,
        operation: &'static str,
        scope: Scope,
        digest: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Work(#[from] WorkError),
}

/// An enqueue lock left behind because the work never finished
///
/// Only ever logged: the job is gone, so an operator has to clear it.
#[derive(Debug, Error)]
#[error("the unique_key: {digest} needs to be unlocked manually")]
pub struct UnreleasedLease {
    pub digest: String,
}

impl UnreleasedLease {
    pub fn report(&self) {
        tracing::error!(fatal = true, digest = %self.digest, "{self}");
    }
}
