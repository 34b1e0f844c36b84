// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! uj-engine: distributed locking over a shared store
//!
//! - [`Semaphore`]: counting semaphore with blocking acquisition and stale
//!   lease reclamation
//! - [`SingleHolderLock`]: mutex owned by a job id
//! - [`UniqueLock`]: the per-item lock strategies hosts call at enqueue and
//!   execute time

mod error;
pub mod keys;
pub mod scripts;
mod semaphore;
mod single_holder;
pub mod strategy;

pub use error::{LockError, UnreleasedLease, WorkError};
pub use keys::SemaphoreKeys;
pub use semaphore::{Semaphore, SemaphoreConfig};
pub use single_holder::SingleHolderLock;
pub use strategy::{ExecuteOutcome, LockContext, Resubmit, Scope, UniqueLock};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use strategy::RecordingResubmit;
