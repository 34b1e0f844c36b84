// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! uj-core: shared vocabulary for the uj locking engine
//!
//! This crate provides:
//! - Work items, worker options and the strategy selector
//! - Digest computation identifying the resource a work item contends for
//! - Lease calculation from the item > class > global precedence chain
//! - Clock and token-generation abstractions for deterministic tests
//! - TOML configuration

pub mod clock;
pub mod config;
pub mod digest;
pub mod item;
pub mod timeout;
pub mod token;

// Re-exports
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{Config, ConfigError};
pub use digest::{ensure_digest, unique_digest};
pub use item::{StrategyKind, UnknownStrategy, WorkItem, WorkerOptions};
pub use timeout::{acquire_wait, queue_lock_seconds, run_lock_seconds, Wait};
pub use token::{RandomTokenGen, SequentialTokenGen, TokenGen};
