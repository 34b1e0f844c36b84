// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token generation for semaphore capacity added after creation

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Generates candidate tokens; callers retry on collision
pub trait TokenGen: Clone + Send + Sync + 'static {
    fn next(&self) -> String;
}

/// Random 128-bit hex tokens for production use
#[derive(Clone, Debug, Default)]
pub struct RandomTokenGen;

impl TokenGen for RandomTokenGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Sequential token generator for testing
#[derive(Clone, Debug)]
pub struct SequentialTokenGen {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialTokenGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Generator yielding bare numbers, starting at `start`
    ///
    /// Useful for forcing collisions with the `"0".."N-1"` tokens a fresh pool holds.
    pub fn numeric(start: u64) -> Self {
        Self {
            prefix: String::new(),
            counter: Arc::new(AtomicU64::new(start)),
        }
    }
}

impl Default for SequentialTokenGen {
    fn default() -> Self {
        Self::new("token")
    }
}

impl TokenGen for SequentialTokenGen {
    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        if self.prefix.is_empty() {
            n.to_string()
        } else {
            format!("{}-{}", self.prefix, n)
        }
    }
}
