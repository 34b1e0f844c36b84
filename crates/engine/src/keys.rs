// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store keys derived from a digest

/// Digest of the run-lease semaphore paired with an item's enqueue lock
///
/// Kept apart from the enqueue lock so a multi-token run pool never lands
/// under keys a single-holder lock pops from.
pub fn run_digest(digest: &str) -> String {
    format!("{digest}:RUN")
}

/// The keys making up one semaphore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemaphoreKeys {
    /// Creation flag; holds the creating (or owning) job id
    pub exists: String,
    /// Checked-out token -> checkout timestamp
    pub grabbed: String,
    /// Free tokens, popped from the head
    pub available: String,
    pub version: String,
    /// Sweep mutex; not part of the lock's own state
    pub release: String,
}

impl SemaphoreKeys {
    pub fn new(digest: &str) -> Self {
        Self {
            exists: format!("{digest}:EXISTS"),
            grabbed: format!("{digest}:GRABBED"),
            available: format!("{digest}:AVAILABLE"),
            version: format!("{digest}:VERSION"),
            release: format!("{digest}:RELEASE"),
        }
    }

    /// Every key holding lock state, i.e. all but the sweep mutex
    pub fn lock_keys(&self) -> Vec<String> {
        vec![
            self.exists.clone(),
            self.grabbed.clone(),
            self.available.clone(),
            self.version.clone(),
        ]
    }
}
