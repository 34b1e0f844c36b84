// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable identity for the logical resource a work item contends for

use crate::item::{WorkItem, WorkerOptions};
use serde_json::{json, Value};
use sha2::{Digest as _, Sha256};

/// Compute the digest for a work item
///
/// The hashed input is canonical JSON (object keys sorted) of the class,
/// queue and arguments; `unique_across_workers` drops the class and
/// `unique_across_queues` drops the queue.
pub fn unique_digest(item: &WorkItem, options: &WorkerOptions, prefix: &str) -> String {
    let class = if options.unique_across_workers {
        Value::Null
    } else {
        Value::String(item.class.clone())
    };
    let queue = if options.unique_across_queues {
        Value::Null
    } else {
        Value::String(item.queue.clone())
    };
    let payload = json!({
        "class": class,
        "queue": queue,
        "unique_args": item.args,
    });

    let hash = Sha256::digest(payload.to_string().as_bytes());
    format!("{prefix}:{hash:x}")
}

/// Return the item's digest, computing and attaching it if absent
pub fn ensure_digest(item: &mut WorkItem, options: &WorkerOptions, prefix: &str) -> String {
    if let Some(digest) = &item.unique_digest {
        return digest.clone();
    }
    let digest = unique_digest(item, options, prefix);
    item.unique_digest = Some(digest.clone());
    digest
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
