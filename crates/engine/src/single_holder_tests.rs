// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::semaphore::SemaphoreConfig;
use std::time::Duration;
use uj_core::{Clock, FakeClock, RandomTokenGen, SystemClock};
use uj_store::{FakeStore, Ttl};

const DIGEST: &str = "uniquejobs:single";

fn lock<C: Clock>(
    store: &FakeStore<C>,
    jid: &str,
) -> SingleHolderLock<FakeStore<C>, SystemClock, RandomTokenGen> {
    let semaphore = Semaphore::new(
        store.clone(),
        DIGEST,
        SemaphoreConfig::new(5).with_expiration(Duration::from_secs(1800)),
    );
    SingleHolderLock::new(semaphore, jid)
}

#[tokio::test]
async fn second_job_is_rejected_while_held() {
    let store = FakeStore::new();

    assert!(lock(&store, "jid-1").try_lock().await.unwrap());
    assert!(!lock(&store, "jid-2").try_lock().await.unwrap());
    assert_eq!(
        lock(&store, "jid-2").owner().await.unwrap().as_deref(),
        Some("jid-1")
    );
}

#[tokio::test]
async fn pool_size_is_forced_to_one() {
    let store = FakeStore::new();
    let first = lock(&store, "jid-1");
    first.try_lock().await.unwrap();

    assert_eq!(first.semaphore().config().resources, 1);
    assert!(first.is_locked().await.unwrap());
}

#[tokio::test]
async fn lock_is_not_reentrant() {
    let store = FakeStore::new();
    let held = lock(&store, "jid-1");

    assert!(held.try_lock().await.unwrap());
    assert!(!held.try_lock().await.unwrap());
}

#[tokio::test]
async fn unlock_from_another_handle_clears_owned_lock() {
    let store = FakeStore::new();
    lock(&store, "jid-1").try_lock().await.unwrap();

    // Executing process unlocks on behalf of the enqueuing one
    let server_side = lock(&store, "jid-1");
    assert!(server_side.unlock().await.unwrap());
    assert!(!server_side.is_locked().await.unwrap());
    assert!(store.dump_keys().is_empty());

    assert!(lock(&store, "jid-2").try_lock().await.unwrap());
}

#[tokio::test]
async fn non_owner_cannot_unlock() {
    let store = FakeStore::new();
    lock(&store, "jid-1").try_lock().await.unwrap();

    assert!(!lock(&store, "jid-2").unlock().await.unwrap());
    assert!(lock(&store, "jid-2").is_locked().await.unwrap());
}

#[tokio::test]
async fn claim_keeps_lease_on_exists() {
    let store = FakeStore::with_clock(FakeClock::new());
    let held = lock(&store, "jid-1");
    held.try_lock().await.unwrap();

    assert_eq!(
        store.ttl(&held.semaphore().keys().exists).await.unwrap(),
        Ttl::Expires(Duration::from_secs(1800))
    );
}
