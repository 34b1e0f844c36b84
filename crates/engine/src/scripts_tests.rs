// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use uj_core::{FakeClock, SequentialTokenGen};
use uj_store::{FakeStore, Ttl};

const DIGEST: &str = "uniquejobs:scripts";

fn keys() -> SemaphoreKeys {
    SemaphoreKeys::new(DIGEST)
}

fn sweep(stale_after_ms: u64) -> Sweep {
    Sweep {
        stale_after: Duration::from_millis(stale_after_ms),
        lease: Duration::from_secs(10),
        expiration: None,
    }
}

#[tokio::test]
async fn create_pushes_numbered_tokens_once() {
    let store = FakeStore::new();
    let keys = keys();

    assert!(create_if_absent(&store, &keys, "jid-1", 3, None).await.unwrap());
    assert!(!create_if_absent(&store, &keys, "jid-2", 3, None).await.unwrap());

    assert_eq!(store.lrange(&keys.available).await.unwrap(), vec!["0", "1", "2"]);
    assert_eq!(store.get(&keys.exists).await.unwrap().as_deref(), Some("jid-1"));
    assert_eq!(
        store.get(&keys.version).await.unwrap().as_deref(),
        Some(API_VERSION)
    );
    assert_eq!(store.ttl(&keys.exists).await.unwrap(), Ttl::Persistent);
}

#[tokio::test]
async fn create_backfills_missing_version() {
    let store = FakeStore::new();
    let keys = keys();
    store.put(&keys.exists, "legacy");

    assert!(!create_if_absent(&store, &keys, "jid", 1, None).await.unwrap());
    assert_eq!(
        store.get(&keys.version).await.unwrap().as_deref(),
        Some(API_VERSION)
    );
    // An existing lock is never re-seeded
    assert_eq!(store.llen(&keys.available).await.unwrap(), 0);
}

#[tokio::test]
async fn create_discards_leftover_pool_state() {
    let store = FakeStore::new();
    let keys = keys();
    store.hset(&keys.grabbed, "7", "1.0").await.unwrap();

    assert!(create_if_absent(&store, &keys, "jid", 1, None).await.unwrap());
    assert!(!store.exists(&keys.grabbed).await.unwrap());
    assert_eq!(store.lrange(&keys.available).await.unwrap(), vec!["0"]);
}

#[tokio::test]
async fn create_applies_expiration_to_every_key() {
    let store = FakeStore::with_clock(FakeClock::new());
    let keys = keys();
    create_if_absent(&store, &keys, "jid", 1, Some(Duration::from_secs(30)))
        .await
        .unwrap();

    for key in [&keys.exists, &keys.available, &keys.version] {
        assert_eq!(
            store.ttl(key).await.unwrap(),
            Ttl::Expires(Duration::from_secs(30)),
            "{key}"
        );
    }
}

#[tokio::test]
async fn signal_returns_token_to_available() {
    let store = FakeStore::new();
    let keys = keys();
    store.hset(&keys.grabbed, "0", "1.0").await.unwrap();

    let token = signal(&store, &keys, Some("0"), &SequentialTokenGen::default(), None)
        .await
        .unwrap();

    assert_eq!(token, "0");
    assert!(!store.hexists(&keys.grabbed, "0").await.unwrap());
    assert_eq!(store.lrange(&keys.available).await.unwrap(), vec!["0"]);
}

#[tokio::test]
async fn signal_does_not_duplicate_available_token() {
    let store = FakeStore::new();
    let keys = keys();
    create_if_absent(&store, &keys, "jid", 2, None).await.unwrap();

    signal(&store, &keys, Some("1"), &SequentialTokenGen::default(), None)
        .await
        .unwrap();

    assert_eq!(store.lrange(&keys.available).await.unwrap(), vec!["0", "1"]);
}

#[tokio::test]
async fn tokenless_signal_skips_tokens_already_in_pool() {
    let store = FakeStore::new();
    let keys = keys();
    create_if_absent(&store, &keys, "jid", 2, None).await.unwrap();
    store.lpop(&keys.available).await.unwrap();
    store.hset(&keys.grabbed, "0", "1.0").await.unwrap();

    // "0" is grabbed and "1" is available, so the generator must move on
    let token_gen = SequentialTokenGen::numeric(0);
    let token = signal(&store, &keys, None, &token_gen, None).await.unwrap();

    assert_eq!(token, "2");
    assert_eq!(store.lrange(&keys.available).await.unwrap(), vec!["1", "2"]);
    assert!(store.hexists(&keys.grabbed, "0").await.unwrap());
}

#[tokio::test]
async fn sweep_reclaims_only_stale_tokens() {
    let clock = FakeClock::at_epoch(1_000);
    let store = FakeStore::with_clock(clock);
    let keys = keys();
    store.hset(&keys.grabbed, "0", "990").await.unwrap();
    store.hset(&keys.grabbed, "1", "999.5").await.unwrap();

    let reclaimed = release_stale_locks(&store, &keys, sweep(1_000), 1_000.0)
        .await
        .unwrap();

    assert_eq!(reclaimed, Some(vec!["0".to_string()]));
    assert_eq!(store.lrange(&keys.available).await.unwrap(), vec!["0"]);
    assert!(store.hexists(&keys.grabbed, "1").await.unwrap());
    assert!(!store.exists(&keys.release).await.unwrap());
}

#[tokio::test]
async fn sweep_backs_off_while_mutex_is_held() {
    let clock = FakeClock::at_epoch(1_000);
    let store = FakeStore::with_clock(clock);
    let keys = keys();
    store.hset(&keys.grabbed, "0", "1").await.unwrap();
    store.put(&keys.release, "1005");

    let reclaimed = release_stale_locks(&store, &keys, sweep(1_000), 1_000.0)
        .await
        .unwrap();

    assert_eq!(reclaimed, None);
    assert!(store.hexists(&keys.grabbed, "0").await.unwrap());
    // Someone else's mutex is left alone
    assert_eq!(store.get(&keys.release).await.unwrap().as_deref(), Some("1005"));
}

#[tokio::test]
async fn sweep_takes_over_expired_mutex() {
    let clock = FakeClock::at_epoch(1_000);
    let store = FakeStore::with_clock(clock);
    let keys = keys();
    store.hset(&keys.grabbed, "0", "1").await.unwrap();
    store.put(&keys.release, "999");

    let reclaimed = release_stale_locks(&store, &keys, sweep(1_000), 1_000.0)
        .await
        .unwrap();

    assert_eq!(reclaimed, Some(vec!["0".to_string()]));
    assert!(!store.exists(&keys.release).await.unwrap());
}

#[tokio::test]
async fn delayed_sweeper_leaves_newer_mutex_in_place() {
    let store = FakeStore::with_clock(FakeClock::at_epoch(1_000));
    let keys = keys();
    let lease = Duration::from_secs(10);
    let stale = acquire_sweep_mutex(&store, &keys, lease, 1_000.0)
        .await
        .unwrap()
        .unwrap();

    // The first holder overran its lease and another sweeper took over
    let newer = acquire_sweep_mutex(&store, &keys, lease, 1_012.0)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stale, newer);

    assert!(!release_sweep_mutex(&store, &keys, &stale).await.unwrap());
    assert_eq!(store.get(&keys.release).await.unwrap(), Some(newer.clone()));

    assert!(release_sweep_mutex(&store, &keys, &newer).await.unwrap());
    assert!(!store.exists(&keys.release).await.unwrap());
}

#[tokio::test]
async fn delete_if_owner_compares_exists_value() {
    let store = FakeStore::new();
    let keys = keys();
    create_if_absent(&store, &keys, "owner", 1, None).await.unwrap();

    assert!(!delete_if_owner(&store, &keys, "intruder").await.unwrap());
    assert!(store.exists(&keys.exists).await.unwrap());

    assert!(delete_if_owner(&store, &keys, "owner").await.unwrap());
    assert!(store.dump_keys().is_empty());
}
