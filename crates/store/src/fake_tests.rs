// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use uj_core::clock::FakeClock;

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn transaction_applies_all_commands() {
    let store = FakeStore::new();
    let created = store
        .transaction(&[Read::Value("k:EXISTS".into())], |snap| {
            assert_eq!(snap.value("k:EXISTS"), None);
            Plan::apply(
                vec![
                    Command::Set {
                        key: "k:EXISTS".into(),
                        value: "jid".into(),
                    },
                    Command::RPush {
                        key: "k:AVAILABLE".into(),
                        values: keys(&["0", "1"]),
                    },
                ],
                true,
            )
        })
        .await
        .unwrap();

    assert!(created);
    assert_eq!(store.get("k:EXISTS").await.unwrap().as_deref(), Some("jid"));
    assert_eq!(store.lrange("k:AVAILABLE").await.unwrap(), keys(&["0", "1"]));
}

#[tokio::test]
async fn failed_transaction_leaves_no_partial_writes() {
    let store = FakeStore::new();
    store.put("k:AVAILABLE", "not-a-list");

    let result = store
        .transaction(&[], |_| {
            Plan::apply(
                vec![
                    Command::Set {
                        key: "k:EXISTS".into(),
                        value: "1".into(),
                    },
                    Command::RPush {
                        key: "k:AVAILABLE".into(),
                        values: keys(&["0"]),
                    },
                ],
                (),
            )
        })
        .await;

    assert!(matches!(result, Err(StoreError::WrongType { key }) if key == "k:AVAILABLE"));
    assert!(!store.exists("k:EXISTS").await.unwrap());
}

#[tokio::test]
async fn empty_aggregates_disappear() {
    let store = FakeStore::new();
    store.hset("h", "f", "1").await.unwrap();
    store
        .transaction(&[], |_| {
            Plan::apply(
                vec![Command::HDel {
                    key: "h".into(),
                    fields: keys(&["f"]),
                }],
                (),
            )
        })
        .await
        .unwrap();
    assert!(!store.exists("h").await.unwrap());

    store
        .transaction(&[], |_| {
            Plan::apply(
                vec![Command::RPush {
                    key: "l".into(),
                    values: keys(&["a"]),
                }],
                (),
            )
        })
        .await
        .unwrap();
    assert_eq!(store.lpop("l").await.unwrap().as_deref(), Some("a"));
    assert!(!store.exists("l").await.unwrap());
}

#[tokio::test]
async fn keys_expire_with_the_clock() {
    let clock = FakeClock::new();
    let store = FakeStore::with_clock(clock.clone());
    store.put("k", "v");
    assert!(store.expire("k", Duration::from_secs(2)).await.unwrap());
    assert_eq!(
        store.ttl("k").await.unwrap(),
        Ttl::Expires(Duration::from_secs(2))
    );

    clock.advance(Duration::from_secs(3));
    assert_eq!(store.ttl("k").await.unwrap(), Ttl::Missing);
    assert!(store.dump_keys().is_empty());
}

#[tokio::test]
async fn persist_clears_expiry() {
    let store = FakeStore::new();
    store.put("k", "v");
    store.expire("k", Duration::from_secs(5)).await.unwrap();
    store
        .transaction(&[], |_| Plan::apply(vec![Command::Persist { key: "k".into() }], ()))
        .await
        .unwrap();
    assert_eq!(store.ttl("k").await.unwrap(), Ttl::Persistent);
}

#[tokio::test(start_paused = true)]
async fn blpop_times_out_when_empty() {
    let store = FakeStore::new();
    let popped = store
        .blpop("empty", Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(popped, None);
}

#[tokio::test(start_paused = true)]
async fn blpop_wakes_on_push() {
    let store = FakeStore::new();
    let waiter = {
        let store = store.clone();
        tokio::spawn(async move { store.blpop("queue", None).await })
    };
    tokio::task::yield_now().await;

    store
        .transaction(&[], |_| {
            Plan::apply(
                vec![Command::RPush {
                    key: "queue".into(),
                    values: keys(&["token"]),
                }],
                (),
            )
        })
        .await
        .unwrap();

    let popped = waiter.await.unwrap().unwrap();
    assert_eq!(popped.as_deref(), Some("token"));
}

#[tokio::test(start_paused = true)]
async fn blpop_serves_waiters_in_arrival_order() {
    let store = FakeStore::new();
    let spawn_waiter = |store: FakeStore| tokio::spawn(async move { store.blpop("queue", None).await });

    let first = spawn_waiter(store.clone());
    tokio::task::yield_now().await;
    let second = spawn_waiter(store.clone());
    tokio::task::yield_now().await;

    for value in ["a", "b"] {
        store
            .transaction(&[], |_| {
                Plan::apply(
                    vec![Command::RPush {
                        key: "queue".into(),
                        values: keys(&[value]),
                    }],
                    (),
                )
            })
            .await
            .unwrap();
    }

    assert_eq!(first.await.unwrap().unwrap().as_deref(), Some("a"));
    assert_eq!(second.await.unwrap().unwrap().as_deref(), Some("b"));
    assert_eq!(store.llen("queue").await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn timed_out_waiter_does_not_swallow_a_later_push() {
    let store = FakeStore::new();
    let popped = store
        .blpop("queue", Some(Duration::from_millis(10)))
        .await
        .unwrap();
    assert_eq!(popped, None);

    store
        .transaction(&[], |_| {
            Plan::apply(
                vec![Command::RPush {
                    key: "queue".into(),
                    values: keys(&["kept"]),
                }],
                (),
            )
        })
        .await
        .unwrap();

    assert_eq!(store.lpop("queue").await.unwrap().as_deref(), Some("kept"));
}

#[tokio::test]
async fn wrong_type_is_reported() {
    let store = FakeStore::new();
    store.put("k", "v");
    assert!(matches!(
        store.lpop("k").await,
        Err(StoreError::WrongType { .. })
    ));
    assert!(matches!(
        store.hexists("k", "f").await,
        Err(StoreError::WrongType { .. })
    ));
}

#[tokio::test]
async fn keys_match_glob_patterns() {
    let store = FakeStore::new();
    store.put("uniquejobs:a:EXISTS", "1");
    store.put("uniquejobs:b:VERSION", "1");
    store.put("other", "1");

    assert_eq!(
        store.keys("uniquejobs:*").await.unwrap(),
        keys(&["uniquejobs:a:EXISTS", "uniquejobs:b:VERSION"])
    );
    assert_eq!(
        store.keys("uniquejobs:?:EXISTS").await.unwrap(),
        keys(&["uniquejobs:a:EXISTS"])
    );
    assert_eq!(store.keys("*").await.unwrap().len(), 3);
}

#[tokio::test]
async fn time_follows_injected_clock() {
    let clock = FakeClock::at_epoch(1_700_000_000);
    let store = FakeStore::with_clock(clock.clone());
    assert_eq!(store.time().await.unwrap(), 1_700_000_000.0);
    clock.advance(Duration::from_millis(250));
    assert!((store.time().await.unwrap() - 1_700_000_000.25).abs() < 1e-6);
}

#[tokio::test]
async fn calls_are_recorded() {
    let store = FakeStore::new();
    store.lpop("k").await.unwrap();
    store.llen("k").await.unwrap();
    assert_eq!(
        store.calls(),
        vec![
            StoreCall::Lpop { key: "k".into() },
            StoreCall::Llen { key: "k".into() },
        ]
    );
}
