// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn idle_pool_hands_back_parked_connections() {
    let pool = IdlePool::new(2);
    assert_eq!(pool.take(), None::<u32>);

    assert!(pool.put(1));
    assert_eq!(pool.take(), Some(1));
    assert_eq!(pool.take(), None);
}

#[test]
fn idle_pool_drops_connections_beyond_capacity() {
    let pool = IdlePool::new(2);
    assert!(pool.put(1));
    assert!(pool.put(2));
    assert!(!pool.put(3));

    let mut reused = vec![pool.take().unwrap(), pool.take().unwrap()];
    reused.sort();
    assert_eq!(reused, vec![1, 2]);
    assert_eq!(pool.take(), None);
}

#[tokio::test(start_paused = true)]
async fn slow_connect_times_out() {
    let result: Result<(), StoreError> =
        with_connect_timeout(std::future::pending::<Result<(), redis::RedisError>>()).await;

    assert!(matches!(result, Err(StoreError::ConnectTimeout(t)) if t == CONNECT_TIMEOUT));
}

#[test]
fn empty_variadic_commands_are_skipped() {
    assert!(Command::Del { keys: vec![] }.is_empty());
    assert!(!Command::Persist { key: "k".into() }.is_empty());
}
