// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic procedures over a semaphore's keys
//!
//! Each procedure is a single [`Store::transaction`], so it is indivisible
//! with respect to every other caller in every process.

use crate::keys::SemaphoreKeys;
use std::collections::HashSet;
use std::time::Duration;
use uj_core::TokenGen;
use uj_store::{Command, Plan, Read, Snapshot, Store, StoreError};

/// Marker written to `VERSION` on creation
pub const API_VERSION: &str = "1";

fn expire_all(keys: &SemaphoreKeys, expiration: Option<Duration>) -> Vec<Command> {
    let Some(ttl) = expiration else {
        return Vec::new();
    };
    keys.lock_keys()
        .into_iter()
        .map(|key| Command::Expire { key, ttl })
        .collect()
}

/// Create the semaphore unless it already exists
///
/// Returns `true` for the single winner among racing creators. An existing
/// semaphore without a `VERSION` gets one back-filled.
pub async fn create_if_absent<S: Store>(
    store: &S,
    keys: &SemaphoreKeys,
    exists_token: &str,
    resources: u32,
    expiration: Option<Duration>,
) -> Result<bool, StoreError> {
    let reads = [
        Read::Value(keys.exists.clone()),
        Read::Value(keys.version.clone()),
    ];
    store
        .transaction(&reads, |snap| {
            if snap.value(&keys.exists).is_some() {
                if snap.value(&keys.version).is_some() {
                    return Plan::noop(false);
                }
                let mut commands = vec![Command::Set {
                    key: keys.version.clone(),
                    value: API_VERSION.to_string(),
                }];
                commands.extend(expire_all(keys, expiration));
                return Plan::apply(commands, false);
            }

            let mut commands = vec![
                Command::Del {
                    keys: vec![keys.grabbed.clone(), keys.available.clone()],
                },
                Command::RPush {
                    key: keys.available.clone(),
                    values: (0..resources).map(|i| i.to_string()).collect(),
                },
                Command::Set {
                    key: keys.exists.clone(),
                    value: exists_token.to_string(),
                },
                Command::Set {
                    key: keys.version.clone(),
                    value: API_VERSION.to_string(),
                },
            ];
            match expiration {
                Some(_) => commands.extend(expire_all(keys, expiration)),
                None => commands.push(Command::Persist {
                    key: keys.exists.clone(),
                }),
            }
            Plan::apply(commands, true)
        })
        .await
}

/// Record a popped token as checked out at `now`
pub async fn grab<S: Store>(
    store: &S,
    keys: &SemaphoreKeys,
    token: &str,
    now: f64,
    expiration: Option<Duration>,
) -> Result<(), StoreError> {
    let mut commands = vec![Command::HSet {
        key: keys.grabbed.clone(),
        field: token.to_string(),
        value: now.to_string(),
    }];
    commands.extend(expire_all(keys, expiration));
    store
        .transaction(&[], |_| Plan::apply(commands.clone(), ()))
        .await
}

fn in_pool(snap: &Snapshot, keys: &SemaphoreKeys, token: &str) -> bool {
    snap.list(&keys.available).iter().any(|t| t == token)
        || snap.hash_contains(&keys.grabbed, token)
}

/// Return a token to the pool
///
/// With no token, a fresh one not already in the pool is generated, which
/// grows the pool by one. Returns the token signaled.
pub async fn signal<S: Store, G: TokenGen>(
    store: &S,
    keys: &SemaphoreKeys,
    token: Option<&str>,
    token_gen: &G,
    expiration: Option<Duration>,
) -> Result<String, StoreError> {
    let reads = [
        Read::Hash(keys.grabbed.clone()),
        Read::List(keys.available.clone()),
    ];
    store
        .transaction(&reads, |snap| {
            let token = match token {
                Some(token) => token.to_string(),
                None => loop {
                    let candidate = token_gen.next();
                    if !in_pool(snap, keys, &candidate) {
                        break candidate;
                    }
                },
            };

            let mut commands = vec![Command::HDel {
                key: keys.grabbed.clone(),
                fields: vec![token.clone()],
            }];
            if !snap.list(&keys.available).contains(&token) {
                commands.push(Command::RPush {
                    key: keys.available.clone(),
                    values: vec![token.clone()],
                });
            }
            commands.extend(expire_all(keys, expiration));
            Plan::apply(commands, token)
        })
        .await
}

/// Parameters of one stale sweep
#[derive(Debug, Clone, Copy)]
pub struct Sweep {
    /// Tokens checked out longer than this are reclaimed
    pub stale_after: Duration,
    /// How long the sweep mutex is held before another process may take it over
    pub lease: Duration,
    pub expiration: Option<Duration>,
}

/// Move stale tokens from `GRABBED` back to `AVAILABLE`
///
/// Serialized fleet-wide by the `RELEASE` mutex. Returns the reclaimed
/// tokens, or `None` when another process holds the mutex.
pub async fn release_stale_locks<S: Store>(
    store: &S,
    keys: &SemaphoreKeys,
    sweep: Sweep,
    now: f64,
) -> Result<Option<Vec<String>>, StoreError> {
    let Some(expiry) = acquire_sweep_mutex(store, keys, sweep.lease, now).await? else {
        return Ok(None);
    };

    let stale_after = sweep.stale_after.as_secs_f64();
    let reads = [
        Read::Hash(keys.grabbed.clone()),
        Read::List(keys.available.clone()),
    ];
    let swept = store
        .transaction(&reads, |snap| {
            let mut stale: Vec<String> = snap
                .hash(&keys.grabbed)
                .into_iter()
                .filter(|(_, at)| at.parse::<f64>().is_ok_and(|at| at + stale_after < now))
                .map(|(token, _)| token.to_string())
                .collect();
            stale.sort();
            if stale.is_empty() {
                return Plan::noop(stale);
            }

            let available: HashSet<&str> =
                snap.list(&keys.available).iter().map(String::as_str).collect();
            let mut commands = vec![Command::HDel {
                key: keys.grabbed.clone(),
                fields: stale.clone(),
            }];
            commands.push(Command::RPush {
                key: keys.available.clone(),
                values: stale
                    .iter()
                    .filter(|t| !available.contains(t.as_str()))
                    .cloned()
                    .collect(),
            });
            commands.extend(expire_all(keys, sweep.expiration));
            Plan::apply(commands, stale)
        })
        .await;

    // Release even when the sweep failed; the lease bounds it otherwise
    let released = release_sweep_mutex(store, keys, &expiry).await;
    let swept = swept?;
    released?;
    Ok(Some(swept))
}

/// Take the sweep mutex, or take it over once its holder's lease expired.
/// Returns the expiry value written, needed to release it.
async fn acquire_sweep_mutex<S: Store>(
    store: &S,
    keys: &SemaphoreKeys,
    lease: Duration,
    now: f64,
) -> Result<Option<String>, StoreError> {
    let hold = lease + Duration::from_secs(1);
    let expiry = (now + hold.as_secs_f64()).to_string();
    store
        .transaction(&[Read::Value(keys.release.clone())], |snap| {
            let held = snap
                .value(&keys.release)
                .and_then(|v| v.parse::<f64>().ok())
                .is_some_and(|until| until > now);
            if held {
                return Plan::noop(None);
            }
            Plan::apply(
                vec![
                    Command::Set {
                        key: keys.release.clone(),
                        value: expiry.clone(),
                    },
                    Command::Expire {
                        key: keys.release.clone(),
                        ttl: hold,
                    },
                ],
                Some(expiry.clone()),
            )
        })
        .await
}

/// Delete the sweep mutex only if it still holds our expiry value
async fn release_sweep_mutex<S: Store>(
    store: &S,
    keys: &SemaphoreKeys,
    expiry: &str,
) -> Result<bool, StoreError> {
    store
        .transaction(&[Read::Value(keys.release.clone())], |snap| {
            if snap.value(&keys.release) != Some(expiry) {
                return Plan::noop(false);
            }
            Plan::apply(
                vec![Command::Del {
                    keys: vec![keys.release.clone()],
                }],
                true,
            )
        })
        .await
}

/// Mark `owner` as the holder of a single-holder lock
pub async fn claim<S: Store>(
    store: &S,
    keys: &SemaphoreKeys,
    owner: &str,
    expiration: Option<Duration>,
) -> Result<(), StoreError> {
    let mut commands = vec![Command::Set {
        key: keys.exists.clone(),
        value: owner.to_string(),
    }];
    if let Some(ttl) = expiration {
        commands.push(Command::Expire {
            key: keys.exists.clone(),
            ttl,
        });
    }
    store
        .transaction(&[], |_| Plan::apply(commands.clone(), ()))
        .await
}

/// Delete the whole lock if `EXISTS` holds `owner`
pub async fn delete_if_owner<S: Store>(
    store: &S,
    keys: &SemaphoreKeys,
    owner: &str,
) -> Result<bool, StoreError> {
    store
        .transaction(&[Read::Value(keys.exists.clone())], |snap| {
            if snap.value(&keys.exists) != Some(owner) {
                return Plan::noop(false);
            }
            Plan::apply(
                vec![Command::Del {
                    keys: keys.lock_keys(),
                }],
                true,
            )
        })
        .await
}

#[cfg(test)]
#[path = "scripts_tests.rs"]
mod tests;
