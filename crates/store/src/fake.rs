// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store for testing
//!
//! Follows Redis semantics where the engine depends on them: empty lists and
//! hashes cease to exist and expired keys vanish. Every operation runs under
//! one mutex, so transactions never conflict. Expiry and `time()` follow the
//! injected clock; blocking timeouts follow tokio time. Blocked pops queue
//! per key and each pushed item goes to the longest-waiting caller.
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::transaction::{Command, Plan, Read, Snapshot};
use crate::{Store, StoreError, Ttl};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use uj_core::clock::{Clock, SystemClock};

/// Recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get { key: String },
    Del { keys: Vec<String> },
    Exists { key: String },
    Keys { pattern: String },
    Ttl { key: String },
    Expire { key: String },
    Lpop { key: String },
    Blpop { key: String, timeout: Option<Duration> },
    Llen { key: String },
    Lrange { key: String },
    Hset { key: String, field: String },
    Hexists { key: String, field: String },
    Hgetall { key: String },
    Time,
    Transaction { keys: Vec<String> },
}

#[derive(Debug, Clone)]
enum Entry {
    Value(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct FakeState {
    data: HashMap<String, Slot>,
    calls: Vec<StoreCall>,
    /// Parked `blpop` callers per list key, oldest first
    waiters: HashMap<String, VecDeque<oneshot::Sender<String>>>,
}

impl FakeState {
    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.data
            .retain(|_, slot| slot.expires_at.map_or(true, |at| at > now));
    }

    fn value(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.data.get(key).map(|s| &s.entry) {
            None => Ok(None),
            Some(Entry::Value(v)) => Ok(Some(v.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.data.get(key).map(|s| &s.entry) {
            None => Ok(Vec::new()),
            Some(Entry::List(items)) => Ok(items.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hash(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        match self.data.get(key).map(|s| &s.entry) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(fields)) => Ok(fields.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<String>, StoreError> {
        let slot = self.data.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut slot.entry {
            Entry::List(items) => Ok(items),
            _ => Err(wrong_type(key)),
        }
    }

    fn hash_mut(&mut self, key: &str) -> Result<&mut HashMap<String, String>, StoreError> {
        let slot = self.data.entry(key.to_string()).or_insert_with(|| Slot {
            entry: Entry::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut slot.entry {
            Entry::Hash(fields) => Ok(fields),
            _ => Err(wrong_type(key)),
        }
    }

    /// Empty aggregates don't exist in Redis
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.data.get(key).map(|s| &s.entry) {
            Some(Entry::List(items)) => items.is_empty(),
            Some(Entry::Hash(fields)) => fields.is_empty(),
            _ => false,
        };
        if empty {
            self.data.remove(key);
        }
    }

    fn lpop(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.data.contains_key(key) {
            return Ok(None);
        }
        let popped = self.list_mut(key)?.pop_front();
        self.drop_if_empty(key);
        Ok(popped)
    }

    /// Pop items straight into parked `blpop` callers, oldest first
    fn serve_waiters(&mut self) {
        let keys: Vec<String> = self.waiters.keys().cloned().collect();
        for key in keys {
            loop {
                let waiter = match self.waiters.get_mut(&key) {
                    Some(queue) => {
                        // Timed-out or cancelled callers dropped their receiver
                        queue.retain(|w| !w.is_closed());
                        queue.pop_front()
                    }
                    None => None,
                };
                let Some(waiter) = waiter else { break };

                let expires_at = self.data.get(&key).and_then(|slot| slot.expires_at);
                let Ok(Some(item)) = self.lpop(&key) else {
                    if let Some(queue) = self.waiters.get_mut(&key) {
                        queue.push_front(waiter);
                    }
                    break;
                };
                if let Err(item) = waiter.send(item) {
                    // Receiver went away after the check; the item stays first
                    if let Ok(list) = self.list_mut(&key) {
                        list.push_front(item);
                    }
                    if let Some(slot) = self.data.get_mut(&key) {
                        slot.expires_at = expires_at;
                    }
                }
            }
            if self.waiters.get(&key).is_some_and(VecDeque::is_empty) {
                self.waiters.remove(&key);
            }
        }
    }

    fn expire(&mut self, key: &str, ttl: Duration, now: DateTime<Utc>) -> bool {
        match self.data.get_mut(key) {
            Some(slot) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
                slot.expires_at = Some(now + ttl);
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, command: &Command, now: DateTime<Utc>) -> Result<(), StoreError> {
        match command {
            Command::Set { key, value } => {
                self.data.insert(
                    key.clone(),
                    Slot {
                        entry: Entry::Value(value.clone()),
                        expires_at: None,
                    },
                );
            }
            Command::Del { keys } => {
                for key in keys {
                    self.data.remove(key);
                }
            }
            Command::RPush { key, values } => {
                if !values.is_empty() {
                    self.list_mut(key)?.extend(values.iter().cloned());
                }
            }
            Command::HSet { key, field, value } => {
                self.hash_mut(key)?.insert(field.clone(), value.clone());
            }
            Command::HDel { key, fields } => {
                if self.data.contains_key(key) {
                    let hash = self.hash_mut(key)?;
                    for field in fields {
                        hash.remove(field);
                    }
                    self.drop_if_empty(key);
                }
            }
            Command::Expire { key, ttl } => {
                self.expire(key, *ttl, now);
            }
            Command::Persist { key } => {
                if let Some(slot) = self.data.get_mut(key) {
                    slot.expires_at = None;
                }
            }
        }
        Ok(())
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

/// Glob match supporting `*` and `?`
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while c < candidate.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == candidate[c]) {
            p += 1;
            c += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, c));
            p += 1;
        } else if let Some((star_p, star_c)) = star {
            p = star_p + 1;
            c = star_c + 1;
            star = Some((star_p, star_c + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&ch| ch == '*')
}

/// In-memory store with call recording for testing
#[derive(Clone)]
pub struct FakeStore<C: Clock = SystemClock> {
    state: Arc<Mutex<FakeState>>,
    clock: C,
}

impl FakeStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for FakeStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FakeStore<C> {
    /// Fake store whose expiry and `time()` follow `clock`
    pub fn with_clock(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// All live keys, sorted
    pub fn dump_keys(&self) -> Vec<String> {
        let mut state = self.lock();
        state.purge_expired(self.clock.now());
        let mut keys: Vec<String> = state.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Seed a plain string value, e.g. to simulate a foreign lock owner
    pub fn put(&self, key: &str, value: &str) {
        let mut state = self.lock();
        state.data.insert(
            key.to_string(),
            Slot {
                entry: Entry::Value(value.to_string()),
                expires_at: None,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` on purged state after recording `call`
    fn with_state<T>(&self, call: StoreCall, f: impl FnOnce(&mut FakeState, DateTime<Utc>) -> T) -> T {
        let now = self.clock.now();
        let mut state = self.lock();
        state.calls.push(call);
        state.purge_expired(now);
        f(&mut state, now)
    }
}

#[async_trait]
impl<C: Clock> Store for FakeStore<C> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_state(StoreCall::Get { key: key.into() }, |s, _| s.value(key))
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.with_state(StoreCall::Del { keys: keys.to_vec() }, |s, _| {
            Ok(keys.iter().filter(|k| s.data.remove(k.as_str()).is_some()).count() as u64)
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.with_state(StoreCall::Exists { key: key.into() }, |s, _| {
            Ok(s.data.contains_key(key))
        })
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.with_state(StoreCall::Keys { pattern: pattern.into() }, |s, _| {
            let mut keys: Vec<String> = s
                .data
                .keys()
                .filter(|k| glob_match(pattern, k))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    async fn ttl(&self, key: &str) -> Result<Ttl, StoreError> {
        self.with_state(StoreCall::Ttl { key: key.into() }, |s, now| {
            Ok(match s.data.get(key) {
                None => Ttl::Missing,
                Some(Slot { expires_at: None, .. }) => Ttl::Persistent,
                Some(Slot {
                    expires_at: Some(at),
                    ..
                }) => Ttl::Expires((*at - now).to_std().unwrap_or(Duration::ZERO)),
            })
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.with_state(StoreCall::Expire { key: key.into() }, |s, now| {
            Ok(s.expire(key, ttl, now))
        })
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_state(StoreCall::Lpop { key: key.into() }, |s, _| s.lpop(key))
    }

    async fn blpop(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, StoreError> {
        let call = StoreCall::Blpop {
            key: key.into(),
            timeout,
        };
        let (tx, mut rx) = oneshot::channel();
        let popped = self.with_state(call, |s, _| -> Result<Option<String>, StoreError> {
            // Queue behind earlier waiters even if an item is listed
            let queued = s.waiters.get(key).is_some_and(|q| q.iter().any(|w| !w.is_closed()));
            if !queued {
                if let Some(item) = s.lpop(key)? {
                    return Ok(Some(item));
                }
            }
            s.waiters.entry(key.to_string()).or_default().push_back(tx);
            s.serve_waiters();
            Ok(None)
        })?;
        if popped.is_some() {
            return Ok(popped);
        }

        let Some(timeout) = timeout else {
            return Ok((&mut rx).await.ok());
        };
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(received) => Ok(received.ok()),
            Err(_) => {
                // An item handed over just as the timeout fired still counts
                rx.close();
                Ok(rx.try_recv().ok())
            }
        }
    }

    async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        self.with_state(StoreCall::Llen { key: key.into() }, |s, _| {
            Ok(s.list(key)?.len() as u64)
        })
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_state(StoreCall::Lrange { key: key.into() }, |s, _| s.list(key))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.with_state(
            StoreCall::Hset {
                key: key.into(),
                field: field.into(),
            },
            |s, _| {
                s.hash_mut(key)?.insert(field.to_string(), value.to_string());
                Ok(())
            },
        )
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        self.with_state(
            StoreCall::Hexists {
                key: key.into(),
                field: field.into(),
            },
            |s, _| Ok(s.hash(key)?.contains_key(field)),
        )
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.with_state(StoreCall::Hgetall { key: key.into() }, |s, _| s.hash(key))
    }

    async fn time(&self) -> Result<f64, StoreError> {
        self.lock().calls.push(StoreCall::Time);
        Ok(self.clock.epoch_secs())
    }

    async fn transaction<T, F>(&self, reads: &[Read], mut plan: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnMut(&Snapshot) -> Plan<T> + Send,
    {
        let keys = reads.iter().map(|r| r.key().to_string()).collect();
        self.with_state(StoreCall::Transaction { keys }, |s, now| {
            let mut snapshot = Snapshot::default();
            for read in reads {
                match read {
                    Read::Value(key) => snapshot.insert_value(key.clone(), s.value(key)?),
                    Read::List(key) => snapshot.insert_list(key.clone(), s.list(key)?),
                    Read::Hash(key) => snapshot.insert_hash(key.clone(), s.hash(key)?),
                }
            }

            let Plan { commands, value } = plan(&snapshot);

            // All-or-nothing: roll back to the pre-transaction data on error
            let backup = s.data.clone();
            for command in &commands {
                if let Err(e) = s.apply(command, now) {
                    s.data = backup;
                    return Err(e);
                }
            }
            s.serve_waiters();
            Ok(value)
        })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
