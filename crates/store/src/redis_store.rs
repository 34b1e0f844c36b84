// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed store
//!
//! Plain commands share one auto-reconnecting multiplexed connection.
//! `WATCH` state is per connection, so each transaction checks out a
//! connection of its own from a small idle pool and parks it again once the
//! transaction settles. A parked `BLPOP` would stall every other caller on a
//! shared connection, so blocking pops always open a fresh one.

use crate::transaction::{Command, Plan, Read, Snapshot, MAX_TRANSACTION_ATTEMPTS};
use crate::{Store, StoreError, Ttl};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCAN_BATCH: u32 = 500;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_IDLE_CONNECTIONS: usize = 8;

/// Connections parked between uses, at most `capacity` of them
struct IdlePool<T> {
    idle: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> IdlePool<T> {
    fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            capacity,
        }
    }

    fn take(&self) -> Option<T> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner()).pop()
    }

    /// Park `conn`; `false` if the pool was full and it was dropped
    fn put(&self, conn: T) -> bool {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() >= self.capacity {
            return false;
        }
        idle.push(conn);
        true
    }
}

async fn with_connect_timeout<T, F>(connecting: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, redis::RedisError>>,
{
    match tokio::time::timeout(CONNECT_TIMEOUT, connecting).await {
        Ok(conn) => Ok(conn?),
        Err(_) => Err(StoreError::ConnectTimeout(CONNECT_TIMEOUT)),
    }
}

/// Store backed by a Redis server
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
    transactional: Arc<IdlePool<MultiplexedConnection>>,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = with_connect_timeout(ConnectionManager::new(client.clone())).await?;
        tracing::debug!(url, "connected to redis");
        Ok(Self {
            client,
            conn,
            transactional: Arc::new(IdlePool::new(MAX_IDLE_CONNECTIONS)),
        })
    }

    async fn open(&self) -> Result<MultiplexedConnection, StoreError> {
        with_connect_timeout(self.client.get_multiplexed_async_connection()).await
    }

    /// A connection no other transaction is using
    async fn checkout(&self) -> Result<MultiplexedConnection, StoreError> {
        match self.transactional.take() {
            Some(conn) => Ok(conn),
            None => self.open().await,
        }
    }
}

impl Command {
    fn append_to(&self, pipe: &mut redis::Pipeline) {
        match self {
            Command::Set { key, value } => {
                pipe.cmd("SET").arg(key).arg(value);
            }
            Command::Del { keys } => {
                pipe.cmd("DEL").arg(keys);
            }
            Command::RPush { key, values } => {
                pipe.cmd("RPUSH").arg(key).arg(values);
            }
            Command::HSet { key, field, value } => {
                pipe.cmd("HSET").arg(key).arg(field).arg(value);
            }
            Command::HDel { key, fields } => {
                pipe.cmd("HDEL").arg(key).arg(fields);
            }
            Command::Expire { key, ttl } => {
                pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(*ttl));
            }
            Command::Persist { key } => {
                pipe.cmd("PERSIST").arg(key);
            }
        }
    }

    /// Redis rejects variadic commands with no arguments
    fn is_empty(&self) -> bool {
        match self {
            Command::Del { keys } => keys.is_empty(),
            Command::RPush { values, .. } => values.is_empty(),
            Command::HDel { fields, .. } => fields.is_empty(),
            _ => false,
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

async fn read_snapshot(
    conn: &mut MultiplexedConnection,
    reads: &[Read],
) -> Result<Snapshot, StoreError> {
    let mut snapshot = Snapshot::default();
    for read in reads {
        match read {
            Read::Value(key) => {
                let value: Option<String> = redis::cmd("GET").arg(key).query_async(conn).await?;
                snapshot.insert_value(key.clone(), value);
            }
            Read::List(key) => {
                let items: Vec<String> = redis::cmd("LRANGE")
                    .arg(key)
                    .arg(0)
                    .arg(-1)
                    .query_async(conn)
                    .await?;
                snapshot.insert_list(key.clone(), items);
            }
            Read::Hash(key) => {
                let fields: HashMap<String, String> =
                    redis::cmd("HGETALL").arg(key).query_async(conn).await?;
                snapshot.insert_hash(key.clone(), fields);
            }
        }
    }
    Ok(snapshot)
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(redis::cmd("DEL").arg(keys).query_async(&mut conn).await?)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Ttl, StoreError> {
        let mut conn = self.conn.clone();
        let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        Ok(match millis {
            -2 => Ttl::Missing,
            -1 => Ttl::Persistent,
            ms => Ttl::Expires(Duration::from_millis(ms.unsigned_abs())),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let applied: u64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("LPOP").arg(key).query_async(&mut conn).await?)
    }

    async fn blpop(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.open().await?;
        // BLPOP treats 0 as "wait forever"
        let seconds = timeout.map_or(0.0, |t| t.as_secs_f64().max(0.001));
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn llen(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("LLEN").arg(key).query_async(&mut conn).await?)
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: u64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("HEXISTS")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?)
    }

    async fn time(&self) -> Result<f64, StoreError> {
        let mut conn = self.conn.clone();
        let (secs, micros): (u64, u64) = redis::cmd("TIME").query_async(&mut conn).await?;
        Ok(secs as f64 + micros as f64 / 1_000_000.0)
    }

    async fn transaction<T, F>(&self, reads: &[Read], mut plan: F) -> Result<T, StoreError>
    where
        T: Send,
        F: FnMut(&Snapshot) -> Plan<T> + Send,
    {
        let mut conn = self.checkout().await?;
        let result = watch_and_apply(&mut conn, reads, &mut plan).await;
        // EXEC and UNWATCH both clear the watch; after an error the
        // connection's state is unknown, so it is dropped instead
        if result.is_ok() {
            self.transactional.put(conn);
        }
        result
    }
}

async fn watch_and_apply<T, F>(
    conn: &mut MultiplexedConnection,
    reads: &[Read],
    plan: &mut F,
) -> Result<T, StoreError>
where
    F: FnMut(&Snapshot) -> Plan<T>,
{
    let watched: Vec<&str> = reads.iter().map(Read::key).collect();

    for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
        if !watched.is_empty() {
            let _: () = redis::cmd("WATCH").arg(&watched).query_async(conn).await?;
        }
        let snapshot = read_snapshot(conn, reads).await?;
        let Plan { commands, value } = plan(&snapshot);
        let commands: Vec<Command> = commands.into_iter().filter(|c| !c.is_empty()).collect();

        if commands.is_empty() {
            let _: () = redis::cmd("UNWATCH").query_async(conn).await?;
            return Ok(value);
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in &commands {
            command.append_to(&mut pipe);
        }
        // EXEC replies nil when a watched key changed
        let applied: Option<Vec<redis::Value>> = pipe.query_async(conn).await?;
        if applied.is_some() {
            return Ok(value);
        }
        tracing::debug!(attempt, keys = ?watched, "watched keys changed, re-planning");
    }

    Err(StoreError::TransactionConflict {
        keys: watched.iter().map(|k| k.to_string()).collect(),
        attempts: MAX_TRANSACTION_ATTEMPTS,
    })
}

#[cfg(test)]
#[path = "redis_store_tests.rs"]
mod tests;
