// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Optimistic multi-key transactions
//!
//! A transaction watches a set of keys, reads them into a [`Snapshot`],
//! asks a planner for the [`Command`]s to apply, and applies them
//! all-or-nothing. If a watched key changed in between, the store re-reads
//! and re-plans.

use std::collections::HashMap;
use std::time::Duration;

/// Bound on re-plans before a transaction gives up
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 16;

/// A key to watch and read before planning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Read {
    Value(String),
    List(String),
    Hash(String),
}

impl Read {
    pub fn key(&self) -> &str {
        match self {
            Read::Value(key) | Read::List(key) | Read::Hash(key) => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Observed {
    Value(Option<String>),
    List(Vec<String>),
    Hash(HashMap<String, String>),
}

/// Values of the watched keys at the time of planning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    observed: HashMap<String, Observed>,
}

impl Snapshot {
    pub fn insert_value(&mut self, key: impl Into<String>, value: Option<String>) {
        self.observed.insert(key.into(), Observed::Value(value));
    }

    pub fn insert_list(&mut self, key: impl Into<String>, items: Vec<String>) {
        self.observed.insert(key.into(), Observed::List(items));
    }

    pub fn insert_hash(&mut self, key: impl Into<String>, fields: HashMap<String, String>) {
        self.observed.insert(key.into(), Observed::Hash(fields));
    }

    /// String value of a watched key; `None` if absent or not read as a value
    pub fn value(&self, key: &str) -> Option<&str> {
        match self.observed.get(key) {
            Some(Observed::Value(value)) => value.as_deref(),
            _ => None,
        }
    }

    /// Items of a watched list; empty if absent
    pub fn list(&self, key: &str) -> &[String] {
        match self.observed.get(key) {
            Some(Observed::List(items)) => items,
            _ => &[],
        }
    }

    /// Fields of a watched hash; empty if absent
    pub fn hash(&self, key: &str) -> HashMap<&str, &str> {
        match self.observed.get(key) {
            Some(Observed::Hash(fields)) => fields
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            _ => HashMap::new(),
        }
    }

    pub fn hash_contains(&self, key: &str, field: &str) -> bool {
        matches!(self.observed.get(key), Some(Observed::Hash(fields)) if fields.contains_key(field))
    }
}

/// A mutation applied inside a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Del { keys: Vec<String> },
    RPush { key: String, values: Vec<String> },
    HSet { key: String, field: String, value: String },
    HDel { key: String, fields: Vec<String> },
    Expire { key: String, ttl: Duration },
    Persist { key: String },
}

/// What a transaction applies, and what it returns once applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<T> {
    pub commands: Vec<Command>,
    pub value: T,
}

impl<T> Plan<T> {
    /// Apply nothing; the watch is dropped
    pub fn noop(value: T) -> Self {
        Self {
            commands: Vec::new(),
            value,
        }
    }

    pub fn apply(commands: Vec<Command>, value: T) -> Self {
        Self { commands, value }
    }
}
