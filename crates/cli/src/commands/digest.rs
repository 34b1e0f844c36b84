// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Digest computation without a store

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use uj_core::{unique_digest, Config, WorkItem};

#[derive(Args)]
pub struct DigestArgs {
    /// Worker class
    #[arg(long)]
    pub class: String,
    /// Queue the item is pushed to
    #[arg(long, default_value = "default")]
    pub queue: String,
    /// Job arguments as a JSON array
    #[arg(default_value = "[]")]
    pub args: String,
}

#[derive(Debug, Serialize)]
pub struct DigestReport {
    pub digest: String,
}

impl fmt::Display for DigestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest)
    }
}

/// Digest for the described item, honouring the class's uniqueness options
pub fn digest(args: &DigestArgs, config: &Config) -> Result<DigestReport> {
    let parsed: Value = serde_json::from_str(&args.args).context("arguments must be valid JSON")?;
    let Value::Array(job_args) = parsed else {
        bail!("arguments must be a JSON array, got: {}", args.args);
    };

    let item = WorkItem::new("", args.class.as_str(), job_args).with_queue(args.queue.as_str());
    let options = config.worker(&args.class);
    Ok(DigestReport {
        digest: unique_digest(&item, &options, &config.unique_prefix),
    })
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
