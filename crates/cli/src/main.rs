// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow unwrap in test code
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! uj - inspect and clear unique job locks

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::digest::{self, DigestArgs};
use commands::lock::{self, LockCommand};
use output::OutputFormat;
use std::path::PathBuf;
use uj_core::Config;
use uj_store::{RedisStore, TracedStore};

#[derive(Parser)]
#[command(
    name = "uj",
    version,
    about = "uj - inspect and clear unique job locks"
)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Redis URL, overriding the config file
    #[arg(long, global = true)]
    redis_url: Option<String>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the digest a work item locks on
    Digest(DigestArgs),
    #[command(flatten)]
    Lock(LockCommand),
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(url) = &cli.redis_url {
        config.redis_url = url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();
    let config = load_config(&cli)?;

    let rendered = match cli.command {
        // Needs no store
        Commands::Digest(args) => output::render(&digest::digest(&args, &config)?, cli.output),

        Commands::Lock(command) => {
            let store = TracedStore::new(
                RedisStore::connect(&config.redis_url)
                    .await
                    .with_context(|| format!("failed to connect to {}", config.redis_url))?,
            );

            match command {
                LockCommand::Show { digest } => {
                    output::render(&lock::show(&store, &digest).await?, cli.output)
                }
                LockCommand::Keys { pattern } => output::render_list(
                    &lock::keys(&store, &config, pattern.as_deref()).await?,
                    cli.output,
                ),
                LockCommand::Unlock { digest } => {
                    output::render(&lock::unlock(&store, &digest).await?, cli.output)
                }
                LockCommand::Sweep {
                    digest,
                    stale_after,
                } => output::render(
                    &lock::sweep(&store, &config, &digest, stale_after).await?,
                    cli.output,
                ),
            }
        }
    };

    if !rendered.is_empty() {
        println!("{}", rendered);
    }
    Ok(())
}
