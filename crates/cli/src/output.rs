// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use clap::ValueEnum;
use serde::Serialize;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Render a value in the specified format
pub fn render<T: Serialize + std::fmt::Display>(value: &T, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => value.to_string(),
        OutputFormat::Json => serde_json::to_string_pretty(value).unwrap_or_default(),
    }
}

/// Render a list of items, one per line as text
pub fn render_list<T: Serialize + std::fmt::Display>(items: &[T], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => serde_json::to_string_pretty(items).unwrap_or_default(),
    }
}
