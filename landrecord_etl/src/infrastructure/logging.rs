// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Setup
//!
//! Structured logging initialization for the composition root. The core
//! itself only emits `tracing` events; wiring a subscriber is the hosting
//! process's job, and this helper is its one-liner for doing so.

use tracing::Level;

/// Installs a global `tracing` subscriber writing compact structured
/// output to stderr.
///
/// Returns quietly when a subscriber is already installed, so tests and
/// embedding processes can call it unconditionally.
pub fn init_tracing(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parses a level string (`error|warn|info|debug|trace`), defaulting to
/// `info` for anything unrecognized.
pub fn parse_level(raw: &str) -> Level {
    match raw.to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
