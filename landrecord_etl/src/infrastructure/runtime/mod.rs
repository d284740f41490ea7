// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Utilities
//!
//! Supervised task spawning and the cooperative cancellation/pause
//! primitives shared by all pipeline stages.

pub mod shutdown;
pub mod supervisor;

pub use shutdown::{CancellationToken, PauseGate};
pub use supervisor::{join_supervised, spawn_supervised, TaskResult};
