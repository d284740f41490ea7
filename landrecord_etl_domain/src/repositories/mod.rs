// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Repository Ports
//!
//! Persistence abstractions consumed by the pipeline core. Only the
//! watermark store lives here; record persistence goes through the
//! [`Destination`](crate::services::destination::Destination) port.

pub mod watermark_repository;

pub use watermark_repository::{Watermark, WatermarkRepository};
