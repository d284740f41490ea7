// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Objects
//!
//! Immutable, self-validating values without identity. The parcel number
//! is the one the whole pipeline pivots on: the merge stage groups records
//! by its canonical form.

pub mod parcel_number;

pub use parcel_number::ParcelNumber;
