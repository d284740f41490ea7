// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Encryption Service Port
//!
//! Field-level PII protection boundary. The loader encrypts national ids,
//! phone numbers and email addresses before they reach the destination,
//! and stores a salted one-way hash in a sibling column so equality
//! lookups stay indexable without decryption.
//!
//! ## Contract
//!
//! - `encrypt`/`decrypt` round-trip: `decrypt(encrypt(x)) == x`
//! - Ciphertexts use authenticated symmetric encryption with a random
//!   per-message IV; the stored form is `base64(iv || tag || ciphertext)`,
//!   so equal plaintexts produce different ciphertexts
//! - `hash` is deterministic and stable across process restarts: equal
//!   plaintexts always produce the same hex digest

use crate::error::EtlError;

/// Authenticated encryption and stable hashing for PII fields.
///
/// Implementations must be safe to share across loader tasks.
pub trait EncryptionService: Send + Sync {
    /// Encrypts a plaintext field value into the storable
    /// `base64(iv || tag || ciphertext)` form.
    fn encrypt(&self, plaintext: &str) -> Result<String, EtlError>;

    /// Reverses [`EncryptionService::encrypt`].
    fn decrypt(&self, ciphertext: &str) -> Result<String, EtlError>;

    /// Salted one-way hex digest for the sibling `*_hash` column.
    fn hash(&self, plaintext: &str) -> String;
}
