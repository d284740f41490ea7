// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Parcel Number Value Object
//!
//! Self-validating wrapper around the parcel business key. The merge stage
//! keys on the canonical form, so every record passes through
//! [`ParcelNumber`] exactly once during normalization.
//!
//! ## Canonical Form
//!
//! - Uppercased
//! - Whitespace and punctuation stripped, keeping only alphanumerics,
//!   `_`, `/` and `-`
//!
//! `"wa/kai/01/0001"`, `"WA KAI 01 0001"` and `"wa.kai.01.0001"` all
//! canonicalize to `"WA/KAI/01/0001"`-shaped keys (separators that are not
//! `/` or `-` are dropped, not translated).

use serde::{Deserialize, Serialize};

use crate::error::EtlError;

/// Canonical parcel identifier.
///
/// Equality and hashing operate on the canonical form, which makes the
/// type directly usable as a merge-group key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParcelNumber(String);

impl ParcelNumber {
    /// Canonicalizes the raw value and validates the result.
    ///
    /// Returns a `ValidationError` when nothing survives canonicalization
    /// (an empty or all-punctuation input).
    pub fn new(raw: impl AsRef<str>) -> Result<Self, EtlError> {
        let canonical = Self::canonicalize(raw.as_ref());
        if canonical.is_empty() {
            return Err(EtlError::validation_error(format!(
                "parcel number '{}' is empty after canonicalization",
                raw.as_ref()
            )));
        }
        Ok(Self(canonical))
    }

    /// Uppercases and strips everything except alphanumerics, `_`, `/`, `-`.
    pub fn canonicalize(raw: &str) -> String {
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '-'))
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the value object, returning the canonical string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ParcelNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ParcelNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercase_is_uppercased() {
        let parcel = ParcelNumber::new("wa/kai/01/0001").unwrap();
        assert_eq!(parcel.as_str(), "WA/KAI/01/0001");
    }

    #[test]
    fn test_whitespace_and_punctuation_stripped() {
        let parcel = ParcelNumber::new(" wa / kai.01 # 0001 ").unwrap();
        assert_eq!(parcel.as_str(), "WA/KAI010001");
    }

    #[test]
    fn test_slash_and_dash_survive() {
        let parcel = ParcelNumber::new("nw-bo/07/0123").unwrap();
        assert_eq!(parcel.as_str(), "NW-BO/07/0123");
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(ParcelNumber::new("  ...  ").is_err());
        assert!(ParcelNumber::new("").is_err());
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let once = ParcelNumber::canonicalize("wa/kai/01/0001");
        let twice = ParcelNumber::canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_equality_on_canonical_form() {
        let a = ParcelNumber::new("wa/kai/01/0001").unwrap();
        let b = ParcelNumber::new("WA / KAI / 01 / 0001").unwrap();
        assert_eq!(a, b);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn canonicalization_is_idempotent(raw in ".{0,64}") {
                let once = ParcelNumber::canonicalize(&raw);
                prop_assert_eq!(ParcelNumber::canonicalize(&once), once.clone());
            }

            #[test]
            fn canonical_form_is_uppercase_and_clean(raw in ".{0,64}") {
                let canonical = ParcelNumber::canonicalize(&raw);
                let all_clean_upper = canonical.chars().all(|c| {
                    (c.is_ascii_alphanumeric() && !c.is_ascii_lowercase())
                        || matches!(c, '_' | '/' | '-')
                });
                prop_assert!(all_clean_upper);
            }
        }
    }
}
