// /////////////////////////////////////////////////////////////////////////////
// Land Records ETL Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # AEAD Encryption Service
//!
//! Field-level PII encryption behind the domain's
//! [`EncryptionService`] port.
//!
//! ## Storage Format
//!
//! Every ciphertext is `base64(iv || tag || ciphertext)`:
//!
//! - **iv**: 12 random bytes, fresh per message
//! - **tag**: 16-byte authentication tag
//! - **ciphertext**: the AEAD output body
//!
//! Equal plaintexts therefore produce different ciphertexts; equality
//! lookups go through the salted SHA-256 hash instead, which is stable
//! across process restarts.
//!
//! ## Algorithms
//!
//! AES-256-GCM is the default; ChaCha20-Poly1305 is available for hosts
//! without AES hardware support. Both use 96-bit nonces and 128-bit tags,
//! so the storage format is identical.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose;
use base64::Engine as _;
use chacha20poly1305::ChaCha20Poly1305;
use sha2::{Digest, Sha256};

use landrecord_etl_domain::services::encryption_service::EncryptionService;
use landrecord_etl_domain::EtlError;

/// Environment variable carrying the base64 256-bit key.
pub const ENCRYPTION_KEY_ENV: &str = "ETL_ENCRYPTION_KEY";

/// Environment variable carrying the hash salt.
pub const HASH_SALT_ENV: &str = "ETL_HASH_SALT";

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Supported AEAD algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
}

enum CipherKind {
    Aes(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
}

/// AEAD-backed implementation of the PII encryption port.
pub struct AeadEncryptionService {
    cipher: CipherKind,
    hash_salt: Vec<u8>,
}

impl AeadEncryptionService {
    /// Builds the service from raw key material.
    ///
    /// The key must be exactly 32 bytes; anything else is a fatal
    /// misconfiguration, not a per-record failure.
    pub fn new(
        algorithm: CipherAlgorithm,
        key: &[u8],
        hash_salt: impl Into<Vec<u8>>,
    ) -> Result<Self, EtlError> {
        if key.len() != 32 {
            return Err(EtlError::fatal_error(format!(
                "encryption key must be 32 bytes, got {}",
                key.len()
            )));
        }

        let cipher = match algorithm {
            CipherAlgorithm::Aes256Gcm => {
                CipherKind::Aes(Box::new(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key))))
            }
            CipherAlgorithm::ChaCha20Poly1305 => CipherKind::ChaCha(Box::new(
                ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(key)),
            )),
        };

        Ok(Self {
            cipher,
            hash_salt: hash_salt.into(),
        })
    }

    /// Builds the service from `ETL_ENCRYPTION_KEY` (base64, 32 bytes)
    /// and `ETL_HASH_SALT`.
    pub fn from_env() -> Result<Self, EtlError> {
        let key_b64 = std::env::var(ENCRYPTION_KEY_ENV)
            .map_err(|_| EtlError::fatal_error(format!("{} is not set", ENCRYPTION_KEY_ENV)))?;
        let key = general_purpose::STANDARD
            .decode(key_b64.trim())
            .map_err(|e| EtlError::fatal_error(format!("{} is not valid base64: {}", ENCRYPTION_KEY_ENV, e)))?;
        let salt = std::env::var(HASH_SALT_ENV)
            .map_err(|_| EtlError::fatal_error(format!("{} is not set", HASH_SALT_ENV)))?;

        Self::new(CipherAlgorithm::Aes256Gcm, &key, salt.into_bytes())
    }

    fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), EtlError> {
        match &self.cipher {
            CipherKind::Aes(cipher) => {
                let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
                let sealed = cipher
                    .encrypt(&nonce, plaintext)
                    .map_err(|e| EtlError::encryption_error(format!("AES-256-GCM encryption failed: {:?}", e)))?;
                Ok((nonce.to_vec(), sealed))
            }
            CipherKind::ChaCha(cipher) => {
                let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
                let sealed = cipher
                    .encrypt(&nonce, plaintext)
                    .map_err(|e| {
                        EtlError::encryption_error(format!("ChaCha20-Poly1305 encryption failed: {:?}", e))
                    })?;
                Ok((nonce.to_vec(), sealed))
            }
        }
    }

    fn open(&self, iv: &[u8], sealed: &[u8]) -> Result<Vec<u8>, EtlError> {
        match &self.cipher {
            CipherKind::Aes(cipher) => cipher
                .decrypt(Nonce::from_slice(iv), sealed)
                .map_err(|e| EtlError::encryption_error(format!("AES-256-GCM decryption failed: {:?}", e))),
            CipherKind::ChaCha(cipher) => cipher
                .decrypt(chacha20poly1305::Nonce::from_slice(iv), sealed)
                .map_err(|e| {
                    EtlError::encryption_error(format!("ChaCha20-Poly1305 decryption failed: {:?}", e))
                }),
        }
    }
}

impl EncryptionService for AeadEncryptionService {
    fn encrypt(&self, plaintext: &str) -> Result<String, EtlError> {
        let (iv, mut sealed) = self.seal(plaintext.as_bytes())?;

        // The AEAD crates append the tag to the ciphertext; the stored
        // layout wants iv || tag || ciphertext.
        if sealed.len() < TAG_LEN {
            return Err(EtlError::encryption_error("sealed output shorter than tag"));
        }
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let mut packed = Vec::with_capacity(IV_LEN + TAG_LEN + sealed.len());
        packed.extend_from_slice(&iv);
        packed.extend_from_slice(&tag);
        packed.extend_from_slice(&sealed);

        Ok(general_purpose::STANDARD.encode(packed))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, EtlError> {
        let packed = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|e| EtlError::encryption_error(format!("ciphertext is not valid base64: {}", e)))?;

        if packed.len() < IV_LEN + TAG_LEN {
            return Err(EtlError::encryption_error(format!(
                "ciphertext too short: {} bytes",
                packed.len()
            )));
        }

        let iv = &packed[..IV_LEN];
        let tag = &packed[IV_LEN..IV_LEN + TAG_LEN];
        let body = &packed[IV_LEN + TAG_LEN..];

        let mut sealed = Vec::with_capacity(body.len() + TAG_LEN);
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(tag);

        let plaintext = self.open(iv, &sealed)?;
        String::from_utf8(plaintext)
            .map_err(|e| EtlError::encryption_error(format!("decrypted payload is not UTF-8: {}", e)))
    }

    fn hash(&self, plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.hash_salt);
        hasher.update(plaintext.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(algorithm: CipherAlgorithm) -> AeadEncryptionService {
        AeadEncryptionService::new(algorithm, &[7u8; 32], b"pepper".to_vec()).unwrap()
    }

    #[test]
    fn test_round_trip_aes() {
        let service = service(CipherAlgorithm::Aes256Gcm);
        let ciphertext = service.encrypt("SL12345678").unwrap();
        assert_eq!(service.decrypt(&ciphertext).unwrap(), "SL12345678");
    }

    #[test]
    fn test_round_trip_chacha() {
        let service = service(CipherAlgorithm::ChaCha20Poly1305);
        let ciphertext = service.encrypt("+23276123456").unwrap();
        assert_eq!(service.decrypt(&ciphertext).unwrap(), "+23276123456");
    }

    #[test]
    fn test_fresh_iv_per_message() {
        let service = service(CipherAlgorithm::Aes256Gcm);
        let a = service.encrypt("same").unwrap();
        let b = service.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_stable_and_salted() {
        let a = service(CipherAlgorithm::Aes256Gcm);
        let b = service(CipherAlgorithm::Aes256Gcm);
        assert_eq!(a.hash("SL12345678"), b.hash("SL12345678"));
        assert_ne!(a.hash("SL12345678"), a.hash("SL12345679"));

        let other_salt =
            AeadEncryptionService::new(CipherAlgorithm::Aes256Gcm, &[7u8; 32], b"other".to_vec())
                .unwrap();
        assert_ne!(a.hash("SL12345678"), other_salt.hash("SL12345678"));
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let service = service(CipherAlgorithm::Aes256Gcm);
        let ciphertext = service.encrypt("secret").unwrap();
        let mut packed = general_purpose::STANDARD.decode(&ciphertext).unwrap();
        let last = packed.len() - 1;
        packed[last] ^= 0x01;
        let tampered = general_purpose::STANDARD.encode(packed);
        assert!(service.decrypt(&tampered).is_err());
    }

    #[test]
    fn test_short_key_is_fatal() {
        let result = AeadEncryptionService::new(CipherAlgorithm::Aes256Gcm, &[0u8; 16], vec![]);
        assert!(matches!(result, Err(EtlError::FatalError(_))));
    }
}
