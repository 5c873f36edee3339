// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! At-rest encryption for secure details.
//!
//! A codec is handed to storage when it is constructed; nothing reads a
//! process-wide key.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

/// Codec errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// Key has the wrong length.
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    InvalidKey(usize),

    /// Key is not valid base64.
    #[error("encryption key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),

    /// Encryption failed.
    #[error("encryption failed")]
    Encrypt,

    /// Ciphertext is truncated, tampered with, or was sealed with another key.
    #[error("decryption failed")]
    Decrypt,
}

/// Seals and opens byte strings for storage.
pub trait Codec: Send + Sync {
    /// Encrypt `plaintext`.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decrypt bytes produced by [`Codec::encrypt`].
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Stores bytes as-is. For development only.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCodec;

impl Codec for NoopCodec {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(ciphertext.to_vec())
    }
}

/// AES-256-GCM with a random nonce prefixed to every ciphertext.
#[derive(Clone)]
pub struct AesGcmCodec {
    cipher: Aes256Gcm,
}

impl AesGcmCodec {
    /// Create a codec from a raw 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CodecError> {
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CodecError::InvalidKey(key.len()))?;
        Ok(Self { cipher })
    }

    /// Create a codec from a base64-encoded 32-byte key.
    pub fn from_base64(key: &str) -> Result<Self, CodecError> {
        Self::new(&STANDARD.decode(key.trim())?)
    }
}

impl std::fmt::Debug for AesGcmCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCodec").finish_non_exhaustive()
    }
}

impl Codec for AesGcmCodec {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CodecError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CodecError::Decrypt);
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CodecError::Decrypt)
    }
}
