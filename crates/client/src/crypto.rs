// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encryption boundary for persisted session values.
//!
//! Values are serialized to JSON and sealed with AES-256-GCM under a key
//! derived once from the configured secret (PBKDF2-HMAC-SHA256). Each call
//! draws a fresh 96-bit nonce which is prepended to the sealed bytes; the
//! result is base64 encoded so it can live in a string-valued store.

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CryptoError;

/// Minimum secret length in bytes.
pub const MIN_KEY_LEN: usize = 32;

const PBKDF2_ROUNDS: u32 = 100_000;
const PBKDF2_ITERATIONS: NonZeroU32 = NonZeroU32::MIN.saturating_add(PBKDF2_ROUNDS - 1);
const PBKDF2_SALT: &[u8] = b"AdminPlus-Salt";

/// Authenticated symmetric cipher for session values.
pub struct Cipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

impl Cipher {
    /// Derive the cipher key from `secret`.
    ///
    /// A missing secret or one shorter than [`MIN_KEY_LEN`] bytes is rejected.
    pub fn new(secret: Option<&str>) -> Result<Self, CryptoError> {
        let secret = secret
            .filter(|s| s.len() >= MIN_KEY_LEN)
            .ok_or(CryptoError::InvalidKey { min: MIN_KEY_LEN })?;

        let mut derived = [0u8; 32];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            PBKDF2_ITERATIONS,
            PBKDF2_SALT,
            secret.as_bytes(),
            &mut derived,
        );
        let unbound = UnboundKey::new(&AES_256_GCM, &derived)
            .map_err(|_| CryptoError::InvalidKey { min: MIN_KEY_LEN })?;

        Ok(Self { key: LessSafeKey::new(unbound), rng: SystemRandom::new() })
    }

    /// Serialize and seal `value`, returning `base64(nonce || ciphertext || tag)`.
    pub fn encrypt<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, CryptoError> {
        let mut in_out =
            serde_json::to_vec(value).map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| CryptoError::Encrypt("nonce generation".into()))?;

        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::Encrypt("seal".into()))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + in_out.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&in_out);
        Ok(STANDARD.encode(combined))
    }

    /// Open and deserialize a value produced by [`Cipher::encrypt`].
    pub fn decrypt<T: DeserializeOwned>(&self, ciphertext: &str) -> Result<T, CryptoError> {
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CryptoError::Decrypt("malformed base64".into()))?;

        if bytes.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CryptoError::Decrypt("ciphertext too short".into()));
        }

        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce)
            .map_err(|_| CryptoError::Decrypt("bad nonce".into()))?;

        let mut buf = sealed.to_vec();
        let plain = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| CryptoError::Decrypt("authentication failed".into()))?;

        serde_json::from_slice(plain).map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
