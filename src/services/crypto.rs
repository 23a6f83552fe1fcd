// SPDX-License-Identifier: MIT
// Copyright 2026 Crosspost Contributors

//! Symmetric encryption for OAuth tokens at rest.
//!
//! XChaCha20-Poly1305 with a fresh random 24-byte nonce per encryption,
//! prepended to the ciphertext and base64 encoded. Two encryptions of the
//! same token therefore never produce the same ciphertext.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::error::AppError;

const NONCE_SIZE: usize = 24;

/// Token encryption service.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: XChaCha20Poly1305,
}

impl TokenCipher {
    /// Create a cipher from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, AppError> {
        let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| {
            AppError::Internal(anyhow::anyhow!("Token encryption key must be 32 bytes"))
        })?;
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext token. Returns base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AppError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Token encryption failed")))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(output))
    }

    /// Decrypt base64(nonce || ciphertext) back to the plaintext token.
    pub fn decrypt(&self, encoded: &str) -> Result<String, AppError> {
        let data = BASE64
            .decode(encoded)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Base64 decode failed: {}", e)))?;

        if data.len() < NONCE_SIZE {
            return Err(AppError::Internal(anyhow::anyhow!(
                "Ciphertext shorter than nonce"
            )));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Token decryption failed")))?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}

/// Helper to encrypt an access/refresh token pair before storing.
pub fn encrypt_token_pair(
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: Option<&str>,
) -> Result<(String, Option<String>), AppError> {
    let encrypted_access = cipher.encrypt(access_token)?;
    let encrypted_refresh = refresh_token.map(|t| cipher.encrypt(t)).transpose()?;
    Ok((encrypted_access, encrypted_refresh))
}
