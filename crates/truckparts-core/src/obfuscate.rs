//! At-rest obfuscation of the cached user profile.
//!
//! The key is derived from a passphrase compiled into the client, so anyone
//! holding the binary can decrypt the blob. This keeps the profile out of
//! casual view in `storage.json`; it is not a confidentiality boundary.
//!
//! Blob layout: base64(nonce[12] || AES-256-GCM ciphertext+tag).

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Passphrase shipped with the client.
const EMBEDDED_PASSPHRASE: &str = "truckparts-profile-cache-v1";

/// Nonce size for AES-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

#[derive(Clone)]
pub struct ProfileCipher {
    cipher: Aes256Gcm,
}

impl ProfileCipher {
    /// Cipher keyed by SHA-256 of `passphrase`.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let key = Sha256::digest(passphrase.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Cipher keyed by the passphrase embedded in the client.
    pub fn embedded() -> Self {
        Self::from_passphrase(EMBEDDED_PASSPHRASE)
    }

    /// Serializes `value` to JSON and seals it.
    ///
    /// # Errors
    /// Returns an error if serialization or encryption fails.
    pub fn seal_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(value).context("Failed to serialize profile")?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| anyhow!("Failed to encrypt profile: {e}"))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Opens a blob produced by [`seal_json`](Self::seal_json).
    ///
    /// # Errors
    /// Returns an error if the blob is not base64, was tampered with, was
    /// sealed under another key, or does not decode as `T`.
    pub fn open_json<T: DeserializeOwned>(&self, blob: &str) -> Result<T> {
        let bytes = STANDARD
            .decode(blob.trim())
            .context("Profile blob is not valid base64")?;
        if bytes.len() < NONCE_SIZE {
            anyhow::bail!("Profile blob too short (missing nonce)");
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| anyhow!("Failed to decrypt profile: {e}"))?;

        serde_json::from_slice(&plaintext).context("Decrypted profile is not valid JSON")
    }
}

impl std::fmt::Debug for ProfileCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCipher").finish_non_exhaustive()
    }
}
