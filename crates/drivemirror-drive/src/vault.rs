//! Credential vault: AES-256-GCM secret box
//!
//! Account secrets are sealed before they reach the mirror store. A sealed
//! blob is `v1:` followed by base64(nonce || ciphertext) with a fresh
//! 12-byte random nonce per call.
//!
//! The 32-byte key is the SHA-256 of a passphrase taken from the
//! environment variable named by `vault.key_env`, or, when that is unset,
//! from the system keyring (a random passphrase is generated and stored on
//! first use).

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use drivemirror_core::{config::VaultConfig, ports::ICredentialVault};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

/// Version prefix of sealed blobs
const BLOB_PREFIX: &str = "v1:";

/// Domain-separation salt mixed into the key derivation
const KEY_SALT: &[u8] = b"drivemirror.vault.v1";

/// Nonce size for AES-GCM (96 bits / 12 bytes)
const NONCE_SIZE: usize = 12;

/// Bytes of randomness in a generated keyring passphrase
const GENERATED_PASSPHRASE_BYTES: usize = 32;

/// Vault errors
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Invalid sealed secret: {0}")]
    InvalidFormat(String),
}

/// Symmetric secret box
pub struct SecretBox {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

impl SecretBox {
    /// Derives the key from a passphrase
    pub fn from_passphrase(passphrase: &str) -> Result<Self, VaultError> {
        if passphrase.is_empty() {
            return Err(VaultError::KeyUnavailable(
                "passphrase must not be empty".to_string(),
            ));
        }
        let mut hasher = Sha256::new();
        hasher.update(KEY_SALT);
        hasher.update(passphrase.as_bytes());
        let key: [u8; 32] = hasher.finalize().into();
        Ok(Self {
            cipher: Aes256Gcm::new(&key.into()),
        })
    }

    /// Loads the passphrase from the environment or the system keyring
    pub fn from_config(config: &VaultConfig) -> Result<Self, VaultError> {
        if let Ok(passphrase) = std::env::var(&config.key_env) {
            if !passphrase.is_empty() {
                debug!(key_env = %config.key_env, "Vault key taken from environment");
                return Self::from_passphrase(&passphrase);
            }
        }

        let passphrase = keyring_passphrase(&config.keyring_service, &config.keyring_user)?;
        Self::from_passphrase(&passphrase)
    }

    /// Seals `plaintext`
    pub fn seal(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(format!("AES-GCM encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(format!("{BLOB_PREFIX}{}", BASE64.encode(&combined)))
    }

    /// Opens a blob produced by [`SecretBox::seal`]
    pub fn open(&self, blob: &str) -> Result<String, VaultError> {
        let encoded = blob
            .strip_prefix(BLOB_PREFIX)
            .ok_or_else(|| VaultError::InvalidFormat("missing version prefix".to_string()))?;

        let combined = BASE64
            .decode(encoded)
            .map_err(|e| VaultError::InvalidFormat(format!("invalid base64 encoding: {e}")))?;

        if combined.len() <= NONCE_SIZE {
            return Err(VaultError::InvalidFormat(format!(
                "sealed data too short: {} bytes",
                combined.len()
            )));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                VaultError::Decryption("wrong key or corrupted data".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|e| VaultError::Decryption(format!("plaintext is not valid UTF-8: {e}")))
    }
}

impl ICredentialVault for SecretBox {
    fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        Ok(self.seal(plaintext)?)
    }

    fn decrypt(&self, blob: &str) -> anyhow::Result<String> {
        Ok(self.open(blob)?)
    }
}

/// Reads the vault passphrase from the keyring, creating it on first use
fn keyring_passphrase(service: &str, user: &str) -> Result<String, VaultError> {
    let entry = keyring::Entry::new(service, user)
        .map_err(|e| VaultError::KeyUnavailable(format!("keyring entry: {e}")))?;

    match entry.get_password() {
        Ok(passphrase) => {
            debug!(service, "Vault key loaded from keyring");
            Ok(passphrase)
        }
        Err(keyring::Error::NoEntry) => {
            let mut bytes = [0u8; GENERATED_PASSPHRASE_BYTES];
            OsRng.fill_bytes(&mut bytes);
            let passphrase = BASE64.encode(bytes);
            entry
                .set_password(&passphrase)
                .map_err(|e| VaultError::KeyUnavailable(format!("storing new key: {e}")))?;
            info!(service, "Generated new vault key in keyring");
            Ok(passphrase)
        }
        Err(e) => Err(VaultError::KeyUnavailable(format!("keyring read: {e}"))),
    }
}
