//! Credential vault port (driven/secondary port)
//!
//! Seals account secrets before they are stored and opens them again when
//! an attempt needs to talk to the remote. Only the contract matters to
//! the engines; the cipher lives in the adapter.

/// Symmetric secret box
pub trait ICredentialVault: Send + Sync {
    /// Encrypts `plaintext` into an opaque, storable blob
    fn encrypt(&self, plaintext: &str) -> anyhow::Result<String>;

    /// Decrypts a blob produced by [`ICredentialVault::encrypt`]
    fn decrypt(&self, blob: &str) -> anyhow::Result<String>;
}
