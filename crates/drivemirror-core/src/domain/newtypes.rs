//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for account keys, remote identifiers and
//! change-feed cursors. Each newtype ensures data validity at construction
//! time so the rest of the crate can pass them around without re-checking.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Attempt identifier
// ============================================================================

/// Identifies a single crawl or incremental sync attempt in logs and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(Uuid);

impl AttemptId {
    /// Create a new random AttemptId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AttemptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Account key
// ============================================================================

/// Unique, immutable key of a mirrored account
///
/// For OAuth accounts this is the (lower-cased) email address, for
/// service-account shares it is the alias chosen at registration.
/// Allowed characters: ASCII alphanumerics and `. _ @ + -`, 1 to 254 chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountKey(String);

impl AccountKey {
    /// Maximum key length (matches the longest legal email address)
    pub const MAX_LEN: usize = 254;

    /// Create a new AccountKey
    ///
    /// # Errors
    /// Returns error if the key is empty, too long or has invalid characters
    pub fn new(key: String) -> Result<Self, DomainError> {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(DomainError::InvalidAccountKey(
                "Account key cannot be empty".to_string(),
            ));
        }
        if key.len() > Self::MAX_LEN {
            return Err(DomainError::InvalidAccountKey(format!(
                "Account key too long (max {} chars): {key}",
                Self::MAX_LEN
            )));
        }
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._@+-".contains(c))
        {
            return Err(DomainError::InvalidAccountKey(format!(
                "Account key contains invalid characters: {key}"
            )));
        }
        Ok(Self(key))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccountKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for AccountKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AccountKey> for String {
    fn from(key: AccountKey) -> Self {
        key.0
    }
}

impl From<Email> for AccountKey {
    fn from(email: Email) -> Self {
        // A validated email is always a valid key.
        Self(email.0)
    }
}

// ============================================================================
// Drive-specific types
// ============================================================================

/// Google Drive file or folder ID
///
/// Drive IDs are URL-safe strings, typically like
/// "1a2B3c4D5e6F7g8H9i0JkLmNoPqRsTuVw". The literal alias `root` is accepted
/// too since the API understands it for "My Drive".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Create a new FileId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains characters outside the
    /// URL-safe alphabet
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidFileId(
                "File ID cannot be empty".to_string(),
            ));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::InvalidFileId(format!(
                "File ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for FileId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

/// Drive change-feed cursor (the "page token" of the changes API)
///
/// Opaque: only checked for being non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncCursor(String);

impl SyncCursor {
    /// Create a new SyncCursor
    ///
    /// # Errors
    /// Returns error if the cursor is empty
    pub fn new(cursor: String) -> Result<Self, DomainError> {
        if cursor.trim().is_empty() {
            return Err(DomainError::InvalidSyncCursor(
                "Sync cursor cannot be empty".to_string(),
            ));
        }
        Ok(Self(cursor))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SyncCursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SyncCursor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for SyncCursor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<SyncCursor> for String {
    fn from(cursor: SyncCursor) -> Self {
        cursor.0
    }
}

// ============================================================================
// Email type
// ============================================================================

/// Validated, lower-cased email address
///
/// Basic structural validation only: exactly one `@`, a non-empty local
/// part, and a dotted domain whose labels don't start or end with `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Create a new validated Email
    ///
    /// # Errors
    /// Returns error if the email format is invalid
    pub fn new(email: String) -> Result<Self, DomainError> {
        let email = email.trim().to_lowercase();
        Self::validate(&email)?;
        Ok(Self(email))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(email: &str) -> Result<(), DomainError> {
        let invalid = |why: &str| DomainError::InvalidEmail(format!("{why}: {email}"));

        if email.len() > AccountKey::MAX_LEN {
            return Err(invalid("Email too long"));
        }
        let (local, domain) = email
            .split_once('@')
            .ok_or_else(|| invalid("Email must contain '@'"))?;

        if domain.contains('@') {
            return Err(invalid("Email must contain exactly one '@'"));
        }
        if local.is_empty() || local.len() > 64 {
            return Err(invalid("Email local part must be 1-64 chars"));
        }
        if !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || ".+-_".contains(c))
        {
            return Err(invalid("Email local part contains invalid characters"));
        }
        if !domain.contains('.') {
            return Err(invalid("Email domain must contain at least one dot"));
        }
        for label in domain.split('.') {
            if label.is_empty()
                || label.starts_with('-')
                || label.ends_with('-')
                || !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(invalid("Email domain has an invalid label"));
            }
        }
        Ok(())
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

// ============================================================================
// Tests
// ============================================================================
