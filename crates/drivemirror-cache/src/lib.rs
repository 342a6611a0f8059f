//! DriveMirror Cache - Mirror store persistence
//!
//! SQLite-based storage for:
//! - Accounts (auth type, sealed secret, status, sync cursor)
//! - Mirrored file metadata, keyed by (file id, account key)
//!
//! ## Architecture
//!
//! This crate implements the `IMirrorStore` port from `drivemirror-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteMirrorStore`] - Full `IMirrorStore` implementation
//! - [`CacheError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use drivemirror_cache::{DatabasePool, SqliteMirrorStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/drivemirror/mirror.db")).await?;
//! let store = SqliteMirrorStore::new(pool.pool().clone());
//! // Use store as IMirrorStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod store;

pub use pool::DatabasePool;
pub use store::SqliteMirrorStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be turned back into a domain type
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Inserting an account whose key is already taken
    #[error("Account already exists: {0}")]
    DuplicateAccount(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
