//! Domain entities and business logic
//!
//! This module contains the core domain types for DriveMirror:
//! - Newtypes for account keys, remote ids and change-feed cursors
//! - The Account entity and its status state machine
//! - Mirrored file metadata records
//! - Sync attempt kinds
//! - Domain-specific error types

pub mod account;
pub mod attempt;
pub mod errors;
pub mod file_record;
pub mod newtypes;

// Re-export commonly used types
pub use account::{Account, AccountStatus, AuthType};
pub use attempt::AttemptKind;
pub use errors::DomainError;
pub use file_record::{FileRecord, FOLDER_MIME_TYPE, SHORTCUT_MIME_TYPE};
pub use newtypes::*;
