//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync engines
//! depend on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteLister`] - Paged metadata listing and change feed (Google Drive)
//! - [`ICredentialVault`] - Encrypt/decrypt of stored account secrets
//! - [`IMirrorStore`] - Durable accounts and mirrored file rows

pub mod credential_vault;
pub mod mirror_store;
pub mod remote_lister;

pub use credential_vault::ICredentialVault;
pub use mirror_store::IMirrorStore;
pub use remote_lister::{
    AccountCredentials, ChangePage, ErrorClass, FilePage, IRemoteLister, ListScope, RemoteChange,
    RemoteFile,
};
