//! DriveMirror Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Account` (with its status state machine), `FileRecord`
//! - **Port definitions** - Traits for adapters: `IRemoteLister`, `ICredentialVault`, `IMirrorStore`
//! - **Configuration** - The YAML configuration shared by the daemon and the CLI
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement, and the
//! sync crate drives the domain through those ports.

pub mod config;
pub mod domain;
pub mod ports;
