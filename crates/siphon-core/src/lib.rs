//! Core types for the siphon ingestion pipeline.
//!
//! This crate holds the pieces every other crate needs: server identity and
//! filename normalization, environment-driven configuration, and the source
//! list model that maps server URLs to remote paths.

pub mod config;
pub mod identity;
pub mod sources;

pub use config::{Config, StorageBackend};
pub use identity::{file_type_of, sanitize_file_name, IdentityError, Protocol, ServerUrl};
pub use sources::{SourceEntry, SourceList};
