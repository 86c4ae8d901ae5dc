//! Blob store backends for the siphon pipeline.
//!
//! The [`BlobStore`] trait abstracts the destination object store. Two
//! backends exist: a local filesystem store (always available, used heavily
//! in tests) and an S3 store behind the `storage-s3` feature. Backends are
//! constructed once via [`create_store`] and shared as `Arc<dyn BlobStore>`.
//!
//! **Blob path format:** `{server_folder}/{file_type}/{filename}`, with an
//! epoch segment inserted before the filename when a same-named object with
//! different content already exists.

mod factory;
mod local;
#[cfg(feature = "storage-s3")]
mod s3;
mod traits;

pub use factory::create_store;
pub use local::LocalBlobStore;
#[cfg(feature = "storage-s3")]
pub use s3::S3BlobStore;
pub use traits::{BlobStore, ObjectMeta, StoreError, StoreResult};
