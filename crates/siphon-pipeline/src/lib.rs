//! The siphon ingestion pipeline.
//!
//! Source entries are partitioned round-robin into batches; batches run
//! under a bounded worker pool, each with a wall-clock timeout. Within a
//! batch each entry is fetched, expanded if it is a zip container, uploaded
//! with duplicate detection, and its staging files reclaimed. Per-entry
//! failures are absorbed and counted; one bad file never sinks a batch, and
//! one bad batch never sinks the run.

pub mod cleanup;
pub mod expand;
pub mod handler;
pub mod scheduler;
pub mod upload;

pub use cleanup::cleanup_path;
pub use expand::{expand_container, extraction_dir, is_container, ArchiveMember, ExpandError};
pub use handler::{EntryHandler, EntryStats};
pub use scheduler::{
    partition_batches, run_ingest, run_ingest_with_handler, BatchOutcome, IngestReport,
};
pub use upload::{StagedFile, UploadError, UploadOutcome, Uploader};
