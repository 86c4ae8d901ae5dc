//! Protocol fetchers for the siphon pipeline.
//!
//! A [`ProtocolFetcher`] downloads one remote file into the local staging
//! area. Both implementations stat the remote file first, verify the staged
//! byte count against the advertised size, and restore the remote
//! modification time on the local copy. A failed size check removes the
//! partial file before returning.
//!
//! The underlying clients (`suppaftp`, `ssh2`) are blocking, so each fetch
//! runs inside `spawn_blocking`.

mod ftp;
mod sftp;
mod traits;

pub use ftp::FtpFetcher;
pub use sftp::SftpFetcher;
pub use traits::{
    resolve_fetcher, staging_location, FetchError, FetchResult, ProtocolFetcher, StagingLocation,
};
