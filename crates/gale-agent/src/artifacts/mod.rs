//! Artifact packaging and transfer.
//!
//! Artifacts are shipped to the server as a deflate zip plus a text manifest
//! of `path=md5hex` lines; the server extracts the zip under the build's
//! artifact namespace and appends the manifest to the build's checksum file.

pub mod archive;
pub mod client;

pub use archive::{package, ArchiveEntry};
pub use client::ArtifactClient;

/// Artifact error types
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Rejected(String),
}
