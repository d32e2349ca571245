//! Clinic File Storage
//!
//! Upload storage for patient images and documents.
//!
//! ## Design Principles
//!
//! - Binary bytes live on disk, their metadata lives in the database
//! - Files are immutable once stored (new content creates a new file)
//! - Each clinic owns one bucket; nothing is shared across tenants
//! - Identical uploads within a bucket are stored once
//!
//! ## Bucket Storage Model
//!
//! ```text
//! <storage_root>/
//! └── <bucket>/              # one per clinic (32 hex chars)
//!     └── sha256/
//!         └── ab/
//!             └── cd/
//!                 └── abcd3f9e…
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use clinic_files::FilesService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = FilesService::open(Path::new("storage"), "550e8400e29b41d4a716446655440000")?;
//! let metadata = service.add_bytes(b"\x89PNG\r\n\x1a\n", "xray.png")?;
//! let bytes = service.read(metadata.hash.as_str())?;
//! # Ok(())
//! # }
//! ```

mod constants;
mod files;

pub use constants::{HASH_FOLDER_NAME, MAX_FILENAME_CHARS};
pub use files::{FileMetadata, FilesService, Sha256Hash};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Bucket name is not a canonical identifier
    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),

    /// Hash argument is not a 64-character lowercase hex digest
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// Upload is empty
    #[error("File is empty")]
    Empty,

    /// Upload type is not one of the accepted image/document types
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// No file stored under the given hash
    #[error("File not found: {0}")]
    NotFound(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
