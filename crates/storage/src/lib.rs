//! Sandboxed filesystem access for the upload root.
//!
//! Every caller-supplied path is resolved through [`resolve`] before any
//! read or write, confining all access to a single configured root
//! directory. Also provides upload-root bootstrapping and a read-only
//! directory browser built on the same policy.

mod browse;
mod policy;
mod root;

pub use browse::{DirectoryEntry, DirectoryListing, list_directories};
pub use policy::{ResolvedPath, resolve};
pub use root::prepare_upload_root;

/// Errors produced by sandboxed storage access.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
