//! Transfer-batch coordination and sandboxed file placement.
//!
//! Clients deposit files into the upload root either directly (multi-file
//! upload in one request) or through resumable uploads that accumulate in
//! a staging area and complete out of order. A [`TransferBatch`] tracks
//! how many uploads are expected and which have arrived; finalizing it
//! assigns collision-free stored names and moves every arrived upload
//! into its destination, reporting success or failure per file.

mod batch;
mod ingest;
mod naming;
mod placer;
mod staging;
mod store;
mod types;

pub use batch::{BatchStatus, CompletedUpload, FinalizePlanItem, TransferBatch};
pub use ingest::{DirectUploadFile, IngestService};
pub use naming::{StoredNamePolicy, existing_file_names};
pub use placer::FilePlacer;
pub use staging::{
    DiskStaging, META_BATCH_ID, META_CONTENT_TYPE, META_FILE_NAME, META_TARGET_PATH,
    StageMoveError, StagedUploadInfo, StagedUploads,
};
pub use store::{BatchStore, spawn_expiry_sweeper};
pub use types::{
    BatchSnapshot, CreatedBatch, FailedFile, JobStatus, SavedFile, UploadRecord, UploadReport,
    UploadSummary,
};

use uuid::Uuid;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("transfer batch not found: {0}")]
    NotFound(Uuid),

    #[error("batch is no longer collecting")]
    InvalidBatchState,

    #[error("upload already registered: {0}")]
    DuplicateUpload(String),

    #[error("batch has no completed uploads")]
    EmptyBatch,

    #[error("invalid finalize results: {0}")]
    InvalidResults(String),

    #[error("placement failed: {0}")]
    Placement(#[from] PlaceError),
}

/// Errors produced while placing upload bytes at their destination.
///
/// Surfaced uninterpreted so batch finalization can record them as
/// per-file failures instead of aborting the remaining files.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    #[error("staged upload not found: {0}")]
    StagedMissing(String),

    #[error("destination already exists: {0}")]
    DestinationExists(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid upload metadata: {0}")]
    Metadata(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<filedrop_storage::StorageError> for PlaceError {
    fn from(err: filedrop_storage::StorageError) -> Self {
        match err {
            filedrop_storage::StorageError::InvalidPath(message) => Self::InvalidPath(message),
            filedrop_storage::StorageError::Io(io) => Self::Io(io),
        }
    }
}

impl From<filedrop_storage::StorageError> for TransferError {
    fn from(err: filedrop_storage::StorageError) -> Self {
        match err {
            filedrop_storage::StorageError::InvalidPath(message) => Self::InvalidPath(message),
            filedrop_storage::StorageError::Io(io) => Self::Placement(PlaceError::Io(io)),
        }
    }
}
