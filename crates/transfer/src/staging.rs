//! Access to completed resumable uploads awaiting placement.
//!
//! The resumable-upload transport accumulates bytes and metadata in a
//! staging area outside this crate's control. [`StagedUploads`] is the
//! narrow capability the placement engine consumes: read the declared
//! metadata, open the bytes, move them fast when the volume allows it,
//! and delete the leftovers. [`DiskStaging`] is the filesystem-backed
//! implementation used in production and tests.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::PlaceError;

/// Metadata key for the declared destination directory.
pub const META_TARGET_PATH: &str = "targetPath";
/// Metadata key for the original file name.
pub const META_FILE_NAME: &str = "fileName";
/// Metadata key linking an upload to a transfer batch.
pub const META_BATCH_ID: &str = "batchId";
/// Metadata key for the declared content type.
pub const META_CONTENT_TYPE: &str = "contentType";

/// Error from the fast same-volume move of staged bytes.
#[derive(Debug, thiserror::Error)]
pub enum StageMoveError {
    /// The staging backend cannot move files in place (different volume,
    /// remote store, or moves disabled); callers fall back to a copy.
    #[error("fast move not supported")]
    Unsupported,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Declared metadata and size of one completed staged upload.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedUploadInfo {
    upload_id: String,
    metadata: HashMap<String, String>,
    size_bytes: u64,
}

impl StagedUploadInfo {
    pub fn new(upload_id: &str, metadata: HashMap<String, String>, size_bytes: u64) -> Self {
        Self {
            upload_id: upload_id.to_string(),
            metadata,
            size_bytes,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Declared destination directory, relative to the upload root.
    pub fn target_path(&self) -> Result<&str, PlaceError> {
        self.required(META_TARGET_PATH)
    }

    /// Declared original file name.
    pub fn file_name(&self) -> Result<&str, PlaceError> {
        self.required(META_FILE_NAME)
    }

    /// Batch this upload belongs to, if any.
    pub fn batch_id(&self) -> Result<Option<Uuid>, PlaceError> {
        let Some(raw) = self.optional(META_BATCH_ID) else {
            return Ok(None);
        };

        Uuid::parse_str(raw).map(Some).map_err(|_| {
            PlaceError::Metadata(format!("{META_BATCH_ID} metadata is not a valid id: {raw}"))
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.optional(META_CONTENT_TYPE)
    }

    fn required(&self, key: &str) -> Result<&str, PlaceError> {
        self.optional(key)
            .ok_or_else(|| PlaceError::Metadata(format!("{key} metadata is required")))
    }

    fn optional(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Capability interface over the staging area.
///
/// Implementations must be shareable across request contexts; all
/// methods take `&self`.
pub trait StagedUploads: Send + Sync {
    /// Metadata and size of a completed upload.
    fn info(&self, upload_id: &str) -> Result<StagedUploadInfo, PlaceError>;

    /// Opens the accumulated bytes for reading.
    fn open(&self, upload_id: &str) -> Result<Box<dyn Read + Send>, PlaceError>;

    /// Moves the accumulated bytes to `destination` in one fast
    /// same-volume operation, without overwriting an existing file.
    fn move_to(&self, upload_id: &str, destination: &Path) -> Result<(), StageMoveError>;

    /// Removes the upload's transient artifacts. Missing artifacts are
    /// not an error.
    fn delete(&self, upload_id: &str) -> Result<(), PlaceError>;
}

/// Filesystem staging area: `<root>/<id>` holds the bytes and
/// `<root>/<id>.meta.json` the metadata document.
pub struct DiskStaging {
    root: PathBuf,
    fast_move: bool,
}

impl DiskStaging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            fast_move: true,
        }
    }

    /// Disables the fast-move path so every placement takes the
    /// stream-copy fallback. Mirrors staging backends without rename
    /// support and exercises the fallback in tests.
    pub fn without_fast_move(mut self) -> Self {
        self.fast_move = false;
        self
    }

    /// Writes a completed upload into the staging area.
    ///
    /// Stands in for the out-of-scope transport, which accumulates
    /// chunks into the same layout before declaring the upload complete.
    pub fn stage(
        &self,
        upload_id: &str,
        metadata: HashMap<String, String>,
        reader: &mut dyn Read,
    ) -> Result<StagedUploadInfo, PlaceError> {
        validate_upload_id(upload_id)?;
        fs::create_dir_all(&self.root)?;

        let mut data = fs::File::create(self.data_path(upload_id))?;
        let size_bytes = io::copy(reader, &mut data)?;

        let document = serde_json::to_vec(&metadata)
            .map_err(|err| PlaceError::Metadata(err.to_string()))?;
        fs::write(self.meta_path(upload_id), document)?;

        Ok(StagedUploadInfo::new(upload_id, metadata, size_bytes))
    }

    fn data_path(&self, upload_id: &str) -> PathBuf {
        self.root.join(upload_id)
    }

    fn meta_path(&self, upload_id: &str) -> PathBuf {
        self.root.join(format!("{upload_id}.meta.json"))
    }
}

impl StagedUploads for DiskStaging {
    fn info(&self, upload_id: &str) -> Result<StagedUploadInfo, PlaceError> {
        validate_upload_id(upload_id)?;

        let document = match fs::read(self.meta_path(upload_id)) {
            Ok(document) => document,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PlaceError::StagedMissing(upload_id.to_string()));
            }
            Err(err) => return Err(PlaceError::Io(err)),
        };

        let metadata: HashMap<String, String> = serde_json::from_slice(&document)
            .map_err(|err| PlaceError::Metadata(err.to_string()))?;

        let size_bytes = match fs::metadata(self.data_path(upload_id)) {
            Ok(stat) => stat.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PlaceError::StagedMissing(upload_id.to_string()));
            }
            Err(err) => return Err(PlaceError::Io(err)),
        };

        Ok(StagedUploadInfo::new(upload_id, metadata, size_bytes))
    }

    fn open(&self, upload_id: &str) -> Result<Box<dyn Read + Send>, PlaceError> {
        validate_upload_id(upload_id)?;

        match fs::File::open(self.data_path(upload_id)) {
            Ok(file) => Ok(Box::new(file)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(PlaceError::StagedMissing(upload_id.to_string()))
            }
            Err(err) => Err(PlaceError::Io(err)),
        }
    }

    fn move_to(&self, upload_id: &str, destination: &Path) -> Result<(), StageMoveError> {
        if !self.fast_move {
            return Err(StageMoveError::Unsupported);
        }

        if validate_upload_id(upload_id).is_err() {
            return Err(StageMoveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("invalid upload id: {upload_id}"),
            )));
        }

        // `rename` replaces existing files on Unix; refuse up front so a
        // collision surfaces instead of clobbering a placed file.
        if destination.exists() {
            return Err(StageMoveError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("destination already exists: {}", destination.display()),
            )));
        }

        fs::rename(self.data_path(upload_id), destination)?;
        Ok(())
    }

    fn delete(&self, upload_id: &str) -> Result<(), PlaceError> {
        validate_upload_id(upload_id)?;

        for path in [self.data_path(upload_id), self.meta_path(upload_id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(PlaceError::Io(err)),
            }
        }
        Ok(())
    }
}

/// Upload ids become staging file names; anything that is not a bare
/// file name is refused outright.
fn validate_upload_id(upload_id: &str) -> Result<(), PlaceError> {
    let trimmed = upload_id.trim();
    if trimmed.is_empty() {
        return Err(PlaceError::Metadata("upload id is empty".into()));
    }

    match Path::new(trimmed).file_name() {
        Some(name) if name == trimmed => Ok(()),
        _ => Err(PlaceError::Metadata(format!(
            "upload id is not a bare name: {upload_id}"
        ))),
    }
}
