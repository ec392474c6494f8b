//! Moves completed staged uploads into their sandboxed destination.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::PlaceError;
use crate::staging::{StageMoveError, StagedUploads};

/// Places a staged upload's bytes at its final location.
///
/// Prefers the staging backend's fast same-volume move and falls back to
/// an exclusive-create stream copy when the move is unsupported or fails
/// for an environment reason. A destination collision is surfaced, never
/// overwritten. Stored names are pre-reserved, so a collision occurring at all
/// means something raced outside the naming policy.
pub struct FilePlacer {
    upload_root: PathBuf,
    staged: Arc<dyn StagedUploads>,
}

impl FilePlacer {
    pub fn new(upload_root: impl Into<PathBuf>, staged: Arc<dyn StagedUploads>) -> Self {
        Self {
            upload_root: upload_root.into(),
            staged,
        }
    }

    /// Moves the upload's bytes to `<target_relative_path>/<stored_file_name>`
    /// under the upload root, returning the placed file's root-relative path.
    pub fn place(
        &self,
        upload_id: &str,
        target_relative_path: &str,
        stored_file_name: &str,
    ) -> Result<String, PlaceError> {
        let resolved = filedrop_storage::resolve(&self.upload_root, target_relative_path)?;
        fs::create_dir_all(resolved.full_path())?;

        let safe_name = sanitize_stored_name(stored_file_name)?;
        let destination = resolved.full_path().join(&safe_name);

        match self.staged.move_to(upload_id, &destination) {
            Ok(()) => {
                // The bytes moved; whatever metadata artifacts remain are
                // best-effort cleanup.
                if let Err(err) = self.staged.delete(upload_id) {
                    tracing::warn!(upload_id, "failed to clean staging artifacts: {err}");
                }
            }
            Err(StageMoveError::Unsupported) => {
                self.copy_fallback(upload_id, &destination)?;
            }
            Err(StageMoveError::Io(err)) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PlaceError::DestinationExists(safe_name));
            }
            Err(StageMoveError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                return Err(PlaceError::StagedMissing(upload_id.to_string()));
            }
            Err(StageMoveError::Io(err)) => {
                // Cross-device links and permission quirks land here; the
                // copy path settles whether the destination is writable.
                tracing::debug!(upload_id, "fast move failed, falling back to copy: {err}");
                self.copy_fallback(upload_id, &destination)?;
            }
        }

        Ok(if resolved.relative_path().is_empty() {
            safe_name
        } else {
            format!("{}/{}", resolved.relative_path(), safe_name)
        })
    }

    /// Stream-copies the staged bytes into an exclusively created
    /// destination, then deletes the transient artifacts best-effort.
    fn copy_fallback(&self, upload_id: &str, destination: &Path) -> Result<(), PlaceError> {
        let mut source = self.staged.open(upload_id)?;

        let mut dest_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|err| {
                if err.kind() == io::ErrorKind::AlreadyExists {
                    PlaceError::DestinationExists(destination.display().to_string())
                } else {
                    PlaceError::Io(err)
                }
            })?;

        io::copy(&mut source, &mut dest_file)?;

        // The destination is authoritative from here on; an orphaned
        // staging artifact costs disk, not correctness.
        if let Err(err) = self.staged.delete(upload_id) {
            tracing::warn!(upload_id, "failed to delete staged upload after copy: {err}");
        }

        Ok(())
    }
}

/// Reduces a stored name to its bare file-name component.
///
/// Stored names come from the naming policy and are already bare; this
/// guards the write against a crafted name reaching it anyway.
fn sanitize_stored_name(stored_file_name: &str) -> Result<String, PlaceError> {
    Path::new(stored_file_name.trim())
        .file_name()
        .map(|name| name.to_string_lossy().trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| PlaceError::InvalidPath(format!("invalid stored file name: {stored_file_name}")))
}
