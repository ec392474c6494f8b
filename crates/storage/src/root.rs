//! Upload root bootstrap.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::StorageError;

/// Prepares the upload root for service start.
///
/// Creates the directory if absent, probes writability with a uniquely
/// named temp file, and returns the canonicalized root. Failing here at
/// boot beats failing on the first upload.
pub fn prepare_upload_root(root: &Path) -> Result<PathBuf, StorageError> {
    if root.as_os_str().is_empty() {
        return Err(StorageError::InvalidPath(
            "upload root is not configured".into(),
        ));
    }

    fs::create_dir_all(root)?;
    let canonical = fs::canonicalize(root)?;

    let probe = canonical.join(format!(".write-test-{}.tmp", Uuid::new_v4().simple()));
    fs::File::create(&probe)?;
    fs::remove_file(&probe)?;

    tracing::info!(root = %canonical.display(), "upload root ready");
    Ok(canonical)
}
