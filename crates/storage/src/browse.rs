//! Read-only directory browser for the upload root.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::{StorageError, resolve};

/// A child directory inside the upload root.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Entry name (not a path).
    pub name: String,
    /// Root-relative path of the entry with `/` separators.
    pub relative_path: String,
}

/// Listing of one directory level inside the upload root.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    /// Root-relative path of the listed directory; empty at the root.
    pub current_path: String,
    /// Relative path one level up; absent at the root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    /// Child directories, sorted case-insensitively.
    pub directories: Vec<DirectoryEntry>,
}

/// Lists the immediate child directories of a sandboxed path.
///
/// Files are never returned. A resolved path that does not exist yet
/// yields an empty listing rather than an error, since destinations are
/// created lazily on first placement.
pub fn list_directories(root: &Path, requested: &str) -> Result<DirectoryListing, StorageError> {
    let resolved = resolve(root, requested)?;

    let mut names = Vec::new();
    if resolved.full_path().is_dir() {
        for entry in fs::read_dir(resolved.full_path())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
    }
    names.sort_by_key(|name| name.to_lowercase());

    let current_path = resolved.relative_path().to_string();
    let directories = names
        .into_iter()
        .map(|name| {
            let relative_path = if current_path.is_empty() {
                name.clone()
            } else {
                format!("{current_path}/{name}")
            };
            DirectoryEntry {
                name,
                relative_path,
            }
        })
        .collect();

    Ok(DirectoryListing {
        current_path,
        parent_path: resolved.parent_relative().map(str::to_string),
        directories,
    })
}
