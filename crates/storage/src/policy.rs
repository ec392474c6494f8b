//! Sandbox path policy.
//!
//! Resolves caller-supplied relative paths against the configured upload
//! root and rejects anything that would land outside it.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::StorageError;

/// A validated location inside the upload root.
///
/// Can only be produced by [`resolve`], so holding one is proof the path
/// is the root itself or a descendant of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    full_path: PathBuf,
    relative_path: String,
    parent_relative: Option<String>,
}

impl ResolvedPath {
    /// Absolute, filesystem-native path.
    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    /// Root-relative path with `/` separators; empty at the root.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Relative path one level up.
    ///
    /// `None` at the root; `Some("")` when the parent is the root.
    pub fn parent_relative(&self) -> Option<&str> {
        self.parent_relative.as_deref()
    }
}

/// Resolves `requested` against `root`, confining the result to the root.
///
/// Empty, whitespace-only and `"."` requests resolve to the root itself.
/// Backslash separators are accepted and normalized. Rooted input, `..`
/// traversal above the root, and symlinks pointing outside the root are
/// all rejected with [`StorageError::InvalidPath`].
pub fn resolve(root: &Path, requested: &str) -> Result<ResolvedPath, StorageError> {
    if root.as_os_str().is_empty() || root.to_string_lossy().trim().is_empty() {
        return Err(StorageError::InvalidPath(
            "upload root is not configured".into(),
        ));
    }

    let canonical_root = canonical_base(root)?;
    let relative = normalize_request(requested)?;

    let mut full_path = normalize_lexically(&canonical_root.join(relative));
    // Resolve symlinked segments when the target already exists so a link
    // inside the root cannot smuggle access outside it.
    if full_path.exists() {
        full_path = fs::canonicalize(&full_path)?;
    }

    // `Path::starts_with` compares whole components, so the root itself
    // passes and a sibling like `files-private` under root `files` fails.
    if !full_path.starts_with(&canonical_root) {
        return Err(StorageError::InvalidPath(format!(
            "path escapes the upload root: {requested}"
        )));
    }

    let relative_path = relative_string(&full_path, &canonical_root)?;
    let parent_relative = parent_relative(&relative_path);

    Ok(ResolvedPath {
        full_path,
        relative_path,
        parent_relative,
    })
}

/// Absolutizes and canonicalizes the root itself.
fn canonical_base(root: &Path) -> Result<PathBuf, StorageError> {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()?.join(root)
    };

    let normalized = normalize_lexically(&absolute);
    if normalized.exists() {
        Ok(fs::canonicalize(&normalized)?)
    } else {
        Ok(normalized)
    }
}

/// Normalizes a requested relative path and rejects rooted input.
fn normalize_request(requested: &str) -> Result<PathBuf, StorageError> {
    let trimmed = requested.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Ok(PathBuf::new());
    }

    let normalized = trimmed.replace('\\', "/");
    for component in Path::new(&normalized).components() {
        if matches!(component, Component::RootDir | Component::Prefix(_)) {
            return Err(StorageError::InvalidPath(format!(
                "only relative paths are allowed: {requested}"
            )));
        }
    }

    Ok(PathBuf::from(normalized))
}

/// Resolves `.` and `..` components lexically, clamping at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut components = path.components().peekable();
    let mut out = if let Some(component @ Component::Prefix(..)) = components.peek().copied() {
        components.next();
        PathBuf::from(component.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => {}
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }

    out
}

/// Root-relative path as a `/`-joined string; empty when `full` is the root.
fn relative_string(full: &Path, root: &Path) -> Result<String, StorageError> {
    let relative = full.strip_prefix(root).map_err(|_| {
        StorageError::InvalidPath(format!("path escapes the upload root: {}", full.display()))
    })?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    Ok(parts.join("/"))
}

fn parent_relative(relative: &str) -> Option<String> {
    if relative.is_empty() {
        return None;
    }

    match relative.rfind('/') {
        Some(index) => Some(relative[..index].to_string()),
        None => Some(String::new()),
    }
}
