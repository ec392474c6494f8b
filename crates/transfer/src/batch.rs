//! Transfer batch entity and its finalize state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::TransferError;
use crate::naming::StoredNamePolicy;
use crate::types::UploadRecord;

/// Lifecycle status of a transfer batch.
///
/// `Collecting` is the only non-terminal state; finalize moves a batch to
/// exactly one of the other three, after which it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Collecting,
    Completed,
    PartiallyCompleted,
    Failed,
}

/// One resumable upload that finished and was registered into a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedUpload {
    upload_id: String,
    original_file_name: String,
    size_bytes: u64,
    content_type: Option<String>,
    completed_at: DateTime<Utc>,
}

impl CompletedUpload {
    pub fn new(
        upload_id: &str,
        original_file_name: &str,
        size_bytes: u64,
        content_type: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<Self, TransferError> {
        if upload_id.trim().is_empty() {
            return Err(TransferError::InvalidBatch("upload id is empty".into()));
        }

        if original_file_name.trim().is_empty() {
            return Err(TransferError::InvalidBatch(
                "original file name is empty".into(),
            ));
        }

        let content_type = content_type
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        Ok(Self {
            upload_id: upload_id.trim().to_string(),
            original_file_name: original_file_name.trim().to_string(),
            size_bytes,
            content_type,
            completed_at,
        })
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}

/// One planned placement produced by [`TransferBatch::build_finalize_plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizePlanItem {
    upload_id: String,
    original_file_name: String,
    stored_file_name: String,
    relative_path: String,
    size_bytes: u64,
}

impl FinalizePlanItem {
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    pub fn stored_file_name(&self) -> &str {
        &self.stored_file_name
    }

    /// Destination path relative to the upload root.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// A tracked group of expected uploads destined for one target directory.
///
/// The batch is the sole authority over its own transitions; the store
/// only provides lookup and TTL. Callers read snapshots; the internal
/// collections are never handed out mutably.
#[derive(Debug)]
pub struct TransferBatch {
    id: Uuid,
    target_path: String,
    expected_file_count: u32,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
    status: BatchStatus,
    completed_uploads: Vec<CompletedUpload>,
    finalize_results: Vec<UploadRecord>,
}

impl TransferBatch {
    /// Creates a batch in `Collecting` state.
    pub fn create(
        target_path: &str,
        expected_file_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, TransferError> {
        if target_path.trim().is_empty() {
            return Err(TransferError::InvalidBatch("target path is empty".into()));
        }

        if expected_file_count == 0 {
            return Err(TransferError::InvalidBatch(
                "expected file count must be at least 1".into(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            target_path: target_path.trim().to_string(),
            expected_file_count,
            created_at: now,
            finalized_at: None,
            status: BatchStatus::Collecting,
            completed_uploads: Vec::new(),
            finalize_results: Vec::new(),
        })
    }

    /// Records one completed upload while the batch is still collecting.
    pub fn register_completed_upload(
        &mut self,
        completed_upload: CompletedUpload,
    ) -> Result<(), TransferError> {
        self.ensure_collecting()?;

        if self
            .completed_uploads
            .iter()
            .any(|existing| existing.upload_id() == completed_upload.upload_id())
        {
            return Err(TransferError::DuplicateUpload(
                completed_upload.upload_id().to_string(),
            ));
        }

        self.completed_uploads.push(completed_upload);
        Ok(())
    }

    /// Plans the placement of every registered upload, in arrival order.
    ///
    /// Pure planning: reserves stored names through `policy` and computes
    /// destination paths, but performs no I/O.
    pub fn build_finalize_plan(
        &self,
        policy: &mut StoredNamePolicy,
    ) -> Result<Vec<FinalizePlanItem>, TransferError> {
        self.ensure_collecting()?;

        if self.completed_uploads.is_empty() {
            return Err(TransferError::EmptyBatch);
        }

        let plan = self
            .completed_uploads
            .iter()
            .map(|upload| {
                let stored_file_name = policy.reserve(upload.original_file_name());
                let relative_path = build_relative_path(&self.target_path, &stored_file_name);
                FinalizePlanItem {
                    upload_id: upload.upload_id().to_string(),
                    original_file_name: upload.original_file_name().to_string(),
                    stored_file_name,
                    relative_path,
                    size_bytes: upload.size_bytes(),
                }
            })
            .collect();

        Ok(plan)
    }

    /// Records placement results and moves the batch to its terminal status.
    ///
    /// Finalizing with fewer arrivals than expected is permitted: a
    /// partial batch is a reportable outcome, not an error.
    pub fn mark_finalized(
        &mut self,
        results: Vec<UploadRecord>,
        now: DateTime<Utc>,
    ) -> Result<(), TransferError> {
        self.ensure_collecting()?;

        if results.is_empty() {
            return Err(TransferError::InvalidResults(
                "finalize results are empty".into(),
            ));
        }

        if results.len() > self.completed_uploads.len() {
            return Err(TransferError::InvalidResults(
                "more results than registered uploads".into(),
            ));
        }

        let success_count = results.iter().filter(|result| result.is_success()).count();
        self.status = if success_count == 0 {
            BatchStatus::Failed
        } else if success_count == results.len()
            && results.len() == self.expected_file_count as usize
        {
            BatchStatus::Completed
        } else {
            BatchStatus::PartiallyCompleted
        };

        self.finalize_results = results;
        self.finalized_at = Some(now);
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    pub fn expected_file_count(&self) -> u32 {
        self.expected_file_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.finalized_at
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn completed_uploads(&self) -> &[CompletedUpload] {
        &self.completed_uploads
    }

    pub fn finalize_results(&self) -> &[UploadRecord] {
        &self.finalize_results
    }

    fn ensure_collecting(&self) -> Result<(), TransferError> {
        if self.status != BatchStatus::Collecting {
            return Err(TransferError::InvalidBatchState);
        }
        Ok(())
    }
}

/// Joins the normalized target path and a stored name with `/`.
fn build_relative_path(target_path: &str, stored_file_name: &str) -> String {
    let normalized = target_path
        .trim()
        .replace('\\', "/")
        .trim_matches('/')
        .to_string();

    if normalized.is_empty() {
        stored_file_name.to_string()
    } else {
        format!("{normalized}/{stored_file_name}")
    }
}
