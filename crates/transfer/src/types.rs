//! Result and report types shared by batch finalization and direct upload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::batch::BatchStatus;

/// Outcome of placing one file.
///
/// Exactly one of the success pair (stored name + relative path) or the
/// failure reason is populated; the constructors are the only way to
/// build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    original_file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stored_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relative_path: Option<String>,
    size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure_reason: Option<String>,
}

impl UploadRecord {
    /// A successfully placed file.
    pub fn succeeded(
        original_file_name: &str,
        stored_file_name: &str,
        relative_path: &str,
        size_bytes: u64,
    ) -> Self {
        Self {
            original_file_name: original_file_name.trim().to_string(),
            stored_file_name: Some(stored_file_name.trim().to_string()),
            relative_path: Some(relative_path.trim().to_string()),
            size_bytes,
            failure_reason: None,
        }
    }

    /// A file that could not be placed.
    pub fn failed(original_file_name: &str, failure_reason: &str, size_bytes: u64) -> Self {
        Self {
            original_file_name: original_file_name.trim().to_string(),
            stored_file_name: None,
            relative_path: None,
            size_bytes,
            failure_reason: Some(failure_reason.trim().to_string()),
        }
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    pub fn stored_file_name(&self) -> Option<&str> {
        self.stored_file_name.as_deref()
    }

    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason.is_none()
    }
}

/// Response to batch creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBatch {
    pub batch_id: Uuid,
    pub target_path: String,
    pub expected_file_count: u32,
}

/// Point-in-time view of one batch, returned by status and finalize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub batch_id: Uuid,
    pub target_path: String,
    pub expected_file_count: u32,
    pub completed_upload_count: usize,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    pub files: Vec<UploadRecord>,
}

/// Terminal status of a direct (non-batched) upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

/// A successfully saved file within a direct upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedFile {
    pub original_file_name: String,
    pub stored_file_name: String,
    pub relative_path: String,
    pub size_bytes: u64,
}

/// A file that failed to save within a direct upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedFile {
    pub original_file_name: String,
    pub reason: String,
    pub size_bytes: u64,
}

/// Per-request totals for a direct upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}

/// Response to a direct multi-file upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub job_id: Uuid,
    pub target_path: String,
    pub status: JobStatus,
    pub saved_files: Vec<SavedFile>,
    pub failed_files: Vec<FailedFile>,
    pub summary: UploadSummary,
}

impl UploadReport {
    pub(crate) fn from_records(job_id: Uuid, target_path: &str, records: &[UploadRecord]) -> Self {
        let saved_files: Vec<SavedFile> = records
            .iter()
            .filter(|record| record.is_success())
            .map(|record| SavedFile {
                original_file_name: record.original_file_name().to_string(),
                stored_file_name: record.stored_file_name().unwrap_or_default().to_string(),
                relative_path: record.relative_path().unwrap_or_default().to_string(),
                size_bytes: record.size_bytes(),
            })
            .collect();

        let failed_files: Vec<FailedFile> = records
            .iter()
            .filter(|record| !record.is_success())
            .map(|record| FailedFile {
                original_file_name: record.original_file_name().to_string(),
                reason: record.failure_reason().unwrap_or_default().to_string(),
                size_bytes: record.size_bytes(),
            })
            .collect();

        let summary = UploadSummary {
            total: records.len(),
            success: saved_files.len(),
            failed: failed_files.len(),
        };

        let status = if summary.success == summary.total && summary.total > 0 {
            JobStatus::Completed
        } else if summary.success == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyCompleted
        };

        Self {
            job_id,
            target_path: target_path.trim().to_string(),
            status,
            saved_files,
            failed_files,
            summary,
        }
    }
}
