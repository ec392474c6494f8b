//! Ingestion service: the use-case layer over batches, naming, staging
//! and placement.
//!
//! Batch and multi-file operations do as much as possible and report the
//! rest: one bad file becomes a failed record, not an aborted request.
//! Single-file and pure-validation paths fail fast instead, since there
//! is nothing partial to salvage.

use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use filedrop_config::ServiceConfig;

use crate::batch::{CompletedUpload, TransferBatch};
use crate::naming::{StoredNamePolicy, existing_file_names};
use crate::placer::FilePlacer;
use crate::staging::StagedUploads;
use crate::store::BatchStore;
use crate::types::{BatchSnapshot, CreatedBatch, UploadRecord, UploadReport};
use crate::{PlaceError, TransferError};

/// One file supplied inline to a direct (non-batched) upload.
pub struct DirectUploadFile {
    pub file_name: String,
    pub size_bytes: u64,
    pub reader: Box<dyn Read + Send>,
}

/// Coordinates batches, naming and placement against one upload root.
///
/// Mutating operations on a single batch are serialized through the
/// store's per-batch lock; operations on different batches never
/// contend.
pub struct IngestService {
    upload_root: PathBuf,
    store: Arc<BatchStore>,
    staged: Arc<dyn StagedUploads>,
    placer: FilePlacer,
}

impl IngestService {
    pub fn new(
        upload_root: impl Into<PathBuf>,
        store: Arc<BatchStore>,
        staged: Arc<dyn StagedUploads>,
    ) -> Self {
        let upload_root = upload_root.into();
        let placer = FilePlacer::new(&upload_root, Arc::clone(&staged));
        Self {
            upload_root,
            store,
            staged,
            placer,
        }
    }

    /// Wires a service from loaded configuration.
    pub fn from_config(config: &ServiceConfig, staged: Arc<dyn StagedUploads>) -> Self {
        let store = Arc::new(BatchStore::new(config.batch.sliding_ttl()));
        Self::new(config.storage.upload_root.trim(), store, staged)
    }

    /// The batch store, for wiring the expiry sweeper.
    pub fn store(&self) -> &Arc<BatchStore> {
        &self.store
    }

    /// Creates a batch expecting `expected_file_count` uploads for
    /// `target_path`.
    pub fn create_batch(
        &self,
        target_path: &str,
        expected_file_count: u32,
    ) -> Result<CreatedBatch, TransferError> {
        filedrop_storage::resolve(&self.upload_root, target_path)?;

        let batch = TransferBatch::create(target_path, expected_file_count, Utc::now())?;
        let created = CreatedBatch {
            batch_id: batch.id(),
            target_path: batch.target_path().to_string(),
            expected_file_count,
        };
        self.store.insert(batch, Instant::now());

        tracing::info!(
            batch_id = %created.batch_id,
            expected_file_count,
            "transfer batch created"
        );
        Ok(created)
    }

    /// Current view of a batch. Absent and expired batches are
    /// indistinguishable: both are not found.
    pub fn batch_status(&self, batch_id: Uuid) -> Result<BatchSnapshot, TransferError> {
        let handle = self
            .store
            .get(&batch_id, Instant::now())
            .ok_or(TransferError::NotFound(batch_id))?;

        let batch = handle.lock().unwrap();
        Ok(snapshot_of(&batch))
    }

    /// Registers one completed staged upload into the batch its metadata
    /// names.
    pub fn register_completed_upload(&self, upload_id: &str) -> Result<(), TransferError> {
        let info = self.staged.info(upload_id)?;
        let batch_id = info.batch_id()?.ok_or_else(|| {
            TransferError::InvalidBatch("batchId metadata is required".into())
        })?;

        let handle = self
            .store
            .get(&batch_id, Instant::now())
            .ok_or(TransferError::NotFound(batch_id))?;

        let completed = CompletedUpload::new(
            upload_id,
            info.file_name()?,
            info.size_bytes(),
            info.content_type(),
            Utc::now(),
        )?;

        {
            let mut batch = handle.lock().unwrap();
            batch.register_completed_upload(completed)?;
        }
        self.store.touch(&batch_id, Instant::now());

        tracing::debug!(upload_id, batch_id = %batch_id, "completed upload registered");
        Ok(())
    }

    /// Finalizes a batch: plans stored names for every arrived upload and
    /// places each one, recording per-file results and the terminal
    /// status. Placement failures never abort the remaining files.
    pub fn finalize_batch(&self, batch_id: Uuid) -> Result<BatchSnapshot, TransferError> {
        let handle = self
            .store
            .get(&batch_id, Instant::now())
            .ok_or(TransferError::NotFound(batch_id))?;

        // Hold the batch lock across planning and placement so a late
        // registration or second finalize cannot interleave.
        let mut batch = handle.lock().unwrap();

        let target = filedrop_storage::resolve(&self.upload_root, batch.target_path())?;
        let existing = existing_file_names(target.full_path()).map_err(PlaceError::Io)?;
        let mut policy = StoredNamePolicy::new(existing);
        let plan = batch.build_finalize_plan(&mut policy)?;

        let mut results = Vec::with_capacity(plan.len());
        for item in &plan {
            match self
                .placer
                .place(item.upload_id(), batch.target_path(), item.stored_file_name())
            {
                Ok(relative_path) => results.push(UploadRecord::succeeded(
                    item.original_file_name(),
                    item.stored_file_name(),
                    &relative_path,
                    item.size_bytes(),
                )),
                Err(err) => {
                    tracing::warn!(
                        batch_id = %batch_id,
                        upload_id = item.upload_id(),
                        "failed to place upload: {err}"
                    );
                    results.push(UploadRecord::failed(
                        item.original_file_name(),
                        &err.to_string(),
                        item.size_bytes(),
                    ));
                }
            }
        }

        batch.mark_finalized(results, Utc::now())?;
        let snapshot = snapshot_of(&batch);
        drop(batch);
        self.store.touch(&batch_id, Instant::now());

        tracing::info!(
            batch_id = %batch_id,
            status = ?snapshot.status,
            files = snapshot.files.len(),
            "transfer batch finalized"
        );
        Ok(snapshot)
    }

    /// Places one completed staged upload that belongs to no batch.
    ///
    /// A placement failure here is a hard error, since there is no partial
    /// batch context to absorb it.
    pub fn complete_single_upload(&self, upload_id: &str) -> Result<UploadRecord, TransferError> {
        let info = self.staged.info(upload_id)?;
        let target_path = info.target_path()?.to_string();
        let file_name = info.file_name()?.to_string();

        let target = filedrop_storage::resolve(&self.upload_root, &target_path)?;
        let existing = existing_file_names(target.full_path()).map_err(PlaceError::Io)?;
        let mut policy = StoredNamePolicy::new(existing);
        let stored_file_name = policy.reserve(&file_name);

        let relative_path = self.placer.place(upload_id, &target_path, &stored_file_name)?;

        tracing::info!(upload_id, relative_path = relative_path.as_str(), "upload placed");
        Ok(UploadRecord::succeeded(
            &file_name,
            &stored_file_name,
            &relative_path,
            info.size_bytes(),
        ))
    }

    /// Saves files supplied inline in one request, without batching.
    pub fn direct_upload(
        &self,
        target_path: &str,
        files: Vec<DirectUploadFile>,
    ) -> Result<UploadReport, TransferError> {
        let target = filedrop_storage::resolve(&self.upload_root, target_path)?;
        fs::create_dir_all(target.full_path()).map_err(PlaceError::Io)?;

        let existing = existing_file_names(target.full_path()).map_err(PlaceError::Io)?;
        let mut policy = StoredNamePolicy::new(existing);

        let mut records = Vec::with_capacity(files.len());
        for mut file in files {
            let stored_file_name = policy.reserve(&file.file_name);
            let destination = target.full_path().join(&stored_file_name);

            match write_new(&destination, file.reader.as_mut()) {
                Ok(()) => {
                    let relative_path = if target.relative_path().is_empty() {
                        stored_file_name.clone()
                    } else {
                        format!("{}/{}", target.relative_path(), stored_file_name)
                    };
                    records.push(UploadRecord::succeeded(
                        &file.file_name,
                        &stored_file_name,
                        &relative_path,
                        file.size_bytes,
                    ));
                }
                Err(err) => {
                    tracing::warn!(
                        file_name = file.file_name.as_str(),
                        "failed to save uploaded file: {err}"
                    );
                    records.push(UploadRecord::failed(
                        &file.file_name,
                        &err.to_string(),
                        file.size_bytes,
                    ));
                }
            }
        }

        let report = UploadReport::from_records(Uuid::new_v4(), target_path, &records);
        tracing::info!(
            job_id = %report.job_id,
            total = report.summary.total,
            failed = report.summary.failed,
            "direct upload finished"
        );
        Ok(report)
    }

    /// Pre-flight check for a resumable upload the transport is about to
    /// accept; rejecting here fails the upload before any bytes move.
    pub fn validate_upload_create(
        &self,
        target_path: &str,
        file_name: &str,
    ) -> Result<(), TransferError> {
        if file_name.trim().is_empty() {
            return Err(TransferError::InvalidBatch(
                "file name metadata is empty".into(),
            ));
        }

        filedrop_storage::resolve(&self.upload_root, target_path)?;
        Ok(())
    }
}

fn snapshot_of(batch: &TransferBatch) -> BatchSnapshot {
    BatchSnapshot {
        batch_id: batch.id(),
        target_path: batch.target_path().to_string(),
        expected_file_count: batch.expected_file_count(),
        completed_upload_count: batch.completed_uploads().len(),
        status: batch.status(),
        created_at: batch.created_at(),
        finalized_at: batch.finalized_at(),
        files: batch.finalize_results().to_vec(),
    }
}

/// Writes `reader` into an exclusively created file; an existing file at
/// the destination is a collision, never overwritten.
fn write_new(destination: &Path, reader: &mut dyn Read) -> Result<(), PlaceError> {
    let mut file = OpenOptions::new()
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

    io::copy(reader, &mut file)?;
    Ok(())
}
