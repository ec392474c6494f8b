fn main() {
    println!("Run `cargo test -p ingest-flow` to execute the end-to-end ingestion tests.");
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    use filedrop_config::{BatchSettings, ServiceConfig, StorageSettings};
    use filedrop_storage::{list_directories, prepare_upload_root};
    use filedrop_transfer::{
        BatchStatus, DirectUploadFile, DiskStaging, IngestService, JobStatus, META_BATCH_ID,
        META_CONTENT_TYPE, META_FILE_NAME, META_TARGET_PATH, StagedUploads, TransferError,
        spawn_expiry_sweeper,
    };

    struct Harness {
        _dir: TempDir,
        config: ServiceConfig,
        staging: Arc<DiskStaging>,
        service: IngestService,
    }

    /// Boots the whole stack the way a host process would: load config,
    /// prepare the root, wire staging and the service together.
    fn boot(batch: BatchSettings) -> Harness {
        let dir = TempDir::new().unwrap();

        let config = ServiceConfig {
            storage: StorageSettings {
                upload_root: dir.path().join("files").to_string_lossy().into_owned(),
                staging_root: dir.path().join("staging").to_string_lossy().into_owned(),
            },
            batch,
        };
        config.validate().unwrap();

        prepare_upload_root(Path::new(&config.storage.upload_root)).unwrap();
        let staging = Arc::new(DiskStaging::new(&config.storage.staging_root));
        let service =
            IngestService::from_config(&config, Arc::clone(&staging) as Arc<dyn StagedUploads>);

        Harness {
            _dir: dir,
            config,
            staging,
            service,
        }
    }

    fn stage(
        harness: &Harness,
        upload_id: &str,
        batch_id: Option<uuid::Uuid>,
        target: &str,
        name: &str,
        content: &[u8],
    ) {
        let mut metadata = HashMap::from([
            (META_TARGET_PATH.to_string(), target.to_string()),
            (META_FILE_NAME.to_string(), name.to_string()),
            (META_CONTENT_TYPE.to_string(), "application/octet-stream".to_string()),
        ]);
        if let Some(batch_id) = batch_id {
            metadata.insert(META_BATCH_ID.to_string(), batch_id.to_string());
        }

        harness
            .staging
            .stage(upload_id, metadata, &mut &content[..])
            .unwrap();
    }

    fn upload_root(harness: &Harness) -> &Path {
        Path::new(&harness.config.storage.upload_root)
    }

    #[test]
    fn chunked_batch_lifecycle_end_to_end() {
        let harness = boot(BatchSettings::default());

        // Transport validates the declared target before accepting bytes.
        harness
            .service
            .validate_upload_create("projects/alpha", "report.txt")
            .unwrap();
        assert!(
            harness
                .service
                .validate_upload_create("../escape", "report.txt")
                .is_err()
        );

        let created = harness.service.create_batch("projects/alpha", 3).unwrap();

        // Uploads complete out of order and independently.
        stage(&harness, "u-2", Some(created.batch_id), "projects/alpha", "report.txt", b"second");
        stage(&harness, "u-1", Some(created.batch_id), "projects/alpha", "report.txt", b"first");
        stage(&harness, "u-3", Some(created.batch_id), "projects/alpha", "notes.md", b"# notes");

        harness.service.register_completed_upload("u-2").unwrap();
        harness.service.register_completed_upload("u-1").unwrap();
        harness.service.register_completed_upload("u-3").unwrap();

        let status = harness.service.batch_status(created.batch_id).unwrap();
        assert_eq!(status.completed_upload_count, 3);
        assert_eq!(status.status, BatchStatus::Collecting);

        let snapshot = harness.service.finalize_batch(created.batch_id).unwrap();
        assert_eq!(snapshot.status, BatchStatus::Completed);
        assert_eq!(snapshot.files.len(), 3);

        // Arrival order decides the suffix: u-2 registered first keeps the
        // bare name.
        let root = upload_root(&harness);
        assert_eq!(
            fs::read(root.join("projects/alpha/report.txt")).unwrap(),
            b"second"
        );
        assert_eq!(
            fs::read(root.join("projects/alpha/report (1).txt")).unwrap(),
            b"first"
        );
        assert_eq!(
            fs::read(root.join("projects/alpha/notes.md")).unwrap(),
            b"# notes"
        );

        // Terminal: no further registration or finalize.
        stage(&harness, "u-4", Some(created.batch_id), "projects/alpha", "late.txt", b"late");
        assert!(matches!(
            harness.service.register_completed_upload("u-4"),
            Err(TransferError::InvalidBatchState)
        ));
        assert!(matches!(
            harness.service.finalize_batch(created.batch_id),
            Err(TransferError::InvalidBatchState)
        ));

        // The browse sibling sees the created directory tree.
        let listing = list_directories(root, "projects").unwrap();
        assert_eq!(listing.directories.len(), 1);
        assert_eq!(listing.directories[0].relative_path, "projects/alpha");
    }

    #[test]
    fn direct_upload_end_to_end() {
        let harness = boot(BatchSettings::default());

        let report = harness
            .service
            .direct_upload(
                "inbox",
                vec![
                    DirectUploadFile {
                        file_name: "photo.jpg".into(),
                        size_bytes: 4,
                        reader: Box::new(&b"abcd"[..]),
                    },
                    DirectUploadFile {
                        file_name: "photo.jpg".into(),
                        size_bytes: 4,
                        reader: Box::new(&b"efgh"[..]),
                    },
                ],
            )
            .unwrap();

        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.summary.success, 2);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["targetPath"], "inbox");
        assert_eq!(json["summary"]["total"], 2);
        assert_eq!(json["savedFiles"][1]["storedFileName"], "photo (1).jpg");

        let root = upload_root(&harness);
        assert_eq!(fs::read(root.join("inbox/photo.jpg")).unwrap(), b"abcd");
        assert_eq!(fs::read(root.join("inbox/photo (1).jpg")).unwrap(), b"efgh");
    }

    #[test]
    fn zero_ttl_batch_expires_before_next_lookup() {
        let harness = boot(BatchSettings {
            sliding_ttl_minutes: 0,
            sweep_interval_seconds: 1,
        });

        let created = harness.service.create_batch("docs", 1).unwrap();
        assert!(matches!(
            harness.service.batch_status(created.batch_id),
            Err(TransferError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_reclaims_abandoned_batches() {
        let harness = boot(BatchSettings {
            sliding_ttl_minutes: 0,
            sweep_interval_seconds: 1,
        });

        harness.service.create_batch("docs", 1).unwrap();
        assert_eq!(harness.service.store().len(), 1);

        let cancel = CancellationToken::new();
        let sweeper = spawn_expiry_sweeper(
            Arc::clone(harness.service.store()),
            harness.config.batch.sweep_interval(),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(harness.service.store().is_empty());

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[test]
    fn single_upload_completion_end_to_end() {
        let harness = boot(BatchSettings::default());
        stage(&harness, "solo", None, "inbox", "letter.txt", b"hello");

        let record = harness.service.complete_single_upload("solo").unwrap();

        assert!(record.is_success());
        let root = upload_root(&harness);
        assert_eq!(fs::read(root.join("inbox/letter.txt")).unwrap(), b"hello");
    }

    #[test]
    fn snapshot_serialization_shape() {
        let harness = boot(BatchSettings::default());
        let created = harness.service.create_batch("docs", 1).unwrap();
        stage(&harness, "u-1", Some(created.batch_id), "docs", "a.txt", b"a");
        harness.service.register_completed_upload("u-1").unwrap();

        let snapshot = harness.service.finalize_batch(created.batch_id).unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["batchId"], created.batch_id.to_string());
        assert_eq!(json["expectedFileCount"], 1);
        assert_eq!(json["completedUploadCount"], 1);
        assert_eq!(json["status"], "completed");
        assert!(json["finalizedAt"].is_string());
        assert_eq!(json["files"][0]["relativePath"], "docs/a.txt");
        assert!(json["files"][0].get("failureReason").is_none());
    }
}
