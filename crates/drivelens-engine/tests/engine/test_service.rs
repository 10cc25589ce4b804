//! Service facade: retry, health, folder listing, thumbnails

use std::sync::atomic::Ordering;

use drivelens_core::domain::folder::FolderStatus;
use drivelens_core::domain::image::ImageStatus;
use drivelens_core::domain::newtypes::{DriveFileId, ImageId};
use drivelens_core::ports::queue::{JobQueue, JobState, QueueName};
use drivelens_core::ports::store::ImageStore;
use drivelens_engine::{RetryTarget, ServiceError};

use crate::support::{drive_file, Harness};

const FA_URL: &str = "https://drive.google.com/drive/folders/FA";

async fn seed_with_failure(harness: &Harness) -> drivelens_core::domain::folder::Folder {
    harness.drive.seed_folder(
        "FA",
        "Mixed",
        vec![
            drive_file("G1", "good.jpg", "image/jpeg"),
            drive_file("G2", "gone.jpg", "image/jpeg"),
        ],
    );
    let folder = harness.service.ingest(FA_URL, None, None).await.unwrap();
    // G2's bytes vanish so its download fails permanently.
    harness
        .drive
        .bytes_remove(&DriveFileId::new("G2".to_string()).unwrap());
    harness.drain_queues().await;
    harness.store.folder(&folder.id).unwrap()
}

#[tokio::test]
async fn test_retry_folder_resets_failed_rows_and_requeues() {
    let harness = Harness::new();
    let folder = seed_with_failure(&harness).await;

    let failed: Vec<_> = harness
        .store
        .folder_images(&folder.id)
        .into_iter()
        .filter(|i| i.status == ImageStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);

    // Bytes come back before the retry.
    harness
        .drive
        .seed_bytes(&failed[0].drive_file_id, b"gone but back");

    let outcome = harness
        .service
        .retry(RetryTarget::Folder(folder.id))
        .await
        .unwrap();
    assert_eq!(outcome.queued_count, 1);

    // The reset row is pending with everything nulled.
    let row = harness.store.image(&failed[0].id).unwrap();
    assert_eq!(row.status, ImageStatus::Pending);
    assert!(row.error.is_none() && row.caption.is_none() && row.caption_vec.is_none());

    // The folder reads as in-flight again, and draining completes it.
    assert_eq!(
        harness.store.folder(&folder.id).unwrap().status,
        FolderStatus::Processing
    );
    harness.drain_queues().await;
    assert_eq!(
        harness.store.folder(&folder.id).unwrap().status,
        FolderStatus::Completed
    );
    harness.assert_invariants().await;
}

#[tokio::test]
async fn test_retry_enqueues_once_per_version_token() {
    let harness = Harness::new();
    let folder = seed_with_failure(&harness).await;

    let first = harness
        .service
        .retry(RetryTarget::Folder(folder.id))
        .await
        .unwrap();
    assert_eq!(first.queued_count, 1);

    // A second retry before the job runs deduplicates on the
    // image:{fileId}:{versionToken} key.
    let second = harness
        .service
        .retry(RetryTarget::Folder(folder.id))
        .await
        .unwrap();
    assert_eq!(second.queued_count, 0);

    let queued = harness
        .queue
        .list_jobs(QueueName::Images, &[JobState::Queued])
        .await
        .unwrap();
    assert_eq!(queued.len(), 1);
}

#[tokio::test]
async fn test_retry_single_image() {
    let harness = Harness::new();
    let folder = seed_with_failure(&harness).await;

    let failed = harness
        .store
        .folder_images(&folder.id)
        .into_iter()
        .find(|i| i.status == ImageStatus::Failed)
        .unwrap();

    let outcome = harness
        .service
        .retry(RetryTarget::Image(failed.id))
        .await
        .unwrap();
    assert_eq!(outcome.queued_count, 1);
    assert_eq!(
        harness.store.image(&failed.id).unwrap().status,
        ImageStatus::Pending
    );
}

#[tokio::test]
async fn test_retry_unknown_targets_are_not_found() {
    let harness = Harness::new();

    let err = harness
        .service
        .retry(RetryTarget::Image(ImageId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = harness
        .service
        .retry(RetryTarget::Folder(
            drivelens_core::domain::newtypes::FolderId::new(),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn test_get_folder_cleans_captions() {
    let harness = Harness::new();
    harness.drive.seed_folder(
        "FA",
        "Legacy",
        vec![drive_file("L1", "legacy.jpg", "image/jpeg")],
    );
    let folder = harness.service.ingest(FA_URL, None, None).await.unwrap();

    // Simulate a legacy row: JSON-wrapped caption straight in the store.
    let image = harness.store.folder_images(&folder.id)[0].clone();
    harness
        .store
        .set_image_completed(
            &image.id,
            r#"{"caption":"a legacy caption"}"#,
            "legacy",
            &[0.5; 4],
        )
        .await
        .unwrap();

    let details = harness.service.get_folder(&folder.id).await.unwrap();
    assert_eq!(details.images.len(), 1);
    assert_eq!(
        details.images[0].caption.as_deref(),
        Some("a legacy caption")
    );
}

#[tokio::test]
async fn test_health_reports_dependencies() {
    let harness = Harness::new();

    let healthy = harness.service.health().await;
    assert!(healthy.database && healthy.queue && healthy.healthy());
    assert!(healthy.folder_jobs.is_some());

    harness.queue.unavailable.store(true, Ordering::Relaxed);
    let degraded = harness.service.health().await;
    assert!(degraded.database);
    assert!(!degraded.queue);
    assert!(!degraded.healthy());
    assert!(degraded.folder_jobs.is_none());

    harness.store.unavailable.store(true, Ordering::Relaxed);
    let down = harness.service.health().await;
    assert!(!down.database);
}

#[tokio::test]
async fn test_thumbnail_bytes_served() {
    let harness = Harness::new();
    harness.drive.seed_folder(
        "FA",
        "Thumbs",
        vec![drive_file("T1", "t.jpg", "image/jpeg")],
    );
    harness.service.ingest(FA_URL, None, None).await.unwrap();

    let file_id = DriveFileId::new("T1".to_string()).unwrap();
    let (bytes, content_type) = harness
        .service
        .thumbnail(&file_id, 220, None)
        .await
        .unwrap();
    assert!(!bytes.is_empty());
    assert_eq!(content_type, "image/jpeg");
}

#[tokio::test]
async fn test_thumbnail_missing_is_not_found() {
    let harness = Harness::new();
    let ghost = DriveFileId::new("NOPE".to_string()).unwrap();

    let err = harness.service.thumbnail(&ghost, 220, None).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
