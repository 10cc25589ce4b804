//! Recovery supervisor scenarios

use drivelens_core::domain::folder::FolderStatus;
use drivelens_core::domain::image::ImageStatus;
use drivelens_core::ports::queue::{JobPayload, JobState, JobQueue, QueueName};
use drivelens_core::ports::store::ImageStore;

use crate::support::{drive_file, Harness};

const FA_URL: &str = "https://drive.google.com/drive/folders/FA";

async fn seed_ingested(harness: &Harness) -> drivelens_core::domain::folder::Folder {
    harness.drive.seed_folder(
        "FA",
        "Holiday",
        vec![
            drive_file("J1", "J1.jpeg", "image/jpeg"),
            drive_file("P1", "P1.png", "image/png"),
        ],
    );
    harness.service.ingest(FA_URL, None, None).await.unwrap()
}

#[tokio::test]
async fn test_stuck_processing_row_recovered_end_to_end() {
    let harness = Harness::new();
    let folder = seed_ingested(&harness).await;
    harness.drain_queues().await;

    // One row is stuck: processing, last touched ten minutes ago, no
    // active queue job anywhere.
    let victim = harness.store.folder_images(&folder.id)[0].clone();
    harness
        .store
        .reset_images_to_pending(drivelens_core::ports::store::ResetFilter::Image(victim.id))
        .await
        .unwrap();
    assert!(harness.store.set_image_processing(&victim.id).await.unwrap());
    harness.store.age_image(&victim.id, 10);

    let report = harness.recovery.run_once().await.unwrap();
    assert_eq!(report.reset_images, 1);

    // The row is pending again with its error cleared, and work was
    // re-queued to drive it to completion.
    let row = harness.store.image(&victim.id).unwrap();
    assert_eq!(row.status, ImageStatus::Pending);
    assert!(row.error.is_none());

    harness.drain_queues().await;
    let folder = harness.store.folder(&folder.id).unwrap();
    assert_eq!(folder.status, FolderStatus::Completed);
    assert_eq!(folder.processed_images, 2);
    harness.assert_invariants().await;
}

#[tokio::test]
async fn test_fresh_processing_rows_left_alone() {
    let harness = Harness::new();
    let folder = seed_ingested(&harness).await;

    let victim = harness.store.folder_images(&folder.id)[0].clone();
    assert!(harness.store.set_image_processing(&victim.id).await.unwrap());

    let report = harness.recovery.run_once().await.unwrap();
    assert_eq!(report.reset_images, 0);
    assert_eq!(
        harness.store.image(&victim.id).unwrap().status,
        ImageStatus::Processing
    );
}

#[tokio::test]
async fn test_forgotten_folder_requeued() {
    let harness = Harness::new();
    let folder = seed_ingested(&harness).await;

    // Pending images but the folder sits in pending and the queues are
    // empty (e.g. jobs were purged by an operator).
    harness.queue.purge(QueueName::Folders).await.unwrap();
    harness.queue.purge(QueueName::Images).await.unwrap();

    let report = harness.recovery.run_once().await.unwrap();
    assert_eq!(report.requeued_folders, 1);
    assert!(report.requeued_images >= 2);

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
async fn test_stalled_jobs_declared_failed() {
    let harness = Harness::new();
    seed_ingested(&harness).await;

    // Claim the folder job, then pretend its worker died ten minutes ago.
    let job = harness.queue.claim(QueueName::Folders).await.unwrap().unwrap();
    harness.queue.make_stalled(job.id, 10);

    let report = harness.recovery.run_once().await.unwrap();
    assert_eq!(report.stalled_jobs, 1);

    let failed = harness
        .queue
        .list_jobs(QueueName::Folders, &[JobState::Failed])
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].error.as_deref(),
        Some("worker restart recovery")
    );
}

#[tokio::test]
async fn test_rebatch_waits_for_quiet_image_queue() {
    let harness = Harness::new();
    let folder = seed_ingested(&harness).await;

    // Drive the folder job so image batches are queued, then leave them.
    let job = harness.queue.claim(QueueName::Folders).await.unwrap().unwrap();
    if let JobPayload::Folder {
        folder_id,
        credential,
        ..
    } = &job.payload
    {
        harness
            .folder_worker
            .process(&folder_id, credential.as_ref())
            .await
            .unwrap();
    }
    harness.queue.complete(job.id).await.unwrap();

    let queued_before = harness
        .queue
        .peek_counts(QueueName::Images)
        .await
        .unwrap()
        .queued;
    assert!(queued_before > 0);

    // With image jobs in flight the sweep must not duplicate them.
    let report = harness.recovery.run_once().await.unwrap();
    assert_eq!(report.requeued_images, 0);

    let queued_after = harness
        .queue
        .peek_counts(QueueName::Images)
        .await
        .unwrap()
        .queued;
    assert_eq!(queued_before, queued_after);

    // Folder already processing, so no folder re-queue either.
    assert_eq!(report.requeued_folders, 0);
    let _ = folder;
}

#[tokio::test]
async fn test_sweep_is_idempotent_on_healthy_state() {
    let harness = Harness::new();
    let folder = seed_ingested(&harness).await;
    harness.drain_queues().await;

    let report = harness.recovery.run_once().await.unwrap();
    assert_eq!(report.reset_images, 0);
    assert_eq!(report.requeued_folders, 0);
    assert_eq!(report.stalled_jobs, 0);
    assert_eq!(report.requeued_images, 0);

    assert_eq!(
        harness.store.folder(&folder.id).unwrap().status,
        FolderStatus::Completed
    );
    harness.assert_invariants().await;
}
