//! Worker runtime
//!
//! Claim loops for the two queues. Each loop polls the queue, holds a
//! semaphore permit per in-flight job, dispatches on the payload variant,
//! heartbeats while the handler runs, and translates the handler outcome
//! into `complete` or `fail` so the queue's retry policy applies.
//!
//! Shutdown is cooperative: cancellation stops new claims, in-flight jobs
//! run to completion, and anything that outlives the process is reclaimed
//! by the next recovery sweep's stall detection.

use std::sync::Arc;
use std::time::Duration;

use drivelens_core::ports::queue::{Job, JobPayload, QueueName};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::folder_worker::FolderWorker;
use crate::image_worker::ImageWorker;
use crate::QueueRef;

/// Poll delay when a claim comes back empty
const IDLE_POLL: Duration = Duration::from_millis(750);

/// Heartbeat cadence for active jobs
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Runs the claim loops for both queues
pub struct WorkerRuntime {
    queue: QueueRef,
    folder_worker: Arc<FolderWorker>,
    image_worker: Arc<ImageWorker>,
    folder_concurrency: usize,
    image_concurrency: usize,
}

impl WorkerRuntime {
    pub fn new(
        queue: QueueRef,
        folder_worker: Arc<FolderWorker>,
        image_worker: Arc<ImageWorker>,
        folder_concurrency: usize,
        image_concurrency: usize,
    ) -> Self {
        Self {
            queue,
            folder_worker,
            image_worker,
            folder_concurrency: folder_concurrency.max(1),
            image_concurrency: image_concurrency.max(1),
        }
    }

    /// Runs both claim loops until cancelled; returns once in-flight jobs
    /// have drained
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            folder_concurrency = self.folder_concurrency,
            image_concurrency = self.image_concurrency,
            "Worker runtime starting"
        );

        let folders = {
            let runtime = Arc::clone(&self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let concurrency = runtime.folder_concurrency;
                runtime
                    .claim_loop(QueueName::Folders, concurrency, cancel)
                    .await;
            })
        };
        let images = {
            let runtime = Arc::clone(&self);
            tokio::spawn(async move {
                let concurrency = runtime.image_concurrency;
                runtime
                    .claim_loop(QueueName::Images, concurrency, cancel)
                    .await;
            })
        };

        let _ = folders.await;
        let _ = images.await;
        info!("Worker runtime stopped");
    }

    async fn claim_loop(
        self: Arc<Self>,
        queue_name: QueueName,
        concurrency: usize,
        cancel: CancellationToken,
    ) {
        let semaphore = Arc::new(Semaphore::new(concurrency));

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.expect("runtime semaphore never closes")
                }
            };

            let job = match self.queue.claim(queue_name).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_POLL) => continue,
                    }
                }
                Err(err) => {
                    drop(permit);
                    warn!(queue = %queue_name, error = %err, "Claim failed; backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_POLL * 4) => continue,
                    }
                }
            };

            let runtime = Arc::clone(&self);
            tokio::spawn(async move {
                runtime.execute(job).await;
                drop(permit);
            });
        }

        // Wait for in-flight jobs: reacquiring every permit means every
        // spawned task has dropped its own.
        let _ = semaphore.acquire_many(concurrency as u32).await;
        debug!(queue = %queue_name, "Claim loop drained");
    }

    /// Runs one job with heartbeats and reports the outcome to the queue
    async fn execute(&self, job: Job) {
        debug!(job = job.id, job_id = %job.job_id, "Job claimed");

        let handler = self.dispatch(&job);
        tokio::pin!(handler);

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // first tick is immediate

        let outcome = loop {
            tokio::select! {
                result = &mut handler => break result,
                _ = heartbeat.tick() => {
                    if let Err(err) = self.queue.heartbeat(job.id).await {
                        // The job may have been reclaimed as stalled; the
                        // handler keeps running, row guards protect writes.
                        warn!(job = job.id, error = %err, "Heartbeat failed");
                    }
                }
            }
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = self.queue.complete(job.id).await {
                    warn!(job = job.id, error = %err, "Could not mark job completed");
                }
            }
            Err(err) => {
                error!(job = job.id, error = %err, "Job handler failed");
                if let Err(fail_err) = self.queue.fail(job.id, &err.to_string()).await {
                    warn!(job = job.id, error = %fail_err, "Could not record job failure");
                }
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> anyhow::Result<()> {
        match &job.payload {
            JobPayload::Folder {
                folder_id,
                credential,
                ..
            } => self.folder_worker.process(folder_id, credential.as_ref()).await,
            JobPayload::Image {
                image_id,
                folder_id,
                credential,
            } => {
                self.image_worker
                    .process_batch(folder_id, &[*image_id], credential.as_ref())
                    .await?;
                Ok(())
            }
            JobPayload::ImageBatch {
                folder_id,
                image_ids,
                credential,
            } => {
                self.image_worker
                    .process_batch(folder_id, image_ids, credential.as_ref())
                    .await?;
                Ok(())
            }
        }
    }
}
