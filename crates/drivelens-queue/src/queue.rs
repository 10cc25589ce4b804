//! Postgres implementation of the JobQueue port
//!
//! One `jobs` table carries both logical queues. Claiming uses
//! `FOR UPDATE SKIP LOCKED`, so any number of workers can poll without
//! double-popping. Retry backoff doubles from two seconds per consumed
//! attempt. Finished jobs are retained briefly (completed) or for a week
//! (failed) and pruned opportunistically during stall sweeps.

use std::time::Duration as StdDuration;

use chrono::Duration;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, warn};

use drivelens_core::ports::queue::{
    Job, JobPayload, JobQueue, JobState, QueueError, QueueName, QueueStats,
};

/// Attempt budget for every job
const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Base retry backoff in seconds; doubles per consumed attempt
const BACKOFF_BASE_SECS: f64 = 2.0;

/// Completed jobs are pruned after an hour
const COMPLETED_RETENTION: Duration = Duration::hours(1);

/// Failed jobs are kept a week for debugging
const FAILED_RETENTION: Duration = Duration::days(7);

const JOB_COLUMNS: &str = "id, queue, job_id, payload, state, attempts, max_attempts, \
                           enqueued_at, started_at, heartbeat_at, error";

/// Connection pool for the queue database, with schema bootstrap
pub struct QueuePool {
    pool: PgPool,
}

impl QueuePool {
    /// Connects and runs the jobs-table migration
    pub async fn connect(queue_url: &str) -> Result<Self, QueueError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(StdDuration::from_secs(5))
            .connect(queue_url)
            .await
            .map_err(|e| QueueError::Unavailable(format!("Failed to connect to queue: {e}")))?;

        let migration_sql = include_str!("migrations/0001_jobs.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&pool)
            .await
            .map_err(|e| QueueError::Query(format!("Failed to run queue migration: {e}")))?;

        info!("Queue pool initialized");
        Ok(Self { pool })
    }

    /// Wraps an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Postgres-backed durable job queue
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    /// Creates a queue over an initialized pool
    pub fn new(pool: &QueuePool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Drops finished jobs past their retention window
    async fn prune_finished(&self) -> Result<u64, QueueError> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE \
                 (state = 'completed' AND finished_at < now() - $1::interval) \
              OR (state = 'failed' AND finished_at < now() - $2::interval)",
        )
        .bind(format!("{} seconds", COMPLETED_RETENTION.num_seconds()))
        .bind(format!("{} seconds", FAILED_RETENTION.num_seconds()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}

fn map_sqlx(e: sqlx::Error) -> QueueError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            QueueError::Unavailable(e.to_string())
        }
        other => QueueError::Query(other.to_string()),
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, QueueError> {
    let queue_str: String = row
        .try_get("queue")
        .map_err(|e| QueueError::Query(format!("decode queue: {e}")))?;
    let queue = match queue_str.as_str() {
        "folders" => QueueName::Folders,
        "images" => QueueName::Images,
        other => return Err(QueueError::Query(format!("unknown queue {other}"))),
    };

    let state_str: String = row
        .try_get("state")
        .map_err(|e| QueueError::Query(format!("decode state: {e}")))?;
    let state = JobState::parse(&state_str)
        .ok_or_else(|| QueueError::Query(format!("unknown job state {state_str}")))?;

    let payload_json: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| QueueError::Query(format!("decode payload: {e}")))?;
    let payload: JobPayload = serde_json::from_value(payload_json)
        .map_err(|e| QueueError::Serialization(format!("payload deserialize failed: {e}")))?;

    Ok(Job {
        id: row
            .try_get("id")
            .map_err(|e| QueueError::Query(format!("decode id: {e}")))?,
        queue,
        job_id: row
            .try_get("job_id")
            .map_err(|e| QueueError::Query(format!("decode job_id: {e}")))?,
        payload,
        state,
        attempts: row
            .try_get("attempts")
            .map_err(|e| QueueError::Query(format!("decode attempts: {e}")))?,
        max_attempts: row
            .try_get("max_attempts")
            .map_err(|e| QueueError::Query(format!("decode max_attempts: {e}")))?,
        enqueued_at: row
            .try_get("enqueued_at")
            .map_err(|e| QueueError::Query(format!("decode enqueued_at: {e}")))?,
        started_at: row
            .try_get("started_at")
            .map_err(|e| QueueError::Query(format!("decode started_at: {e}")))?,
        heartbeat_at: row
            .try_get("heartbeat_at")
            .map_err(|e| QueueError::Query(format!("decode heartbeat_at: {e}")))?,
        error: row
            .try_get("error")
            .map_err(|e| QueueError::Query(format!("decode error: {e}")))?,
    })
}

#[async_trait::async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        job_id: &str,
        payload: &JobPayload,
    ) -> Result<bool, QueueError> {
        let payload_json = serde_json::to_value(payload)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO jobs (queue, job_id, payload, max_attempts) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(queue.as_str())
        .bind(job_id)
        .bind(payload_json)
        .bind(DEFAULT_MAX_ATTEMPTS)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            debug!(queue = %queue, job_id, "Job enqueued");
        } else {
            debug!(queue = %queue, job_id, "Enqueue deduplicated by idempotency key");
        }
        Ok(inserted)
    }

    async fn enqueue_batch(
        &self,
        queue: QueueName,
        jobs: Vec<(String, JobPayload)>,
    ) -> Result<u64, QueueError> {
        let mut inserted = 0;
        for (job_id, payload) in jobs {
            if self.enqueue(queue, &job_id, &payload).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn claim(&self, queue: QueueName) -> Result<Option<Job>, QueueError> {
        let sql = format!(
            "WITH next AS ( \
                 SELECT id FROM jobs \
                 WHERE queue = $1 AND state = 'queued' AND run_at <= now() \
                 ORDER BY enqueued_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             UPDATE jobs SET state = 'active', attempts = attempts + 1, \
                             started_at = now(), heartbeat_at = now() \
             FROM next WHERE jobs.id = next.id \
             RETURNING {}",
            JOB_COLUMNS
                .split(", ")
                .map(|c| format!("jobs.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let row = sqlx::query(&sql)
            .bind(queue.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn heartbeat(&self, id: i64) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET heartbeat_at = now() WHERE id = $1 AND state = 'active'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn complete(&self, id: i64) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'completed', finished_at = now() \
             WHERE id = $1 AND state = 'active'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn fail(&self, id: i64, error: &str) -> Result<JobState, QueueError> {
        // Jobs with attempts left re-queue with exponential backoff from
        // the base delay; exhausted jobs land in 'failed'.
        let row = sqlx::query(
            "UPDATE jobs SET \
                 state = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'queued' END, \
                 run_at = CASE WHEN attempts >= max_attempts THEN run_at \
                               ELSE now() + make_interval(secs => $2 * power(2, attempts - 1)) END, \
                 finished_at = CASE WHEN attempts >= max_attempts THEN now() ELSE finished_at END, \
                 error = $3 \
             WHERE id = $1 \
             RETURNING state",
        )
        .bind(id)
        .bind(BACKOFF_BASE_SECS)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(QueueError::NotFound(id))?;

        let state_str: String = row
            .try_get("state")
            .map_err(|e| QueueError::Query(e.to_string()))?;
        let state = JobState::parse(&state_str)
            .ok_or_else(|| QueueError::Query(format!("unknown job state {state_str}")))?;

        if state == JobState::Failed {
            warn!(job = id, error, "Job attempts exhausted");
        } else {
            debug!(job = id, error, "Job re-queued with backoff");
        }
        Ok(state)
    }

    async fn peek_counts(&self, queue: QueueName) -> Result<QueueStats, QueueError> {
        let row = sqlx::query(
            "SELECT \
                 count(*) FILTER (WHERE state = 'queued') AS queued, \
                 count(*) FILTER (WHERE state = 'active') AS active, \
                 count(*) FILTER (WHERE state = 'completed') AS completed, \
                 count(*) FILTER (WHERE state = 'failed') AS failed \
             FROM jobs WHERE queue = $1",
        )
        .bind(queue.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let get = |name: &str| -> Result<i64, QueueError> {
            row.try_get(name)
                .map_err(|e| QueueError::Query(format!("decode {name}: {e}")))
        };
        Ok(QueueStats {
            queued: get("queued")?,
            active: get("active")?,
            completed: get("completed")?,
            failed: get("failed")?,
        })
    }

    async fn list_jobs(
        &self,
        queue: QueueName,
        states: &[JobState],
    ) -> Result<Vec<Job>, QueueError> {
        let state_strings: Vec<String> =
            states.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE queue = $1 AND state = ANY($2) \
             ORDER BY enqueued_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(queue.as_str())
            .bind(&state_strings)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter().map(job_from_row).collect()
    }

    async fn remove(&self, id: i64) -> Result<(), QueueError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn purge(&self, queue: QueueName) -> Result<u64, QueueError> {
        let result = sqlx::query("DELETE FROM jobs WHERE queue = $1")
            .bind(queue.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }

    async fn fail_stalled(&self, threshold: Duration, reason: &str) -> Result<u64, QueueError> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'failed', error = $2, finished_at = now() \
             WHERE state = 'active' \
               AND COALESCE(heartbeat_at, started_at) < now() - $1::interval",
        )
        .bind(format!("{} seconds", threshold.num_seconds()))
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let stalled = result.rows_affected();
        if stalled > 0 {
            warn!(stalled, reason, "Stalled jobs moved to failed");
        }

        // Retention pruning rides along with the stall sweep.
        let pruned = self.prune_finished().await?;
        if pruned > 0 {
            debug!(pruned, "Finished jobs pruned past retention");
        }

        Ok(stalled)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| QueueError::Unavailable(e.to_string()))
    }
}
