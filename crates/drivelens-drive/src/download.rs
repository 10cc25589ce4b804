//! File byte download with retry and fallback
//!
//! Three attempts against the media endpoint with exponential backoff
//! (2s, 4s, 8s) plus up to one second of random jitter, 30 seconds per
//! attempt. When all three fail with retryable errors, one final attempt
//! goes to the alternative authenticated endpoint before giving up.

use std::time::Duration;

use drivelens_core::domain::newtypes::DriveFileId;
use drivelens_core::ports::drive::{DriveError, UserCredential};
use rand::Rng;
use tracing::{debug, warn};

use crate::client::DriveClient;

/// Attempts against the primary endpoint
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff; doubles per attempt (2s, 4s, 8s)
const BASE_BACKOFF: Duration = Duration::from_secs(2);

/// Maximum random jitter added to each backoff
const MAX_JITTER_MS: u64 = 1_000;

/// Per-attempt deadline
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads the raw bytes of a drive file
pub async fn download_bytes(
    client: &DriveClient,
    file_id: &DriveFileId,
    credential: Option<&UserCredential>,
) -> Result<Vec<u8>, DriveError> {
    let media_path = format!("/drive/v3/files/{}?alt=media", file_id.as_str());
    let mut last_error: Option<DriveError> = None;

    for attempt in 0..MAX_ATTEMPTS {
        match fetch_once(client, &media_path, file_id, credential).await {
            Ok(bytes) => {
                if attempt > 0 {
                    debug!(file = %file_id, attempt, "Download succeeded after retry");
                }
                return Ok(bytes);
            }
            Err(err) if err.is_transient() => {
                let backoff = BASE_BACKOFF * 2u32.pow(attempt);
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=MAX_JITTER_MS));
                warn!(
                    file = %file_id,
                    attempt,
                    backoff_ms = (backoff + jitter).as_millis() as u64,
                    error = %err,
                    "Download attempt failed, backing off"
                );
                last_error = Some(err);
                tokio::time::sleep(backoff + jitter).await;
            }
            // Permission problems never heal on retry.
            Err(err) => return Err(err),
        }
    }

    // Exhausted: one last try against the alternative endpoint, which is
    // served by different infrastructure and sometimes succeeds when the
    // media endpoint is flaking.
    let alt_path = format!("/uc?export=download&id={}", file_id.as_str());
    debug!(file = %file_id, "Falling back to alternative download endpoint");
    match fetch_once(client, &alt_path, file_id, credential).await {
        Ok(bytes) => Ok(bytes),
        Err(err) => {
            let reason = last_error.unwrap_or(err).to_string();
            Err(DriveError::DownloadFailed {
                file_id: file_id.to_string(),
                reason,
            })
        }
    }
}

/// One request against the given path; acquires the drive limiter inside
/// `DriveClient::send`.
async fn fetch_once(
    client: &DriveClient,
    path: &str,
    file_id: &DriveFileId,
    credential: Option<&UserCredential>,
) -> Result<Vec<u8>, DriveError> {
    let response = client.send(path, credential, ATTEMPT_TIMEOUT).await?;
    let response = DriveClient::check_status(response, credential, &format!("file {file_id}"))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DriveError::Transient(format!("download body read failed: {e}")))?;

    if bytes.is_empty() {
        return Err(DriveError::Transient(format!(
            "empty download body for {file_id}"
        )));
    }

    debug!(file = %file_id, bytes = bytes.len(), "Downloaded file bytes");
    Ok(bytes.to_vec())
}
