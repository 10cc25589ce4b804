//! Drive folder URL parsing
//!
//! Three shapes are recognized, all on the drive host:
//!
//! - `https://drive.google.com/drive/folders/{id}`
//! - `https://drive.google.com/drive/u/{n}/folders/{id}`
//! - `https://drive.google.com/open?id={id}`
//!
//! Any other host or path is rejected.

use drivelens_core::domain::newtypes::DriveFolderId;
use drivelens_core::ports::drive::DriveError;
use url::Url;

/// The only host folder URLs may live on
const DRIVE_HOST: &str = "drive.google.com";

/// Extracts the drive folder id from a shared-folder URL
pub fn parse_folder_url(raw: &str) -> Result<DriveFolderId, DriveError> {
    let parsed =
        Url::parse(raw.trim()).map_err(|e| DriveError::InvalidUrl(format!("{raw}: {e}")))?;

    if parsed.host_str() != Some(DRIVE_HOST) {
        return Err(DriveError::InvalidUrl(format!(
            "unrecognized host in {raw}"
        )));
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let candidate: Option<String> = match segments.as_slice() {
        // /drive/folders/{id}
        ["drive", "folders", id] => Some((*id).to_string()),
        // /drive/u/{n}/folders/{id}
        ["drive", "u", n, "folders", id] if n.chars().all(|c| c.is_ascii_digit()) => {
            Some((*id).to_string())
        }
        // /open?id={id}
        ["open"] => parsed
            .query_pairs()
            .find(|(k, _)| k == "id")
            .map(|(_, v)| v.into_owned()),
        _ => None,
    };

    let id = candidate
        .ok_or_else(|| DriveError::InvalidUrl(format!("unrecognized folder path in {raw}")))?;

    DriveFolderId::new(id).map_err(|e| DriveError::InvalidUrl(format!("{raw}: {e}")))
}
