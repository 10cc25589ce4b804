//! Recursive folder enumeration
//!
//! Breadth-first walk over the folder tree. Each level is listed with the
//! children query (`'{id}' in parents`), paginated until the drive stops
//! returning a page token. Files outside the supported MIME set are
//! skipped; subfolders are pushed onto the walk queue.

use std::collections::VecDeque;
use std::time::Duration;

use drivelens_core::domain::image::is_supported_mime;
use drivelens_core::domain::newtypes::DriveFolderId;
use drivelens_core::ports::drive::{DriveError, FolderListing, UserCredential};
use tracing::{debug, warn};

use crate::client::{DriveClient, FileListPage, FileResource, FILE_FIELDS};

/// Folder MIME type on the drive
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Page size requested from the list endpoint
const PAGE_SIZE: u32 = 1000;

/// Deadline per listing request
const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Walks `folder_id` and every subfolder, returning all admitted images
pub async fn list_images_recursive(
    client: &DriveClient,
    folder_id: &DriveFolderId,
    credential: Option<&UserCredential>,
) -> Result<FolderListing, DriveError> {
    let folder_name = fetch_folder_name(client, folder_id, credential).await?;

    let mut listing = FolderListing {
        folder_name,
        images: Vec::new(),
    };

    let mut pending: VecDeque<DriveFolderId> = VecDeque::new();
    pending.push_back(folder_id.clone());

    while let Some(current) = pending.pop_front() {
        let mut page_token: Option<String> = None;

        loop {
            let page = list_children_page(client, &current, page_token.as_deref(), credential)
                .await?;

            for resource in page.files {
                match resource.mime_type.as_deref() {
                    Some(FOLDER_MIME) => {
                        if let Ok(sub) = DriveFolderId::new(resource.id.clone()) {
                            pending.push_back(sub);
                        }
                    }
                    Some(mime) if is_supported_mime(mime) => {
                        if let Some(file) = resource.into_drive_file() {
                            listing.images.push(file);
                        }
                    }
                    other => {
                        debug!(
                            mime = other.unwrap_or("<none>"),
                            "Skipping non-image drive file"
                        );
                    }
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }
    }

    debug!(
        folder = %folder_id,
        images = listing.images.len(),
        "Recursive listing complete"
    );
    Ok(listing)
}

/// Fetches the root folder's display name; the same request doubles as the
/// access probe, so permission errors surface here with the right message.
async fn fetch_folder_name(
    client: &DriveClient,
    folder_id: &DriveFolderId,
    credential: Option<&UserCredential>,
) -> Result<Option<String>, DriveError> {
    let path = format!(
        "/drive/v3/files/{}?fields=id,name,mimeType",
        folder_id.as_str()
    );
    let response = client.send(&path, credential, LIST_TIMEOUT).await?;
    let response =
        DriveClient::check_status(response, credential, &format!("folder {folder_id}"))?;

    let resource: FileResource = response
        .json()
        .await
        .map_err(|e| DriveError::Transient(format!("folder metadata parse failed: {e}")))?;

    if resource.mime_type.as_deref() != Some(FOLDER_MIME) {
        warn!(folder = %folder_id, "Submitted id is not a folder");
    }
    Ok(resource.name)
}

/// Lists one page of a folder's direct children
async fn list_children_page(
    client: &DriveClient,
    folder_id: &DriveFolderId,
    page_token: Option<&str>,
    credential: Option<&UserCredential>,
) -> Result<FileListPage, DriveError> {
    let query = format!("'{}' in parents and trashed=false", folder_id.as_str());
    let mut path = format!(
        "/drive/v3/files?q={}&pageSize={}&fields=nextPageToken,files({})",
        urlencode(&query),
        PAGE_SIZE,
        urlencode(FILE_FIELDS),
    );
    if let Some(token) = page_token {
        path.push_str("&pageToken=");
        path.push_str(&urlencode(token));
    }

    let response = client.send(&path, credential, LIST_TIMEOUT).await?;
    let response =
        DriveClient::check_status(response, credential, &format!("folder {folder_id}"))?;

    response
        .json()
        .await
        .map_err(|e| DriveError::Transient(format!("file list parse failed: {e}")))
}

/// Minimal percent-encoding for query parameter values
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
