//! Shared test helpers for Drive API integration tests
//!
//! Provides wiremock-based mock server setup for Drive v3 endpoints. Each
//! helper mounts the necessary mock endpoints and returns a configured
//! provider pointing at the mock server.

use std::sync::Arc;

use drivelens_drive::GoogleDriveProvider;
use drivelens_limiter::SlidingWindowLimiter;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Starts a mock server and a provider pointed at it, with an unbounded
/// limiter so tests never wait.
pub async fn setup_drive_mock() -> (MockServer, GoogleDriveProvider) {
    let server = MockServer::start().await;
    let limiter = Arc::new(SlidingWindowLimiter::unbounded());
    let provider = GoogleDriveProvider::with_base_url(
        Some("test-service-key".to_string()),
        limiter,
        server.uri(),
    );
    (server, provider)
}

/// Mounts folder metadata (name resolution / access probe) for an id.
pub async fn mount_folder_metadata(server: &MockServer, folder_id: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v3/files/{folder_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": folder_id,
            "name": name,
            "mimeType": "application/vnd.google-apps.folder"
        })))
        .mount(server)
        .await;
}

/// Mounts a single-page children listing for a folder id.
pub async fn mount_children_single_page(
    server: &MockServer,
    folder_id: &str,
    files: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param(
            "q",
            format!("'{folder_id}' in parents and trashed=false"),
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": files })),
        )
        .mount(server)
        .await;
}

/// A minimal image file resource for listing fixtures.
pub fn image_resource(id: &str, name: &str, mime: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "mimeType": mime,
        "thumbnailLink": format!("https://lh3.example/{id}=s220"),
        "webViewLink": format!("https://drive.google.com/file/d/{id}/view"),
        "size": "1024",
        "md5Checksum": "abc123",
        "modifiedTime": "2026-01-15T10:00:00Z",
        "version": "3"
    })
}

/// A subfolder resource for listing fixtures.
pub fn folder_resource(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "mimeType": "application/vnd.google-apps.folder"
    })
}
