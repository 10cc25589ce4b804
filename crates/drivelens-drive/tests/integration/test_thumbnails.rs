//! Integration tests for thumbnail resolution and caching

use drivelens_core::domain::newtypes::DriveFileId;
use drivelens_core::ports::drive::{DriveError, DriveProvider};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn file(id: &str) -> DriveFileId {
    DriveFileId::new(id.to_string()).unwrap()
}

async fn mount_thumb_metadata(server: &MockServer, file_id: &str, link: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v3/files/{file_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": file_id,
            "thumbnailLink": link
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fresh_thumbnail_url_rewrites_size() {
    let (server, provider) = common::setup_drive_mock().await;
    mount_thumb_metadata(&server, "F1", "https://lh3.example/F1=s220").await;

    let url = provider
        .fresh_thumbnail_url(&file("F1"), 400, None)
        .await
        .unwrap();
    assert_eq!(url, "https://lh3.example/F1=s400");
}

#[tokio::test]
async fn test_thumbnail_size_clamped() {
    let (server, provider) = common::setup_drive_mock().await;
    mount_thumb_metadata(&server, "F1", "https://lh3.example/F1=s220").await;

    let url = provider
        .fresh_thumbnail_url(&file("F1"), 5000, None)
        .await
        .unwrap();
    assert!(url.ends_with("=s1600"));

    let url = provider
        .fresh_thumbnail_url(&file("F1"), 1, None)
        .await
        .unwrap();
    assert!(url.ends_with("=s32"));
}

#[tokio::test]
async fn test_thumbnail_url_cached_across_calls() {
    let (server, provider) = common::setup_drive_mock().await;
    mount_thumb_metadata(&server, "F1", "https://lh3.example/F1=s220").await;

    let first = provider
        .fresh_thumbnail_url(&file("F1"), 400, None)
        .await
        .unwrap();
    let second = provider
        .fresh_thumbnail_url(&file("F1"), 400, None)
        .await
        .unwrap();
    assert_eq!(first, second);

    // Only one metadata request reached the drive; the second call was a
    // cache hit.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_missing_thumbnail_link() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/F9"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "F9" })),
        )
        .mount(&server)
        .await;

    let err = provider
        .fresh_thumbnail_url(&file("F9"), 220, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::ThumbnailUnavailable(_)));
}

#[tokio::test]
async fn test_fetch_thumbnail_returns_bytes_and_content_type() {
    let (server, provider) = common::setup_drive_mock().await;

    // Point the thumbnail link back at the mock server so the byte fetch
    // is observable.
    let link = format!("{}/thumb/F1=s220", server.uri());
    mount_thumb_metadata(&server, "F1", &link).await;

    Mock::given(method("GET"))
        .and(path("/thumb/F1=s64"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"png-bytes".to_vec())
                .append_header("Content-Type", "image/png"),
        )
        .mount(&server)
        .await;

    let (bytes, content_type) = provider.fetch_thumbnail(&file("F1"), 64, None).await.unwrap();
    assert_eq!(bytes, b"png-bytes");
    assert_eq!(content_type, "image/png");
}
