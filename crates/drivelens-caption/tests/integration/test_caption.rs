//! Integration tests for the captioning path

use drivelens_core::ports::captioner::{CaptionError, Captioner};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_caption_parses_structured_response() {
    let (server, captioner) = common::setup_model_mock().await;
    common::mount_caption(
        &server,
        "## Subjects\nA red bicycle.\n\n## Search Keywords\nbicycle, red, wall",
    )
    .await;

    let caption = captioner
        .caption(b"fake-jpeg", "image/jpeg")
        .await
        .expect("caption failed");

    assert!(caption.caption.contains("red bicycle"));
    assert!(caption.tags.contains(&"bicycle".to_string()));
    assert!(caption.tags.contains(&"wall".to_string()));
}

#[tokio::test]
async fn test_caption_falls_back_on_unstructured_response() {
    let (server, captioner) = common::setup_model_mock().await;
    common::mount_caption(&server, "Just a plain sentence about a mountain lake.").await;

    let caption = captioner
        .caption(b"fake-png", "image/png")
        .await
        .expect("caption failed");

    assert!(caption.caption.starts_with("Just a plain sentence"));
    assert!(caption.tags.contains(&"mountain".to_string()));
}

#[tokio::test]
async fn test_caption_sends_inline_image_and_prompt() {
    let (server, captioner) = common::setup_model_mock().await;

    // base64("fake-jpeg") appears in the request body alongside the prompt
    Mock::given(method("POST"))
        .and(path("/v1beta/models/cap-model:generateContent"))
        .and(body_string_contains("ZmFrZS1qcGVn"))
        .and(body_string_contains("Search Keywords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "a thing" }] } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    captioner
        .caption(b"fake-jpeg", "image/jpeg")
        .await
        .expect("caption failed");
}

#[tokio::test]
async fn test_caption_auth_failure_is_fatal_to_quota() {
    let (server, captioner) = common::setup_model_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/cap-model:generateContent"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = captioner
        .caption(b"fake", "image/jpeg")
        .await
        .unwrap_err();
    assert!(err.is_fatal_to_quota());
}

#[tokio::test]
async fn test_caption_server_error_is_transient() {
    let (server, captioner) = common::setup_model_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/cap-model:generateContent"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = captioner
        .caption(b"fake", "image/jpeg")
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_caption_empty_candidates_is_transient() {
    let (server, captioner) = common::setup_model_mock().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/cap-model:generateContent"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })),
        )
        .mount(&server)
        .await;

    let err = captioner
        .caption(b"fake", "image/jpeg")
        .await
        .unwrap_err();
    assert!(matches!(err, CaptionError::Transient(_)));
}
