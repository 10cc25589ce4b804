//! Integration tests for the embedding path

use drivelens_core::ports::captioner::{CaptionError, Captioner};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_embed_returns_vector() {
    let (server, captioner) = common::setup_model_mock().await;
    common::mount_embed(&server, vec![0.1; common::DIM]).await;

    let vector = captioner.embed("red bicycle").await.expect("embed failed");
    assert_eq!(vector.len(), common::DIM);
}

#[tokio::test]
async fn test_embed_normalizes_before_submission() {
    let (server, captioner) = common::setup_model_mock().await;

    // Mixed case and doubled whitespace arrive at the API normalized.
    Mock::given(method("POST"))
        .and(path("/v1beta/models/emb-model:embedContent"))
        .and(body_string_contains("red bicycle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embedding": { "values": vec![0.5_f32; common::DIM] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    captioner.embed("RED  Bicycle").await.expect("embed failed");
}

#[tokio::test]
async fn test_embed_caption_joins_tags() {
    let (server, captioner) = common::setup_model_mock().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/emb-model:embedContent"))
        .and(body_string_contains("a red bicycle bicycle red wall"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embedding": { "values": vec![0.5_f32; common::DIM] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    captioner
        .embed_caption(
            "A red bicycle",
            &["bicycle".to_string(), "red".to_string(), "wall".to_string()],
        )
        .await
        .expect("embed failed");
}

#[tokio::test]
async fn test_empty_embedding_is_typed() {
    let (server, captioner) = common::setup_model_mock().await;
    common::mount_embed(&server, vec![]).await;

    let err = captioner.embed("anything").await.unwrap_err();
    assert!(matches!(err, CaptionError::EmptyEmbedding));
}

#[tokio::test]
async fn test_dimension_mismatch_is_typed() {
    let (server, captioner) = common::setup_model_mock().await;
    common::mount_embed(&server, vec![0.1; common::DIM + 3]).await;

    let err = captioner.embed("anything").await.unwrap_err();
    assert!(matches!(
        err,
        CaptionError::DimensionMismatch { expected, got }
            if expected == common::DIM && got == common::DIM + 3
    ));
}
