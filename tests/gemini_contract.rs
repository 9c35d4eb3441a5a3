//! Gemini client contract tests.
//!
//! Verify exact HTTP format compliance against a mock server: request
//! shape, auth header, response parsing, and error mapping.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use prompter::error::PrompterError;
use prompter::llm::{GeminiClient, GeminiConfig, GenerativeModel, ImagePayload};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new(
        GeminiConfig::new("test-key", "gemini-flash-lite-latest").with_base_url(server.uri()),
    )
}

fn text_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }] }
        }]
    }))
}

#[tokio::test]
async fn request_posts_prompt_with_api_key_header() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/v1beta/models/gemini-flash-lite-latest:generateContent",
        ))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "text": "what is a mutex" }] }]
        })))
        .respond_with(text_response("A mutex is a lock."))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client(&server).generate("what is a mutex").await.unwrap();
    assert_eq!(answer, "A mutex is a lock.");
}

#[tokio::test]
async fn multi_part_response_text_is_concatenated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Yes" }, { "text": ", it is." }] }
            }]
        })))
        .mount(&server)
        .await;

    let answer = client(&server).generate("is this technical").await.unwrap();
    assert_eq!(answer, "Yes, it is.");
}

#[tokio::test]
async fn image_request_carries_inline_base64_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "contents": [{
                "parts": [
                    { "text": "describe" },
                    { "inline_data": { "mime_type": "image/png", "data": "cG5nLWJ5dGVz" } }
                ]
            }]
        })))
        .respond_with(text_response("B"))
        .expect(1)
        .mount(&server)
        .await;

    let payload = ImagePayload {
        mime_type: "image/png".to_owned(),
        data: b"png-bytes".to_vec(),
    };
    let answer = client(&server)
        .generate_with_image("describe", &payload)
        .await
        .unwrap();
    assert_eq!(answer, "B");
}

#[tokio::test]
async fn http_error_maps_to_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exhausted"))
        .mount(&server)
        .await;

    let err = client(&server).generate("anything").await.unwrap_err();
    match err {
        PrompterError::Service(message) => {
            assert!(message.contains("429"));
            assert!(message.contains("quota exhausted"));
        }
        other => panic!("expected service error, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_candidates_map_to_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let err = client(&server).generate("anything").await.unwrap_err();
    assert!(matches!(err, PrompterError::Service(_)));
}

#[tokio::test]
async fn malformed_json_maps_to_service_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client(&server).generate("anything").await.unwrap_err();
    assert!(matches!(err, PrompterError::Service(_)));
}

#[tokio::test]
async fn classification_and_answer_share_one_endpoint() {
    // The two-stage pipeline reuses the same generateContent call; the
    // request count is the only difference.
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(
            "/v1beta/models/gemini-flash-lite-latest:generateContent",
        ))
        .respond_with(text_response("Yes"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    client.generate("first").await.unwrap();
    client.generate("second").await.unwrap();

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}
