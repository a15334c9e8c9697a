//! Wiremock integration tests for GeminiClient.
#![cfg(feature = "gemini")]

use std::sync::Arc;
use std::time::Duration;

use muninn::{CacheConfig, CachedFetcher, Fetcher, GeminiClient, MuninnError, RequestCache};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn answer(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_generate_parses_fenced_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test_key"))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "text": "Places in: Lyon to Geneva" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            "```json\n[{\"name\": \"Lyon\"}, {\"name\": \"Geneva\"}]\n```",
        )))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_base_url("test_key", mock_server.uri())
        .prompt_template("Places in: {text}");
    let value = client.generate("Lyon to Geneva").await.expect("generate should succeed");

    assert_eq!(value, json!([{"name": "Lyon"}, {"name": "Geneva"}]));
}

#[tokio::test]
async fn test_custom_model_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("plain words")))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_base_url("k", mock_server.uri()).model("gemini-1.5-pro");
    let value = client.fetch("anything").await.unwrap();
    assert_eq!(value, json!("plain words"));
}

#[tokio::test]
async fn test_rate_limited_with_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_base_url("k", mock_server.uri());
    let err = client.generate("x").await.unwrap_err();

    match err {
        MuninnError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(3)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_base_url("bad", mock_server.uri());
    let err = client.generate("x").await.unwrap_err();
    assert!(matches!(err, MuninnError::AuthenticationFailed));
}

#[tokio::test]
async fn test_model_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1beta/models/nope:generateContent"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_base_url("k", mock_server.uri()).model("nope");
    let err = client.generate("x").await.unwrap_err();
    assert!(matches!(err, MuninnError::ModelNotFound(ref m) if m == "nope"));
}

#[tokio::test]
async fn test_server_error_carries_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "code": 500, "message": "internal hiccup", "status": "INTERNAL" }
        })))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_base_url("k", mock_server.uri());
    let err = client.generate("x").await.unwrap_err();

    match err {
        MuninnError::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "internal hiccup");
        }
        other => panic!("expected Api, got {other:?}"),
    }
    assert!(
        MuninnError::Api {
            status: 500,
            message: String::new()
        }
        .is_transient()
    );
}

#[tokio::test]
async fn test_no_candidates_is_empty_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&mock_server)
        .await;

    let client = GeminiClient::with_base_url("k", mock_server.uri());
    let err = client.generate("x").await.unwrap_err();
    assert!(matches!(err, MuninnError::EmptyResponse));
}

#[tokio::test]
async fn test_cached_client_sends_one_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("{\"lat\": 48.85}")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let cache = Arc::new(RequestCache::new(
        CacheConfig::new().min_interval(Duration::ZERO),
    ));
    let fetcher = CachedFetcher::new(
        GeminiClient::with_base_url("k", mock_server.uri()),
        cache,
    );

    let first = fetcher.fetch("Paris").await.unwrap();
    let second = fetcher.fetch("  paris ").await.unwrap();
    assert_eq!(first, json!({"lat": 48.85}));
    assert_eq!(first, second);
}
