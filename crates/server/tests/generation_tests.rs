//! Tests for the generative client and the model fallback chain, against a
//! mocked backend.

use outreach_pipeline::config::{GenerationConfig, StorageConfig};
use outreach_pipeline::error::GenerationError;
use outreach_pipeline::generation::ContentGenerator;
use outreach_pipeline::ratelimit::CredentialLimiter;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn generation_config(api_base: &str, models: &[&str]) -> GenerationConfig {
    GenerationConfig {
        api_base: api_base.to_string(),
        api_keys: vec!["test-key".to_string()],
        models: models.iter().map(|m| m.to_string()).collect(),
        requests_per_minute: 1000,
        max_in_flight: 4,
        inline_attachment_limit: 15 * 1024 * 1024,
    }
}

fn storage_config() -> StorageConfig {
    StorageConfig {
        api_base: "http://storage.invalid".to_string(),
    }
}

fn generation_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    }))
}

fn limiter() -> CredentialLimiter {
    CredentialLimiter::new("test-key".to_string(), 1000, 4)
}

#[tokio::test]
async fn throttled_model_advances_to_the_next_one() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/model-pro:generateContent"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/model-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .respond_with(generation_response("Dear Professor Smith, ..."))
        .expect(1)
        .mount(&server)
        .await;

    let generator = ContentGenerator::new(
        reqwest::Client::new(),
        &generation_config(&server.uri(), &["model-pro", "model-flash"]),
        storage_config(),
    );
    let text = generator
        .generate_text(&limiter(), "write an email".to_string())
        .await
        .expect("fallback model should answer");
    assert_eq!(text, "Dear Professor Smith, ...");
}

#[tokio::test]
async fn fallback_re_sends_the_identical_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/model-pro:generateContent"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/model-flash:generateContent"))
        .respond_with(generation_response("ok"))
        .mount(&server)
        .await;

    let generator = ContentGenerator::new(
        reqwest::Client::new(),
        &generation_config(&server.uri(), &["model-pro", "model-flash"]),
        storage_config(),
    );
    generator
        .generate_text(&limiter(), "the one true prompt".to_string())
        .await
        .expect("fallback model should answer");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
    assert_ne!(requests[0].url.path(), requests[1].url.path());
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn exhausted_chain_surfaces_the_last_throttle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let generator = ContentGenerator::new(
        reqwest::Client::new(),
        &generation_config(&server.uri(), &["model-pro", "model-flash"]),
        storage_config(),
    );
    let err = generator
        .generate_text(&limiter(), "prompt".to_string())
        .await
        .unwrap_err();
    match err {
        GenerationError::Throttled { model } => assert_eq!(model, "model-flash"),
        other => panic!("expected throttle, got {other:?}"),
    }
}

#[tokio::test]
async fn non_throttle_errors_do_not_advance_the_chain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/model-pro:generateContent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/model-flash:generateContent"))
        .respond_with(generation_response("never reached"))
        .expect(0)
        .mount(&server)
        .await;

    let generator = ContentGenerator::new(
        reqwest::Client::new(),
        &generation_config(&server.uri(), &["model-pro", "model-flash"]),
        storage_config(),
    );
    let err = generator
        .generate_text(&limiter(), "prompt".to_string())
        .await
        .unwrap_err();
    match err {
        GenerationError::Http { status, context } => {
            assert_eq!(status.as_u16(), 500);
            assert!(context.contains("backend exploded"));
        }
        other => panic!("expected http error, got {other:?}"),
    }
}

#[tokio::test]
async fn blank_candidates_are_an_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let generator = ContentGenerator::new(
        reqwest::Client::new(),
        &generation_config(&server.uri(), &["model-pro"]),
        storage_config(),
    );
    let err = generator
        .generate_text(&limiter(), "prompt".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::EmptyResponse));
}

#[tokio::test]
async fn empty_model_chain_is_rejected_up_front() {
    let generator = ContentGenerator::new(
        reqwest::Client::new(),
        &generation_config("http://backend.invalid", &[]),
        storage_config(),
    );
    let err = generator
        .generate_text(&limiter(), "prompt".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::NoModels));
}
