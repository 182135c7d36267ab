use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use vigil_core::analysis::{
    AnalysisAdapter, AnalysisError, AnalysisRequest, GeminiApiClient, GeminiApiConfig,
};
use vigil_core::retry::{ErrorClass, RetryClassifiable};

const RULES: &str = "No shopping sites.";

fn client(server: &MockServer) -> GeminiApiClient {
    let mut config = GeminiApiConfig::new("test-key");
    config.base_url = format!("{}/v1beta/models", server.uri());
    config.timeout = Duration::from_secs(5);
    GeminiApiClient::new(config).unwrap()
}

fn write_images(dir: &TempDir, count: usize) -> Vec<std::path::PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.path().join(format!("shot_{i}.png"));
            std::fs::write(&path, format!("png-bytes-{i}")).unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn sends_prompt_and_images_and_returns_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "Editor open.\n" },
                    { "text": "VERDICT: ○\nActivity: coding" }
                ]}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let images = write_images(&dir, 2);
    let text = client(&server)
        .analyze(&AnalysisRequest {
            rules: RULES,
            model: "flash",
            images: &images,
        })
        .await
        .unwrap();

    assert_eq!(text, "Editor open.\nVERDICT: ○\nActivity: coding");

    let received = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&received[0].body).unwrap();
    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 3);
    assert!(parts[0]["text"].as_str().unwrap().contains(RULES));
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(
        parts[2]["inline_data"]["data"],
        BASE64.encode("png-bytes-1")
    );
}

#[tokio::test]
async fn rate_limit_carries_retry_delay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": 429,
                "message": "Resource has been exhausted (e.g. check quota).",
                "status": "RESOURCE_EXHAUSTED",
                "details": [
                    { "@type": "type.googleapis.com/google.rpc.QuotaFailure" },
                    {
                        "@type": "type.googleapis.com/google.rpc.RetryInfo",
                        "retryDelay": "24s"
                    }
                ]
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .analyze(&AnalysisRequest {
            rules: RULES,
            model: "gemini-2.5-flash",
            images: &[],
        })
        .await
        .unwrap_err();

    match &err {
        AnalysisError::RateLimited { retry_hint, .. } => {
            assert_eq!(retry_hint.as_deref(), Some("24s"));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(
        err.classify(),
        ErrorClass::RateLimited {
            retry_hint: Some("24s".to_string())
        }
    );
}

#[tokio::test]
async fn rate_limit_falls_back_to_retry_after_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .analyze(&AnalysisRequest {
            rules: RULES,
            model: "flash",
            images: &[],
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AnalysisError::RateLimited { retry_hint: Some(ref hint), .. } if hint == "7"
    ));
}

#[tokio::test]
async fn error_status_uses_service_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "API key not valid." }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .analyze(&AnalysisRequest {
            rules: RULES,
            model: "flash",
            images: &[],
        })
        .await
        .unwrap_err();

    match err {
        AnalysisError::Status { code, body } => {
            assert_eq!(code, 400);
            assert_eq!(body, "API key not valid.");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_image_fails_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let images = vec![dir.path().join("gone.png")];
    let err = client(&server)
        .analyze(&AnalysisRequest {
            rules: RULES,
            model: "flash",
            images: &images,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::ImageRead { .. }));
}
