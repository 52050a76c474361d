//! Gateway + Gemini provider against a local fake of the generateContent API.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vantage_core::{BoundedSemaphore, LlmConfig, RetryPolicy};
use vantage_llm::{AnalysisGateway, GeminiProvider, InlineImage, LlmError, StructuredRequest};

#[derive(Default)]
struct FakeGemini {
    replies: Mutex<VecDeque<(StatusCode, Value)>>,
    requests: Mutex<Vec<(Option<String>, Value)>>,
}

async fn generate_content(
    State(fake): State<Arc<FakeGemini>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let key = headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    fake.requests.lock().unwrap().push((key, body));
    let (status, reply) = fake
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, json!({"error": {"message": "no reply scripted"}})));
    (status, Json(reply))
}

async fn spawn_fake(replies: Vec<(StatusCode, Value)>) -> (Arc<FakeGemini>, String) {
    let fake = Arc::new(FakeGemini {
        replies: Mutex::new(replies.into()),
        requests: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/models/*rest", post(generate_content))
        .with_state(Arc::clone(&fake));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve fake");
    });

    (fake, format!("http://{addr}"))
}

fn candidate(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

fn gateway(base_url: String) -> AnalysisGateway {
    let config = LlmConfig {
        api_key: Some("fake-key".to_string()),
        base_url,
        request_timeout_secs: 10,
        ..LlmConfig::default()
    };
    let provider = GeminiProvider::from_config(&config).expect("provider");
    AnalysisGateway::new(
        Arc::new(provider),
        BoundedSemaphore::new("analysis", 2),
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(200),
        },
    )
}

fn request() -> StructuredRequest {
    StructuredRequest::new(
        "You are a visual design auditor.",
        "Evaluate the attached screenshot.",
        json!({"type": "OBJECT", "properties": {"Score": {"type": "NUMBER"}}, "required": ["Score"]}),
    )
    .with_image(InlineImage::jpeg("/9j/4A=="))
}

#[tokio::test]
async fn test_round_trip_sends_schema_image_and_key() {
    let (fake, base_url) = spawn_fake(vec![(StatusCode::OK, candidate(r#"{"Score": 9}"#))]).await;

    let value = gateway(base_url)
        .generate(&request())
        .await
        .expect("generate");
    assert_eq!(value, json!({"Score": 9}));

    let requests = fake.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (key, body) = &requests[0];
    assert_eq!(key.as_deref(), Some("fake-key"));
    assert_eq!(body["contents"][0]["parts"][0]["inlineData"]["data"], "/9j/4A==");
    assert_eq!(body["generationConfig"]["responseSchema"]["required"][0], "Score");
}

#[tokio::test]
async fn test_rate_limit_with_hint_is_retried() {
    let (fake, base_url) = spawn_fake(vec![
        (
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": {"code": 429, "message": "Quota exceeded. Please retry in 0.1s.", "status": "RESOURCE_EXHAUSTED"}}),
        ),
        (StatusCode::OK, candidate("```json\n{\"Score\": 4}\n```")),
    ])
    .await;

    let started = std::time::Instant::now();
    let value = gateway(base_url)
        .generate(&request())
        .await
        .expect("generate after retry");

    assert_eq!(value["Score"], 4);
    assert_eq!(fake.requests.lock().unwrap().len(), 2);
    // Hinted 0.1s plus one second of padding.
    assert!(started.elapsed() >= Duration::from_millis(1100));
}

#[tokio::test]
async fn test_bad_request_fails_without_retry() {
    let (fake, base_url) = spawn_fake(vec![(
        StatusCode::BAD_REQUEST,
        json!({"error": {"code": 400, "message": "Invalid JSON payload", "status": "INVALID_ARGUMENT"}}),
    )])
    .await;

    let err = gateway(base_url)
        .generate(&request())
        .await
        .expect_err("fatal");

    match err {
        LlmError::ApiError { status, message, .. } => {
            assert_eq!(status, 400);
            assert!(message.contains("INVALID_ARGUMENT"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(fake.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_safety_block_surfaces_empty_response() {
    let (_fake, base_url) = spawn_fake(vec![(
        StatusCode::OK,
        json!({"promptFeedback": {"blockReason": "OTHER"}}),
    )])
    .await;

    let err = gateway(base_url)
        .generate(&request())
        .await
        .expect_err("blocked");
    assert!(matches!(err, LlmError::EmptyResponse { reason: Some(ref r) } if r == "OTHER"));
}
