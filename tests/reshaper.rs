//! Responses reshaper against a mocked endpoint.

use std::time::Duration;

use page2deck::{extract_markdown, DeckError, Reshaper, ResponsesReshaper};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn reshaper(server: &MockServer) -> ResponsesReshaper {
    ResponsesReshaper::new(server.uri(), "sk-test", "gpt-5-mini", Duration::from_secs(5))
        .unwrap()
        .with_prompt("make slides")
}

fn message(parts: &[&str]) -> Value {
    let content: Vec<Value> = parts
        .iter()
        .map(|t| json!({ "type": "output_text", "text": t }))
        .collect();
    json!({
        "output": [
            { "type": "reasoning", "summary": [] },
            { "type": "message", "role": "assistant", "content": content }
        ],
        "usage": { "input_tokens": 120, "output_tokens": 40 }
    })
}

#[tokio::test]
async fn returns_joined_message_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(message(&["```markdown\n# Deck", "---\n# Two\n```"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let raw = reshaper(&server).reshape("# Doc\n\ntext\n").await.unwrap();
    assert_eq!(raw, "```markdown\n# Deck\n---\n# Two\n```");
    assert_eq!(extract_markdown(&raw), "# Deck\n---\n# Two");
}

#[tokio::test]
async fn request_carries_model_prompt_and_document() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message(&["# ok"])))
        .mount(&server)
        .await;

    reshaper(&server).reshape("# Doc").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-5-mini");
    assert_eq!(body["input"][0]["role"], "developer");
    assert_eq!(body["input"][0]["content"], "make slides");
    assert_eq!(body["input"][1]["role"], "user");
    assert_eq!(body["input"][1]["content"], "# Doc");
}

#[tokio::test]
async fn http_error_carries_status_and_api_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": { "message": "Rate limit reached", "type": "requests" }
        })))
        .mount(&server)
        .await;

    match reshaper(&server).reshape("# Doc").await {
        Err(DeckError::ReshaperHttp { status, message }) => {
            assert_eq!(status, 429);
            assert_eq!(message, "Rate limit reached");
        }
        other => panic!("expected ReshaperHttp, got {other:?}"),
    }
}

#[tokio::test]
async fn http_error_without_json_body_still_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    match reshaper(&server).reshape("# Doc").await {
        Err(DeckError::ReshaperHttp { status, message }) => {
            assert_eq!(status, 503);
            assert_eq!(message, "Unknown");
        }
        other => panic!("expected ReshaperHttp, got {other:?}"),
    }
}

#[tokio::test]
async fn success_without_text_is_empty_not_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": [{ "type": "reasoning", "summary": [] }]
        })))
        .mount(&server)
        .await;

    let err = reshaper(&server).reshape("# Doc").await.unwrap_err();
    assert!(matches!(err, DeckError::ReshaperEmpty), "got: {err:?}");
}

#[tokio::test]
async fn whitespace_only_text_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message(&["  \n "])))
        .mount(&server)
        .await;

    let err = reshaper(&server).reshape("# Doc").await.unwrap_err();
    assert!(matches!(err, DeckError::ReshaperEmpty), "got: {err:?}");
}

#[tokio::test]
async fn top_level_text_value_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "text": { "value": "# Fallback" } })),
        )
        .mount(&server)
        .await;

    assert_eq!(reshaper(&server).reshape("# Doc").await.unwrap(), "# Fallback");
}
