//! Content reshaper: document Markdown → slide Markdown via an LLM.
//!
//! Two implementations share the [`Reshaper`] seam:
//!
//! - [`ResponsesReshaper`] talks to an OpenAI-style Responses endpoint
//!   directly, so an HTTP failure ([`DeckError::ReshaperHttp`]) stays
//!   distinguishable from a successful call that carried no text
//!   ([`DeckError::ReshaperEmpty`]).
//! - [`ProviderReshaper`] goes through any `edgequake_llm` provider, for
//!   users who already configure Anthropic, Gemini, Ollama, … that way.
//!
//! Both return the raw model text; fence stripping happens afterwards in
//! [`crate::pipeline::fence`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, LLMProvider, ProviderFactory};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ExportConfig;
use crate::error::DeckError;
use crate::prompts::DEFAULT_RESHAPE_PROMPT;

/// Turns document Markdown into slide Markdown.
#[async_trait]
pub trait Reshaper: Send + Sync {
    /// Raw model output for `markdown`. Blank output is an error.
    async fn reshape(&self, markdown: &str) -> Result<String, DeckError>;

    /// Short label for logs, e.g. `responses:gpt-5-mini`.
    fn describe(&self) -> String;
}

// ── Responses endpoint ───────────────────────────────────────────────────

/// Client for `POST {base}/v1/responses`.
#[derive(Debug, Clone)]
pub struct ResponsesReshaper {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    prompt: String,
}

impl ResponsesReshaper {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeckError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeckError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            prompt: DEFAULT_RESHAPE_PROMPT.to_string(),
        })
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

#[async_trait]
impl Reshaper for ResponsesReshaper {
    async fn reshape(&self, markdown: &str) -> Result<String, DeckError> {
        let body = json!({
            "model": self.model,
            "input": [
                { "role": "developer", "content": self.prompt },
                { "role": "user", "content": markdown },
            ],
        });

        let start = Instant::now();
        let response = self
            .client
            .post(format!("{}/v1/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeckError::ReshaperTransport {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeckError::ReshaperHttp {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| DeckError::ReshaperTransport {
                detail: format!("unreadable response body: {e}"),
            })?;

        if let Some(usage) = data.get("usage") {
            debug!(
                "Reshaper usage: {} in / {} out",
                usage["input_tokens"], usage["output_tokens"]
            );
        }

        let text = extract_response_text(&data)
            .filter(|t| !t.trim().is_empty())
            .ok_or(DeckError::ReshaperEmpty)?;
        info!(
            "Reshaped {} → {} bytes in {:?}",
            markdown.len(),
            text.len(),
            start.elapsed()
        );
        Ok(text)
    }

    fn describe(&self) -> String {
        format!("responses:{}", self.model)
    }
}

/// `error.message` from an API error body, or the body itself.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                "Unknown".to_string()
            } else {
                body.chars().take(300).collect()
            }
        })
}

/// Pull the model's text out of a Responses payload.
///
/// Tried in order:
/// 1. the first `output[]` item of type `message`: its `output_text` parts,
///    joined with `\n`;
/// 2. a top-level `text.value` or `text` string;
/// 3. the first string `text` in any `output[].content[]`.
pub fn extract_response_text(data: &Value) -> Option<String> {
    let outputs = data
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let message = outputs
        .iter()
        .find(|o| o.get("type").and_then(Value::as_str) == Some("message"));
    if let Some(content) = message.and_then(|m| m.get("content")).and_then(Value::as_array) {
        let pieces: Vec<&str> = content
            .iter()
            .filter(|c| c.get("type").and_then(Value::as_str) == Some("output_text"))
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .collect();
        if !pieces.is_empty() {
            return Some(pieces.join("\n"));
        }
    }

    if let Some(text) = data.get("text") {
        if let Some(value) = text.get("value").and_then(Value::as_str) {
            return Some(value.to_string());
        }
        if let Some(s) = text.as_str() {
            return Some(s.to_string());
        }
    }

    outputs
        .iter()
        .filter_map(|o| o.get("content").and_then(Value::as_array))
        .find_map(|content| {
            content
                .iter()
                .find_map(|c| c.get("text").and_then(Value::as_str))
        })
        .map(str::to_string)
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// Reshaper backed by any [`LLMProvider`].
pub struct ProviderReshaper {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    label: String,
}

impl ProviderReshaper {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            prompt: DEFAULT_RESHAPE_PROMPT.to_string(),
            label: "custom".to_string(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Name shown in logs.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl Reshaper for ProviderReshaper {
    async fn reshape(&self, markdown: &str) -> Result<String, DeckError> {
        let messages = vec![ChatMessage::system(&self.prompt), ChatMessage::user(markdown)];

        let start = Instant::now();
        let response = self
            .provider
            .chat(&messages, None)
            .await
            .map_err(|e| DeckError::ReshaperTransport {
                detail: e.to_string(),
            })?;
        debug!(
            "Reshaper: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(DeckError::ReshaperEmpty);
        }
        Ok(response.content)
    }

    fn describe(&self) -> String {
        format!("provider:{}", self.label)
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// Pick the reshaper for `config`, most specific first:
///
/// 1. a pre-built provider (`config.provider`);
/// 2. a named provider (`config.provider_name`), created with `config.model`;
/// 3. the Responses endpoint with `credentials.reshaper_key`.
pub fn resolve_reshaper(config: &ExportConfig) -> Result<Arc<dyn Reshaper>, DeckError> {
    let prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_RESHAPE_PROMPT);

    if let Some(provider) = &config.provider {
        return Ok(Arc::new(
            ProviderReshaper::new(Arc::clone(provider)).with_prompt(prompt),
        ));
    }

    if let Some(name) = &config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            DeckError::ProviderNotConfigured {
                provider: name.clone(),
                hint: e.to_string(),
            }
        })?;
        return Ok(Arc::new(
            ProviderReshaper::new(provider)
                .with_prompt(prompt)
                .with_label(format!("{name}:{}", config.model)),
        ));
    }

    let key = config
        .credentials
        .reshaper_key()
        .ok_or(DeckError::MissingCredential {
            name: "reshaper_key",
        })?;
    let reshaper = ResponsesReshaper::new(
        &config.reshaper_base_url,
        key,
        &config.model,
        Duration::from_secs(config.api_timeout_secs),
    )?
    .with_prompt(prompt);
    Ok(Arc::new(reshaper))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_output_text_parts_are_joined() {
        let data = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "---\nmarp: true" },
                    { "type": "refusal", "refusal": "no" },
                    { "type": "output_text", "text": "---\n# Deck" }
                ] }
            ]
        });
        assert_eq!(
            extract_response_text(&data).as_deref(),
            Some("---\nmarp: true\n---\n# Deck")
        );
    }

    #[test]
    fn text_value_then_text_string() {
        assert_eq!(
            extract_response_text(&json!({ "text": { "value": "A" } })).as_deref(),
            Some("A")
        );
        assert_eq!(
            extract_response_text(&json!({ "text": "B" })).as_deref(),
            Some("B")
        );
    }

    #[test]
    fn falls_back_to_any_content_text() {
        let data = json!({
            "output": [
                { "type": "custom", "content": [ { "kind": "x" }, { "text": "C" } ] }
            ]
        });
        assert_eq!(extract_response_text(&data).as_deref(), Some("C"));
    }

    #[test]
    fn message_wins_over_top_level_text() {
        let data = json!({
            "text": { "format": { "type": "text" } },
            "output": [ { "type": "message", "content": [ { "type": "output_text", "text": "M" } ] } ]
        });
        assert_eq!(extract_response_text(&data).as_deref(), Some("M"));
    }

    #[test]
    fn nothing_extractable() {
        assert_eq!(extract_response_text(&json!({})), None);
        assert_eq!(
            extract_response_text(&json!({ "output": [ { "type": "message", "content": [] } ] })),
            None
        );
    }

    #[test]
    fn api_error_message_reads_error_field() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#),
            "Incorrect API key provided"
        );
        assert_eq!(api_error_message(""), "Unknown");
        assert_eq!(api_error_message("upstream down"), "upstream down");
    }

    #[test]
    fn resolve_without_key_or_provider_is_a_credential_error() {
        let config = ExportConfig::builder()
            .document_token("secret_x")
            .build()
            .unwrap();
        let err = resolve_reshaper(&config).err().unwrap();
        assert!(matches!(
            err,
            DeckError::MissingCredential {
                name: "reshaper_key"
            }
        ));
    }

    #[test]
    fn resolve_with_key_uses_responses_endpoint() {
        let config = ExportConfig::builder()
            .document_token("secret_x")
            .reshaper_key("sk-test")
            .model("gpt-5-mini")
            .build()
            .unwrap();
        let reshaper = resolve_reshaper(&config).unwrap();
        assert_eq!(reshaper.describe(), "responses:gpt-5-mini");
    }
}
