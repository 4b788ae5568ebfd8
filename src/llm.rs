//! LLM client implementations.
//!
//! Concrete [`LlmClient`] backends:
//! - **[`GeminiClient`]**: `POST /v1beta/models/{model}:generateContent`.
//! - **[`OpenAiClient`]**: `POST /v1/chat/completions`.
//! - **[`DisabledClient`]**: fails every call; used when no provider is configured.
//!
//! Use [`create_client`] to pick one from `[llm]` configuration.
//!
//! # Retry Strategy
//!
//! Retries are opt-in through `llm.max_retries` (default 0):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Failures after the last attempt are
//! [`PipelineError::UpstreamUnavailable`]; a success response whose envelope
//! lacks the completion text is [`PipelineError::UpstreamFormat`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::{json, Value};

use reqtrace_core::error::{PipelineError, Result};
use reqtrace_core::llm::{LlmClient, LlmRequest};

use crate::config::LlmConfig;

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_URL: &str = "https://api.openai.com";

/// Connection settings shared by the HTTP clients.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub temperature: f64,
}

impl HttpSettings {
    fn from_config(config: &LlmConfig, default_url: &str) -> Self {
        Self {
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| default_url.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            temperature: config.temperature,
        }
    }
}

/// POST `body` and return the parsed JSON response, retrying transient failures.
async fn post_json(
    provider: &str,
    settings: &HttpSettings,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let builder = request.try_clone().ok_or_else(|| {
            PipelineError::Internal(anyhow::anyhow!("{} request is not cloneable", provider))
        })?;

        match builder.json(body).send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json::<Value>().await.map_err(|e| {
                        PipelineError::UpstreamFormat(format!(
                            "{} returned an unreadable body: {}",
                            provider, e
                        ))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = format!("{} API error {}: {}", provider, status, body_text);

                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(provider, %status, attempt, "transient llm error");
                    last_err = Some(err);
                    continue;
                }

                return Err(PipelineError::UpstreamUnavailable(err));
            }
            Err(e) => {
                tracing::warn!(provider, error = %e, attempt, "llm request failed");
                last_err = Some(format!("{} request failed: {}", provider, e));
            }
        }
    }

    Err(PipelineError::UpstreamUnavailable(last_err.unwrap_or_else(
        || format!("{} call failed after retries", provider),
    )))
}

/// Built once per provider instance and shared by every call it makes.
fn http_client(settings: &HttpSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(|e| PipelineError::Internal(e.into()))
}

// ============ Gemini ============

pub struct GeminiClient {
    model: String,
    api_key: Option<String>,
    settings: HttpSettings,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        settings: HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            api_key,
            client: http_client(&settings)?,
            settings,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.resolved_model(),
            std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            HttpSettings::from_config(config, GEMINI_URL),
        )
    }
}

/// Concatenate `candidates[0].content.parts[*].text`.
pub fn parse_gemini_response(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            PipelineError::UpstreamFormat("Gemini response has no candidate parts".to_string())
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(PipelineError::UpstreamFormat(
            "Gemini response has no text".to_string(),
        ));
    }
    Ok(text)
}

#[async_trait]
impl LlmClient for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PipelineError::UpstreamUnavailable("GEMINI_API_KEY is not set".to_string())
        })?;

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": { "temperature": self.settings.temperature },
        });
        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url, self.model
        );
        let builder = self.client.post(url).query(&[("key", api_key)]);
        let json = post_json("Gemini", &self.settings, builder, &body).await?;
        parse_gemini_response(&json)
    }
}

// ============ OpenAI ============

pub struct OpenAiClient {
    model: String,
    api_key: Option<String>,
    settings: HttpSettings,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
        settings: HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            api_key,
            client: http_client(&settings)?,
            settings,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.resolved_model(),
            std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            HttpSettings::from_config(config, OPENAI_URL),
        )
    }
}

/// Extract `choices[0].message.content`.
pub fn parse_openai_response(json: &Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            PipelineError::UpstreamFormat("OpenAI response has no message content".to_string())
        })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PipelineError::UpstreamUnavailable("OPENAI_API_KEY is not set".to_string())
        })?;

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.settings.temperature,
        });

        let url = format!("{}/v1/chat/completions", self.settings.base_url);
        let builder = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key));
        let json = post_json("OpenAI", &self.settings, builder, &body).await?;
        parse_openai_response(&json)
    }
}

// ============ Disabled ============

pub struct DisabledClient;

#[async_trait]
impl LlmClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &LlmRequest) -> Result<String> {
        Err(PipelineError::UpstreamUnavailable(
            "LLM provider is disabled".to_string(),
        ))
    }
}

/// Build the client selected by `config.provider`.
pub fn create_client(config: &LlmConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::from_config(config)?)),
        "openai" => Ok(Arc::new(OpenAiClient::from_config(config)?)),
        "disabled" => Ok(Arc::new(DisabledClient)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings(base_url: String, max_retries: u32) -> HttpSettings {
        HttpSettings {
            base_url,
            timeout: Duration::from_secs(5),
            max_retries,
            temperature: 0.2,
        }
    }

    /// Serves `/v1/chat/completions`, failing with 503 for the first `failures` calls.
    async fn mock_openai(failures: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
                    }
                    let echoed = body["messages"][1]["content"].as_str().unwrap_or("").to_string();
                    (
                        StatusCode::OK,
                        Json(json!({ "choices": [{ "message": { "content": echoed } }] })),
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    #[test]
    fn gemini_parts_are_concatenated() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "{\"a\":1}");
        assert!(matches!(
            parse_gemini_response(&json!({ "candidates": [] })),
            Err(PipelineError::UpstreamFormat(_))
        ));
    }

    #[test]
    fn openai_content_is_extracted() {
        let json = json!({ "choices": [{ "message": { "content": "hello" } }] });
        assert_eq!(parse_openai_response(&json).unwrap(), "hello");
        assert!(parse_openai_response(&json!({ "choices": [] })).is_err());
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let client = GeminiClient::new("gemini-2.0-flash", None, settings(GEMINI_URL.into(), 0))
            .unwrap();
        let err = client.complete(&LlmRequest::new("hi")).await.unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn disabled_client_is_unavailable() {
        let client = create_client(&LlmConfig {
            provider: "disabled".into(),
            ..LlmConfig::default()
        })
        .unwrap();
        assert_eq!(client.model_name(), "disabled");
        assert!(matches!(
            client.complete(&LlmRequest::new("hi")).await,
            Err(PipelineError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn server_errors_fail_without_retries() {
        let (url, calls) = mock_openai(1).await;
        let client = OpenAiClient::new("gpt-4o-mini", Some("test".into()), settings(url, 0)).unwrap();
        let err = client
            .complete(&LlmRequest::new("ping").with_system("sys"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UpstreamUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_errors_are_retried_when_configured() {
        let (url, calls) = mock_openai(1).await;
        let client = OpenAiClient::new("gpt-4o-mini", Some("test".into()), settings(url, 1)).unwrap();
        let text = client
            .complete(&LlmRequest::new("ping").with_system("sys"))
            .await
            .unwrap();
        assert_eq!(text, "ping");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_instance_serves_sequential_calls() {
        let (url, calls) = mock_openai(0).await;
        let client = OpenAiClient::new("gpt-4o-mini", Some("test".into()), settings(url, 0)).unwrap();
        for prompt in ["first", "second"] {
            let text = client
                .complete(&LlmRequest::new(prompt).with_system("sys"))
                .await
                .unwrap();
            assert_eq!(text, prompt);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
