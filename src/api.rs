//! Generative-text API interaction.
//!
//! The enhancer talks to its model through the [`AskAsync`] trait so tests
//! can substitute a canned responder. [`LlmClient`] is the live
//! implementation: one OpenAI-compatible `chat/completions` request per call.
//!
//! # Failure Policy
//!
//! Calls are never retried in place. A timeout, transport error, non-2xx
//! status or unexpected response body becomes an [`AskError`] and the caller
//! falls back to the unmodified article.

use crate::config::LlmConfig;
use crate::error::AskError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You are an expert tech news editor and SEO specialist. \
Reply with a single valid JSON object and nothing else.";

/// Trait for async LLM interaction.
///
/// Implementors send one prompt and return the model's raw reply.
pub trait AskAsync {
    /// The type of response returned by the model.
    type Response;

    async fn ask(&self, text: &str) -> Result<Self::Response, AskError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
#[derive(Debug, Clone)]
pub struct LlmClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

impl AskAsync for LlmClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, AskError> {
        let t0 = Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "LLM request failed");
                AskError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "LLM API error");
            return Err(AskError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AskError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AskError::Parse("response has no message content".into()))?;

        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = content.len(),
            "LLM call succeeded"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api_base: String) -> LlmConfig {
        LlmConfig {
            api_base,
            api_key: "sk-test".into(),
            model: "test-model".into(),
        }
    }

    #[tokio::test]
    async fn test_ask_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "response_format": {"type": "json_object"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "{\"seo_title\":\"T\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(&config(format!("{}/v1/", server.uri())));
        let reply = client.ask("rewrite this").await.unwrap();
        assert_eq!(reply, "{\"seo_title\":\"T\"}");
    }

    #[tokio::test]
    async fn test_ask_api_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::new(&config(server.uri()));
        let err = client.ask("x").await.unwrap_err();
        assert!(matches!(err, AskError::Api { status: 429, ref body } if body == "rate limited"));
    }

    #[tokio::test]
    async fn test_ask_without_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let client = LlmClient::new(&config(server.uri()));
        assert!(matches!(client.ask("x").await, Err(AskError::Parse(_))));
    }
}
