//! OpenAI chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use relay_common::{Completion, InferOptions, InferenceBackend, InferenceFailure, Usage};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;

/// Backend calling `POST {base_url}/v1/chat/completions`.
pub struct OpenAiBackend {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    default_max_tokens: u32,
    default_temperature: f32,
}

impl OpenAiBackend {
    pub fn new(config: &OpenAiConfig) -> Self {
        if config.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; every process call will fail");
        }
        Self {
            http_client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            default_max_tokens: config.default_max_tokens,
            default_temperature: config.default_temperature,
        }
    }
}

/// Rough token count: four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

// ============================================================================
// OpenAI API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// InferenceBackend implementation
// ============================================================================

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn process(
        &self,
        prompt: &str,
        model: &str,
        options: &InferOptions,
    ) -> Result<Completion, InferenceFailure> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            InferenceFailure::Misconfigured("OpenAI API key not configured".to_string())
        })?;

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: options.max_tokens.unwrap_or(self.default_max_tokens),
            temperature: options.temperature.unwrap_or(self.default_temperature),
            top_p: options.top_p,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceFailure::Timeout
                } else {
                    tracing::error!("OpenAI request failed: {}", e);
                    InferenceFailure::Provider(format!("Inference failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            tracing::error!(status = %status.as_u16(), "OpenAI API error: {}", message);
            return Err(InferenceFailure::Provider(format!(
                "OpenAI API error: {}",
                message
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                InferenceFailure::Timeout
            } else {
                InferenceFailure::Provider(format!("Inference failed: {}", e))
            }
        })?;

        let completion = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                InferenceFailure::Provider("Inference failed: response had no choices".to_string())
            })?;

        let usage = body.usage.unwrap_or_else(|| {
            Usage::new(estimate_tokens(prompt), estimate_tokens(&completion))
        });

        Ok(Completion::new(completion, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_misconfigured() {
        let backend = OpenAiBackend::new(&OpenAiConfig::default());
        let err = backend
            .process("hi", "gpt-3.5-turbo", &InferOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            InferenceFailure::Misconfigured("OpenAI API key not configured".to_string())
        );
    }

    #[test]
    fn test_request_applies_defaults_and_forwards_top_p() {
        let request = ChatRequest {
            model: "gpt-4",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            max_tokens: 150,
            temperature: 0.7,
            top_p: Some(0.9),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("top_p").is_some());
    }
}
