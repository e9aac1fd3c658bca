//! OpenAI-compatible chat completions gateway
//!
//! Both supported providers speak the same chat completions wire format;
//! they differ only in base URL, credentials and extra headers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use super::{Completion, CompletionRequest, GatewayError, ModelGateway, TokenUsage};
use crate::model::config::{ProviderKind, RunConfig};

/// Gateway for OpenAI-compatible chat completion endpoints.
pub struct ChatGateway {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
    provider: ProviderKind,
}

impl ChatGateway {
    pub fn new(
        provider: ProviderKind,
        api_key: String,
        config: &RunConfig,
    ) -> Result<Self, GatewayError> {
        let base_url = Url::parse(provider.base_url())
            .map_err(|e| GatewayError::Permanent(format!("invalid base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.resolved_model().to_string(),
            provider,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.as_str().trim_end_matches('/'))
    }

    fn classify_status(status: StatusCode, body: String) -> GatewayError {
        let message = format!("status {}: {}", status, body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::PAYMENT_REQUIRED => {
                GatewayError::Permanent(message)
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                GatewayError::Transient(message)
            }
            s if s.is_server_error() => GatewayError::Transient(message),
            _ => GatewayError::Permanent(message),
        }
    }
}

#[async_trait]
impl ModelGateway for ChatGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GatewayError> {
        let response_format = match &request.response_schema {
            Some(named) => Some(json!({
                "type": "json_schema",
                "json_schema": {
                    "name": named.name,
                    "strict": true,
                    "schema": named.schema,
                }
            })),
            None => None,
        };

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format,
        };

        let start_time = std::time::Instant::now();

        let mut http_request = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        for (name, value) in self.provider.extra_headers() {
            http_request = http_request.header(*name, *value);
        }

        let response = http_request.json(&body).send().await.map_err(|e| {
            tracing::warn!(provider = self.provider.name(), error = %e, "Chat request failed");
            GatewayError::Transient(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!(
                provider = self.provider.name(),
                status = status.as_u16(),
                "Chat completion returned error status"
            );
            return Err(Self::classify_status(status, error_body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("failed to parse response: {}", e)))?;

        let usage = parsed.usage.unwrap_or_default();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GatewayError::Transient("response contained no choices".to_string()))?;

        tracing::debug!(
            provider = self.provider.name(),
            model = %self.model,
            elapsed_ms = start_time.elapsed().as_millis(),
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "Chat completion succeeded"
        );

        Ok(Completion { content, usage })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        self.provider.name()
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ChatGateway::classify_status(StatusCode::UNAUTHORIZED, String::new()),
            GatewayError::Permanent(_)
        ));
        assert!(matches!(
            ChatGateway::classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            GatewayError::Transient(_)
        ));
        assert!(matches!(
            ChatGateway::classify_status(StatusCode::BAD_GATEWAY, String::new()),
            GatewayError::Transient(_)
        ));
        assert!(matches!(
            ChatGateway::classify_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            GatewayError::Permanent(_)
        ));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "{\"ok\": true}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "{\"ok\": true}");
        assert_eq!(parsed.usage.unwrap().total_tokens, 17);
    }
}
