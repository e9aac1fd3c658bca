//! Model gateway
//!
//! One capability behind which every language-model call sits: send a
//! prompt, optionally with a response schema, get text plus token usage
//! back. Providers are a closed set chosen once at run start.

mod chat;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use chat::ChatGateway;

use crate::model::config::RunConfig;

/// Token counts reported by the provider for one completion.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A named JSON schema constraining the model's response.
#[derive(Debug, Clone)]
pub struct NamedSchema {
    pub name: &'static str,
    pub schema: Value,
}

impl NamedSchema {
    /// Build from a Rust type via schemars, fixed up for strict mode.
    pub fn of<T: schemars::JsonSchema>(name: &'static str) -> Self {
        Self {
            name,
            schema: schema::strict_schema_for::<T>(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub response_schema: Option<NamedSchema>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            response_schema: None,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_schema(mut self, schema: NamedSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network failure, timeout, rate limit or server error; worth retrying.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Auth, quota or request rejection; retrying cannot help.
    #[error("permanent provider failure: {0}")]
    Permanent(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Capability interface for completions.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GatewayError>;

    fn model(&self) -> &str;

    fn provider(&self) -> &str;
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
        }
    }
}

/// Issue a completion, retrying transient failures per the policy.
/// Permanent failures escalate immediately.
pub async fn complete_with_retry(
    gateway: &dyn ModelGateway,
    request: CompletionRequest,
    policy: &RetryPolicy,
) -> Result<Completion, GatewayError> {
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        match gateway.complete(request.clone()).await {
            Ok(completion) => {
                if attempt > 0 {
                    tracing::info!(
                        provider = gateway.provider(),
                        attempt = attempt,
                        "Completion succeeded after retry"
                    );
                }
                return Ok(completion);
            }
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay_ms = policy.initial_backoff_ms * (1 << attempt);
                tracing::warn!(
                    provider = gateway.provider(),
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay_ms,
                    error = %e,
                    "Transient gateway failure, retrying"
                );
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| GatewayError::Transient("retries exhausted".to_string())))
}

/// Strip a surrounding markdown code fence, if any, from model output.
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Build the configured provider's gateway.
pub fn create_gateway(config: &RunConfig) -> Result<Arc<dyn ModelGateway>, GatewayError> {
    let api_key = config
        .provider
        .api_key()
        .map_err(|e| GatewayError::Permanent(e.to_string()))?;
    let gateway = ChatGateway::new(config.provider, api_key, config)
        .map_err(|e| GatewayError::Permanent(e.to_string()))?;
    Ok(Arc::new(gateway))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyGateway {
        failures_before_success: u32,
        calls: AtomicU32,
        error_kind: fn(String) -> GatewayError,
    }

    #[async_trait]
    impl ModelGateway for FlakyGateway {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<Completion, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err((self.error_kind)(format!("failure {}", n + 1)))
            } else {
                Ok(Completion {
                    content: "{}".to_string(),
                    usage: TokenUsage::default(),
                })
            }
        }

        fn model(&self) -> &str {
            "test-model"
        }

        fn provider(&self) -> &str {
            "test"
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let gateway = FlakyGateway {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
            error_kind: GatewayError::Transient,
        };
        let policy = RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
        };
        let result =
            complete_with_retry(&gateway, CompletionRequest::new("s", "u"), &policy).await;
        assert!(result.is_ok());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let gateway = FlakyGateway {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
            error_kind: GatewayError::Transient,
        };
        let policy = RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
        };
        let result =
            complete_with_retry(&gateway, CompletionRequest::new("s", "u"), &policy).await;
        assert!(matches!(result, Err(GatewayError::Transient(_))));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_escalate_immediately() {
        let gateway = FlakyGateway {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
            error_kind: GatewayError::Permanent,
        };
        let policy = RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
        };
        let result =
            complete_with_retry(&gateway, CompletionRequest::new("s", "u"), &policy).await;
        assert!(matches!(result, Err(GatewayError::Permanent(_))));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }
}
