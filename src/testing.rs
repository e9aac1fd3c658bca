//! Test support: a scripted model gateway
//!
//! Responses are routed by substring match on the user prompt, so tests stay
//! deterministic even when extraction calls run concurrently. Each rule
//! holds a queue; matching pops the front.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::gateway::{Completion, CompletionRequest, GatewayError, ModelGateway, TokenUsage};

struct MockRule {
    pattern: String,
    responses: VecDeque<Result<Completion, GatewayError>>,
}

pub struct MockGateway {
    rules: Mutex<Vec<MockRule>>,
    pub calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a response for prompts containing `pattern`. Rules are tried in
    /// insertion order; repeated patterns extend the same queue.
    pub fn on(self, pattern: &str, response: Result<Completion, GatewayError>) -> Self {
        {
            let mut rules = self.rules.lock().expect("mock rules poisoned");
            if let Some(rule) = rules.iter_mut().find(|r| r.pattern == pattern) {
                rule.responses.push_back(response);
            } else {
                rules.push(MockRule {
                    pattern: pattern.to_string(),
                    responses: VecDeque::from([response]),
                });
            }
        }
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Successful completion with fixed token usage.
pub fn ok(content: impl Into<String>) -> Result<Completion, GatewayError> {
    Ok(Completion {
        content: content.into(),
        usage: TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        },
    })
}

#[async_trait]
impl ModelGateway for MockGateway {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut rules = self.rules.lock().expect("mock rules poisoned");
        for rule in rules.iter_mut() {
            if request.user_prompt.contains(&rule.pattern) {
                if let Some(response) = rule.responses.pop_front() {
                    return response;
                }
            }
        }
        let prompt_head: String = request.user_prompt.chars().take(120).collect();
        panic!("no scripted response for prompt: {prompt_head}...");
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
