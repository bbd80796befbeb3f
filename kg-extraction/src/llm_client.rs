//! LLM provider abstraction for structured extraction calls.
//!
//! Problem and relation extraction never talk to a concrete provider
//! directly; they hold a `dyn LlmClient` and call `extract`, which returns
//! a raw JSON value plus token accounting. Callers deserialize the value
//! into whatever shape they asked for in the prompt. This mirrors the
//! provider-agnostic client the acquisition layer uses for paper sources:
//! one trait, swappable concrete implementations, no provider leakage into
//! business logic.

use std::ops::Add;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractionError, ExtractionResult};

/// Token accounting for a single LLM call, or a running total across many.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self { prompt_tokens, completion_tokens }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
        }
    }
}

/// A structured extraction call against an LLM provider (§6).
///
/// Implementations are expected to request JSON-mode / structured output
/// from the underlying provider and return the parsed body verbatim;
/// callers deserialize into the type they prompted for.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn extract(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> ExtractionResult<(serde_json::Value, TokenUsage)>;
}

/// Configuration for an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            temperature: 0.1,
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

/// An LLM client against any OpenAI-compatible `/chat/completions` endpoint,
/// requesting JSON-object response format.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: LlmClientConfig) -> ExtractionResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Llm(e.to_string()))?;
        Ok(Self { config, http })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn extract(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> ExtractionResult<(serde_json::Value, TokenUsage)> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: prompt });

        let body = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
            messages,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ExtractionError::Llm(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Llm(format!("llm request failed: {status} {text}")));
        }

        let parsed: ChatResponse =
            response.json().await.map_err(|e| ExtractionError::Llm(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::Llm("empty choices in llm response".to_string()))?;

        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| ExtractionError::Llm(format!("invalid json from llm: {e}")))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok((value, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_adds() {
        let a = TokenUsage::new(100, 20);
        let b = TokenUsage::new(50, 10);
        let sum = a + b;
        assert_eq!(sum.prompt_tokens, 150);
        assert_eq!(sum.completion_tokens, 30);
        assert_eq!(sum.total(), 180);
    }
}
