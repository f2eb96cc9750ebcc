//! Vendor backends for the LLM gateway.
//!
//! One implementation per provider behind the `ChatBackend` trait. Each
//! backend translates the shared message list into the vendor's request
//! shape and normalizes the response back to `Completion`, so callers never
//! see vendor-specific types.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{ChatMessage, Completion, CompletionOptions, LlmConfig, ProviderKind, Role, TokenUsage};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const DEFAULT_MAX_TOKENS: u32 = 2000;
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Completion>;
}

/// OpenAI chat completions
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Completion> {
        let model = options.model.as_deref().unwrap_or("gpt-4-turbo-preview");

        let body = json!({
            "model": model,
            "messages": messages.iter()
                .map(|m| json!({ "role": m.role, "content": m.content }))
                .collect::<Vec<_>>(),
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        });

        let response = self.client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error: {} {}", status, text);
        }

        let data: Value = response.json().await?;

        Ok(Completion {
            content: data["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            usage: TokenUsage {
                prompt_tokens: data["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: data["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
            },
        })
    }
}

/// Anthropic messages API. The system message is hoisted into the dedicated
/// request field; only user/assistant turns go in the message list.
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Completion> {
        let model = options.model.as_deref().unwrap_or("claude-3-sonnet-20240229");

        let system = messages.iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let chat = messages.iter()
            .filter(|m| m.role != Role::System)
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect::<Vec<_>>();

        let body = json!({
            "model": model,
            "max_tokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "system": system,
            "messages": chat,
        });

        let response = self.client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error: {} {}", status, text);
        }

        let data: Value = response.json().await?;

        let content = data["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find(|b| b["type"] == "text"))
            .and_then(|b| b["text"].as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Completion {
            content,
            usage: TokenUsage {
                prompt_tokens: data["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: data["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
            },
        })
    }
}

/// Google Gemini generateContent API. Gemini has no system role and calls
/// the assistant "model"; everything else maps to "user".
pub struct GeminiBackend {
    client: Client,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for GeminiBackend {
    async fn complete(&self, messages: &[ChatMessage], options: &CompletionOptions) -> Result<Completion> {
        let model = options.model.as_deref().unwrap_or("gemini-pro");
        let url = format!("{}/{}:generateContent?key={}", GEMINI_API_BASE, model, self.api_key);

        let contents = messages.iter()
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect::<Vec<_>>();

        let body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
                "temperature": options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            },
        });

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error: {} {}", status, text);
        }

        let data: Value = response.json().await?;

        Ok(Completion {
            content: data["candidates"][0]["content"]["parts"][0]["text"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            usage: TokenUsage {
                prompt_tokens: data["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
                completion_tokens: data["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            },
        })
    }
}

/// Mock backend for tests and offline development. Responses are canned and
/// keyed off the system prompt so each agent gets a plausible answer.
pub struct MockBackend;

#[async_trait]
impl ChatBackend for MockBackend {
    async fn complete(&self, messages: &[ChatMessage], _options: &CompletionOptions) -> Result<Completion> {
        let prompt = messages.iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        // remediation before RCA: remediation user messages embed the RCA text
        let content = if prompt.contains("remediation agent") {
            "Action: restart the affected service.\n\
             Command: systemctl restart app\n\
             Risk level: low\n\
             Expected outcome: service resumes answering probes within one minute."
                .to_string()
        } else if prompt.contains("Root Cause Analysis") {
            "1. Incident Summary: the monitored endpoint stopped answering.\n\
             2. Timeline of Events: availability dropped at the first failed probe.\n\
             3. Root Cause Identification: upstream service returning 5xx responses.\n\
             4. Contributing Factors: no automated failover configured.\n\
             5. Recommended Fixes: restart the upstream service and add a health-gated deploy."
                .to_string()
        } else if prompt.contains("security scanning agent") {
            "Missing hardening headers detected. Severity: medium. \
             Recommended fix: add Content-Security-Policy and Strict-Transport-Security \
             at the edge proxy."
                .to_string()
        } else if prompt.contains("incident detection agent") {
            "Severity: critical. The website is unreachable; probes report repeated \
             failures. Immediate attention required."
                .to_string()
        } else {
            "No issues detected; system looks healthy.".to_string()
        };

        Ok(Completion {
            content,
            usage: TokenUsage::default(),
        })
    }
}

/// Create a backend from configuration
pub fn create_backend(config: &LlmConfig) -> crate::Result<Arc<dyn ChatBackend>> {
    match config.provider {
        ProviderKind::OpenAi => Ok(Arc::new(OpenAiBackend::new(&config.api_key))),
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicBackend::new(&config.api_key))),
        ProviderKind::Gemini => Ok(Arc::new(GeminiBackend::new(&config.api_key))),
        ProviderKind::Mock => Ok(Arc::new(MockBackend)),
    }
}
