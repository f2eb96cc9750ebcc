//! Provider-agnostic LLM gateway.
//!
//! Callers hand over a resolved `LlmConfig` and a message list; every
//! vendor path normalizes to the same `Completion` shape. Configuration is
//! re-resolved from the store at the start of each workflow invocation, so
//! a key rotated mid-flight is picked up by the next task.

pub mod prompts;
pub mod provider;

pub use provider::{create_backend, ChatBackend, MockBackend};

use serde::{Deserialize, Serialize};

use crate::store::Store;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Mock,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "gemini" => Ok(ProviderKind::Gemini),
            "mock" => Ok(ProviderKind::Mock),
            _ => Err(Error::Validation(format!("Unsupported LLM provider: {}", s))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Mock => write!(f, "mock"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub api_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Resolve the LLM configuration for a user: the configured default
/// provider when its key is present, otherwise the first provider with a
/// stored key in fixed priority order. `None` means "AI unavailable" and
/// is never an error by itself.
pub async fn resolve_config(store: &dyn Store, user_id: &str) -> Result<Option<LlmConfig>> {
    let settings = match store.get_llm_settings(user_id).await? {
        Some(settings) => settings,
        None => return Ok(None),
    };

    if let Some(provider) = settings.default_provider {
        let key = match provider {
            ProviderKind::OpenAi => settings.openai_api_key.as_deref(),
            ProviderKind::Anthropic => settings.anthropic_api_key.as_deref(),
            ProviderKind::Gemini => settings.gemini_api_key.as_deref(),
            ProviderKind::Mock => Some(""),
        };
        if let Some(key) = key {
            return Ok(Some(LlmConfig { provider, api_key: key.to_string() }));
        }
    }

    // Fallback to any available key, fixed priority order
    if let Some(key) = settings.openai_api_key {
        return Ok(Some(LlmConfig { provider: ProviderKind::OpenAi, api_key: key }));
    }
    if let Some(key) = settings.anthropic_api_key {
        return Ok(Some(LlmConfig { provider: ProviderKind::Anthropic, api_key: key }));
    }
    if let Some(key) = settings.gemini_api_key {
        return Ok(Some(LlmConfig { provider: ProviderKind::Gemini, api_key: key }));
    }

    Ok(None)
}

/// Universal completion call. One fresh vendor request per call; no retry,
/// no caching. Vendor failures propagate so the workflow step decides
/// whether they are task-fatal.
pub async fn complete(
    config: &LlmConfig,
    messages: &[ChatMessage],
    options: &CompletionOptions,
) -> Result<Completion> {
    let backend = create_backend(config)?;
    backend
        .complete(messages, options)
        .await
        .map_err(|e| Error::Llm(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{create_store, DatabaseConfig, DatabaseType, LlmSettings};
    use chrono::Utc;
    use std::path::PathBuf;

    async fn memory_store() -> std::sync::Arc<dyn Store> {
        let config = DatabaseConfig {
            db_type: DatabaseType::Sqlite,
            sqlite_path: Some(PathBuf::from(":memory:")),
            connection_string: None,
        };
        let store = create_store(&config).await.unwrap();
        store.init().await.unwrap();
        store
    }

    fn settings(user_id: &str) -> LlmSettings {
        LlmSettings {
            user_id: user_id.to_string(),
            tenant_id: "t1".to_string(),
            default_provider: None,
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolve_config_returns_none_without_keys() {
        let store = memory_store().await;

        assert!(resolve_config(store.as_ref(), "nobody").await.unwrap().is_none());

        store.upsert_llm_settings(settings("u1")).await.unwrap();
        assert!(resolve_config(store.as_ref(), "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_config_prefers_default_provider() {
        let store = memory_store().await;

        let mut s = settings("u1");
        s.default_provider = Some(ProviderKind::Anthropic);
        s.openai_api_key = Some("sk-openai".to_string());
        s.anthropic_api_key = Some("sk-ant".to_string());
        store.upsert_llm_settings(s).await.unwrap();

        let config = resolve_config(store.as_ref(), "u1").await.unwrap().unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.api_key, "sk-ant");
    }

    #[tokio::test]
    async fn resolve_config_falls_back_in_priority_order() {
        let store = memory_store().await;

        // default provider has no key stored; fallback order applies
        let mut s = settings("u1");
        s.default_provider = Some(ProviderKind::OpenAi);
        s.gemini_api_key = Some("sk-gem".to_string());
        store.upsert_llm_settings(s).await.unwrap();

        let config = resolve_config(store.as_ref(), "u1").await.unwrap().unwrap();
        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.api_key, "sk-gem");
    }
}
