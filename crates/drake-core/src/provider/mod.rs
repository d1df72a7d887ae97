//! Provider Client: a uniform, object-safe async interface over concrete LLM
//! backends.
//!
//! ```text
//! Worker -> ProviderRegistry.get(name) -> &dyn Provider -> complete(request)
//! ```
//!
//! Retry and circuit-breaking wrap every call (see [`retry`] and
//! [`circuit_breaker`]); concrete backends only need to implement the single
//! raw HTTP round trip.

pub mod anthropic;
pub mod circuit_breaker;
pub mod openai;
pub mod retry;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One entry in a conversation sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// A tool a provider may choose to invoke, described for the request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// When set, the provider must invoke exactly this tool (used by the
    /// Planner to force a structured plan response).
    pub forced_tool: Option<String>,
}

/// A single block of a provider's response. Every adapter normalises its
/// wire format into this union so callers never see a provider-specific
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: HashMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },
    #[error("provider {provider} returned rate-limit (retry after {retry_after_secs:?}s)")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },
    #[error("provider {0} circuit is open, not attempting call")]
    CircuitOpen(String),
}

/// A single completion round trip against one provider backend.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Provider) {}
};

/// Holds every configured provider, addressable by name. Providers are kept
/// behind an `Arc` rather than a `Box` so a worker can clone one out and carry
/// it across a `tokio::spawn`'d task without borrowing the registry.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers a provider, returning the previous one under that name, if any.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
        self.providers.insert(provider.name().to_string(), provider)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
