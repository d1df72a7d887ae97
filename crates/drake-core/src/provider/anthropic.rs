//! Anthropic Messages API adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, CompletionResponse, ContentBlock, Provider, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<WireToolChoice<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct WireToolChoice<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Vec<WireContentBlock>,
    stop_reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: HashMap<String, serde_json::Value>,
    },
}

#[async_trait]
impl Provider for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let wire = WireRequest {
            model: &self.model,
            max_tokens: 4096,
            system: &request.system_prompt,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
            tool_choice: request.forced_tool.as_deref().map(|name| WireToolChoice {
                kind: "tool",
                name,
            }),
        };

        let response = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: self.name().to_string(),
                message: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited {
                provider: self.name().to_string(),
                retry_after_secs,
            });
        }

        let response = response.error_for_status().map_err(|e| ProviderError::Request {
            provider: self.name().to_string(),
            message: e.to_string(),
        })?;

        let wire_response: WireResponse = response.json().await.map_err(|e| ProviderError::Request {
            provider: self.name().to_string(),
            message: e.to_string(),
        })?;

        Ok(CompletionResponse {
            blocks: wire_response.content.into_iter().map(Into::into).collect(),
            stop_reason: wire_response.stop_reason,
        })
    }
}

impl From<WireContentBlock> for ContentBlock {
    fn from(block: WireContentBlock) -> Self {
        match block {
            WireContentBlock::Text { text } => ContentBlock::Text(text),
            WireContentBlock::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_defaults_to_anthropic_host() {
        let client = AnthropicClient::new("sk-test", "claude-sonnet");
        assert_eq!(client.name(), "anthropic");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn wire_content_block_maps_tool_use() {
        let block = WireContentBlock::ToolUse {
            id: "tool_1".into(),
            name: "read_file".into(),
            input: HashMap::new(),
        };
        let mapped: ContentBlock = block.into();
        assert!(matches!(mapped, ContentBlock::ToolUse { name, .. } if name == "read_file"));
    }
}
