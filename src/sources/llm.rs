//! Text completion against the Anthropic Messages API.
//!
//! Callers only see [`LlmClient`]: prompt in, text out. All parsing of model
//! output happens on the consumer side.

use std::borrow::Cow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScoutError;

pub(crate) const ANTHROPIC_BASE: &str = "https://api.anthropic.com";
pub(crate) const ANTHROPIC_API: &str = "anthropic";
pub(crate) const ANTHROPIC_BASE_ENV: &str = "INDICATION_SCOUT_ANTHROPIC_BASE";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_DOCS: &str = "https://docs.anthropic.com/en/api/getting-started";
const MAX_TOKENS: u32 = 1024;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ScoutError>;
}

pub struct AnthropicClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: Option<String>,
    model: String,
}

impl AnthropicClient {
    pub fn new(
        client: reqwest_middleware::ClientWithMiddleware,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base: crate::sources::env_base(ANTHROPIC_BASE, ANTHROPIC_BASE_ENV),
            api_key,
            model: model.into(),
        }
    }

    #[cfg(test)]
    fn new_for_test(base: String, api_key: Option<&str>) -> Self {
        Self {
            client: crate::sources::test_client(),
            base: Cow::Owned(base),
            api_key: api_key.map(str::to_string),
            model: "claude-test".to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &str) -> Result<String, ScoutError> {
        let Some(api_key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Err(ScoutError::ApiKeyRequired {
                api: ANTHROPIC_API.to_string(),
                env_var: "ANTHROPIC_API_KEY".to_string(),
                docs_url: ANTHROPIC_DOCS.to_string(),
            });
        };

        let url = crate::sources::join_endpoint(&self.base, "v1/messages");
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        };
        let req = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        let resp: MessagesResponse = crate::sources::send_json(ANTHROPIC_API, req).await?;
        resp.content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| ScoutError::api(ANTHROPIC_API, "Response contained no text block"))
    }
}
