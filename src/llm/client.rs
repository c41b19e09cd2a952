//! Black-box language model provider abstraction (§1: the runtime never
//! hard-codes a specific LLM vendor — `ModelParams::provider`/`id` select
//! one at config time).

use crate::error::{LlmError, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub model: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
    pub model: String,
}

/// Every specialist and the Knowledge Gateway talk to this trait, never to
/// a concrete provider (§1, §4.6 step 6).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResponse>;

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse>;

    /// Token-by-token generation for `POST /chat` SSE streaming (§5, §4.10).
    /// Default implementation falls back to one-shot `generate` wrapped in
    /// a single-item stream, so providers are free to skip it.
    async fn generate_stream(&self, messages: &[Message]) -> Result<BoxStream<'static, Result<String>>> {
        let response = self.generate(messages).await?;
        Ok(Box::pin(stream! {
            yield Ok(response.text);
        }))
    }
}

/// Configuration for a single provider endpoint, built from
/// [`crate::config::ModelParams`].
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model_id: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Generic HTTP client speaking an OpenAI-compatible chat/embeddings wire
/// format, usable against any provider that exposes one (local gateway,
/// hosted API, sandbox double).
pub struct HttpLlmClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    model: String,
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

impl HttpLlmClient {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(key) = &config.api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }
        let client = builder.build().map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn generate(&self, messages: &[Message]) -> Result<GenerationResponse> {
        debug!(count = messages.len(), "generating response");

        let request = ChatRequest {
            model: &self.config.model_id,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let response = timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.client.post(self.url("chat/completions")).json(&request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout)?
        .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(body = %body, "provider returned an error");
            return Err(LlmError::GenerationFailed(body).into());
        }

        let parsed: ChatResponse = response.json().await.map_err(LlmError::Http)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::GenerationFailed("empty choices array".into()))?;

        Ok(GenerationResponse {
            text: choice.message.content,
            tokens_used: parsed.usage.and_then(|u| u.completion_tokens),
            model: parsed.model,
            finish_reason: choice.finish_reason,
        })
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingResponse> {
        let request = EmbedRequest {
            model: &self.config.model_id,
            input: text,
        };

        let response = timeout(
            Duration::from_secs(self.config.timeout_secs),
            self.client.post(self.url("embeddings")).json(&request).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout)?
        .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::EmbeddingFailed(body).into());
        }

        let parsed: EmbedResponse = response.json().await.map_err(LlmError::Http)?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::EmbeddingFailed("empty data array".into()))?;

        Ok(EmbeddingResponse {
            embedding: datum.embedding,
            model: parsed.model,
        })
    }
}

pub fn system_message(content: impl Into<String>) -> Message {
    Message {
        role: MessageRole::System,
        content: content.into(),
    }
}

pub fn user_message(content: impl Into<String>) -> Message {
    Message {
        role: MessageRole::User,
        content: content.into(),
    }
}

pub fn assistant_message(content: impl Into<String>) -> Message {
    Message {
        role: MessageRole::Assistant,
        content: content.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_helpers_set_expected_roles() {
        assert_eq!(system_message("x").role, MessageRole::System);
        assert_eq!(user_message("x").role, MessageRole::User);
        assert_eq!(assistant_message("x").role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn default_stream_falls_back_to_one_shot_generate() {
        struct Stub;

        #[async_trait]
        impl LlmClient for Stub {
            async fn generate(&self, _messages: &[Message]) -> Result<GenerationResponse> {
                Ok(GenerationResponse {
                    text: "olá".into(),
                    tokens_used: Some(1),
                    model: "stub".into(),
                    finish_reason: Some("stop".into()),
                })
            }

            async fn embed(&self, _text: &str) -> Result<EmbeddingResponse> {
                unimplemented!()
            }
        }

        use futures_util::StreamExt;
        let stub = Stub;
        let mut stream = stub.generate_stream(&[user_message("oi")]).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "olá");
    }
}
