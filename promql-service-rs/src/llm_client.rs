// promql-service-rs/src/llm_client.rs
//
// HTTP client for the chat-completion provider (OpenAI-compatible API).
//
// Configuration (.env file):
// - OPEN_AI_KEY: API key for the provider
// - OPEN_AI_MODEL_NAME: model to use (default "gpt-4.1-mini")
// - OPEN_AI_API_URL: API endpoint URL (defaults to the OpenAI chat completions endpoint)
// - LLM_TIMEOUT_SECS: request timeout in seconds (default 30)
//
// One invocation is one request. There is no retry loop here: the pipeline
// that calls this client records the outcome of every attempt, so a failed
// call must surface as a failed call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompts;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("completion contained no choices")]
    EmptyCompletion,

    #[error("OPEN_AI_KEY is not set")]
    MissingApiKey,
}

/// Boundary to the text-completion provider. The generator produces raw
/// text; validating its content is the caller's problem.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpecGenerator: Send + Sync {
    /// Raw text of a query spec for a natural-language request,
    /// whitespace-trimmed.
    async fn generate(&self, natural_language: &str) -> Result<String, LLMError>;

    /// Plain-language explanation of a PromQL query.
    async fn explain(&self, promql: &str) -> Result<String, LLMError>;
}

#[derive(Debug)]
pub struct LLMClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LLMClient {
    /// Create a client from environment variables. Fails when no API key is
    /// configured; everything else has a default.
    pub fn from_env() -> Result<Self, LLMError> {
        let api_key = std::env::var("OPEN_AI_KEY").map_err(|_| LLMError::MissingApiKey)?;
        if api_key.is_empty() {
            return Err(LLMError::MissingApiKey);
        }

        let api_url = config_rs::env_or("OPEN_AI_API_URL", DEFAULT_API_URL);
        let model = config_rs::env_or("OPEN_AI_MODEL_NAME", DEFAULT_MODEL);
        let timeout_secs = config_rs::env_parse("LLM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        log::info!("LLM client initialized (model: {}, url: {})", model, api_url);

        Ok(Self {
            client,
            api_url,
            api_key,
            model,
        })
    }

    // Single completion attempt: exactly two role-tagged turns, first choice
    // only.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LLMError> {
        let request_body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
        };

        let response = match self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) if err.is_timeout() => {
                return Err(LLMError::Network(format!("request timed out: {}", err)))
            }
            Err(err) if err.is_connect() => {
                return Err(LLMError::Network(format!("connection failed: {}", err)))
            }
            Err(err) => return Err(LLMError::Network(format!("network error: {}", err))),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| LLMError::Parse(err.to_string()))?;

        let choice = data.choices.first().ok_or(LLMError::EmptyCompletion)?;

        if let Some(usage) = &data.usage {
            log::info!(
                "chat completion used {} tokens ({} prompt, {} completion)",
                usage.total_tokens,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        Ok(choice.message.content.trim().to_string())
    }
}

#[async_trait]
impl SpecGenerator for LLMClient {
    async fn generate(&self, natural_language: &str) -> Result<String, LLMError> {
        self.complete(
            prompts::SYSTEM_PROMPT.as_str(),
            &prompts::query_template(natural_language),
        )
        .await
    }

    async fn explain(&self, promql: &str) -> Result<String, LLMError> {
        self.complete(prompts::EXPLAIN_SYSTEM_PROMPT, &prompts::explain_template(promql))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test so the OPEN_AI_KEY manipulations cannot race across the
    // parallel test runner.
    #[test]
    fn from_env_key_handling_and_defaults() {
        std::env::remove_var("OPEN_AI_KEY");
        assert!(matches!(LLMClient::from_env(), Err(LLMError::MissingApiKey)));

        std::env::set_var("OPEN_AI_KEY", "");
        assert!(matches!(LLMClient::from_env(), Err(LLMError::MissingApiKey)));

        std::env::set_var("OPEN_AI_KEY", "test-key");
        std::env::remove_var("OPEN_AI_MODEL_NAME");
        std::env::remove_var("OPEN_AI_API_URL");

        let client = LLMClient::from_env().unwrap();
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.api_url, DEFAULT_API_URL);

        std::env::remove_var("OPEN_AI_KEY");
    }
}
