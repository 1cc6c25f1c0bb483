//! ABOUTME: HTTP-backed Completion provider
//! ABOUTME: Talks to an OpenAI-compatible chat completion endpoint over reqwest

use crate::{Completion, CompletionOptions, CompletionResponse, Usage};
use async_trait::async_trait;
use conductor_core::{ConductorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for an HTTP completion provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub custom_config: HashMap<String, serde_json::Value>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            timeout_secs: 30,
            custom_config: HashMap::new(),
        }
    }

    /// Load from `CONDUCTOR_COMPLETION_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("CONDUCTOR_COMPLETION_ENDPOINT")
            .map_err(|_| ConductorError::Configuration("CONDUCTOR_COMPLETION_ENDPOINT not set".into()))?;
        let model = std::env::var("CONDUCTOR_COMPLETION_MODEL").unwrap_or_else(|_| "default".to_string());
        Ok(Self {
            name: "http".to_string(),
            endpoint,
            api_key: std::env::var("CONDUCTOR_COMPLETION_API_KEY").ok(),
            model,
            timeout_secs: std::env::var("CONDUCTOR_COMPLETION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            custom_config: HashMap::new(),
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

/// `Completion` backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpCompletion {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl HttpCompletion {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConductorError::Completion(e.to_string()))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Completion for HttpCompletion {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        opts: CompletionOptions,
    ) -> Result<CompletionResponse> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            stop: opts.stop.as_deref(),
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConductorError::Completion(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ConductorError::Completion(format!(
                "completion endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ConductorError::Completion(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ConductorError::Completion("empty choices array".into()))?;

        let usage = parsed
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse { text, usage })
    }
}
