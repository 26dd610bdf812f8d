use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ChatMessage, GenerationError, GenerationRequest, LanguageModel};

/// `[generation]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API, without `/chat/completions`.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Environment variable holding the bearer key. Empty disables authentication.
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "hermes".to_string(),
            temperature: 0.3,
            max_tokens: 2048,
            timeout_secs: 120,
            api_key_env: "CADLOOP_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Blocking client for `POST {endpoint}/chat/completions`.
pub struct ChatCompletionsModel {
    client: Client,
    config: ModelConfig,
    api_key: Option<String>,
}

impl ChatCompletionsModel {
    /// Builds the HTTP client and reads the API key from the environment.
    ///
    /// A missing key is only reported when a request is made, so read-only
    /// commands work without credentials.
    pub fn new(config: ModelConfig) -> Result<Self, GenerationError> {
        let api_key = if config.api_key_env.is_empty() {
            None
        } else {
            std::env::var(&config.api_key_env)
                .ok()
                .filter(|key| !key.trim().is_empty())
        };
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(
        config: ModelConfig,
        api_key: Option<String>,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }
}

impl LanguageModel for ChatCompletionsModel {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String, GenerationError> {
        if self.api_key.is_none() && !self.config.api_key_env.is_empty() {
            return Err(GenerationError::MissingApiKey {
                var: self.config.api_key_env.clone(),
            });
        }

        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: request.messages(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        let started = Instant::now();
        let mut http = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }
        let response = http.send().map_err(|err| {
            if err.is_connect() || err.is_timeout() {
                GenerationError::Unavailable(err.to_string())
            } else {
                GenerationError::Http(err)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(GenerationError::Service {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json()?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        info!(
            model = %self.config.model,
            refinement = request.is_refinement(),
            latency_ms = started.elapsed().as_millis() as u64,
            "generation completed"
        );
        debug!(reply_len = content.len(), "generation reply received");
        Ok(content)
    }
}
