use async_trait::async_trait;
use rig::client::Nothing;
use rig::completion::Prompt;
use rig::prelude::CompletionClient;
use rig::providers::{gemini, ollama};
use tracing::{debug, error};

use crate::config::{ModelConfig, ModelProvider};
use crate::errors::AppError;

const PREAMBLE: &str = "You are an expert HTML5 game developer. \
                        Follow the requested output format exactly.";

/// Sends one prompt to a generative model and returns its complete text.
///
/// Implementations make exactly one outbound call per invocation and never
/// retry. Every failure comes back as [`AppError::GenerationFailed`].
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, AppError>;
}

#[derive(Clone)]
enum Provider {
    Ollama { client: ollama::Client, base_url: String },
    Gemini(gemini::Client),
}

/// Gateway backed by a rig provider client.
/// A fresh agent is built per call; the client (and its credential) is shared.
#[derive(Clone)]
pub struct RigGateway {
    provider: Provider,
    model: String,
}

impl RigGateway {
    pub fn from_config(config: &ModelConfig) -> Result<Self, AppError> {
        let provider = match config.provider {
            ModelProvider::Ollama => {
                let client = ollama::Client::builder()
                    .api_key(Nothing)
                    .base_url(&config.ollama_base_url)
                    .build()
                    .map_err(|e| AppError::Config(format!("Failed to build Ollama client: {e}")))?;
                Provider::Ollama { client, base_url: config.ollama_base_url.clone() }
            }
            ModelProvider::Gemini => {
                let api_key = config.api_key.as_deref().ok_or_else(|| {
                    AppError::Config("Gemini provider needs an API key".to_string())
                })?;
                let client = gemini::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| AppError::Config(format!("Failed to build Gemini client: {e}")))?;
                Provider::Gemini(client)
            }
        };
        Ok(Self { provider, model: config.model.clone() })
    }

    fn endpoint(&self) -> &str {
        match &self.provider {
            Provider::Ollama { base_url, .. } => base_url,
            Provider::Gemini(_) => "Gemini API",
        }
    }

    /// Folds a provider error into the single failure kind callers see,
    /// keeping the most useful diagnostic.
    fn classify(&self, raw: String) -> AppError {
        let message = if raw.contains("Connection refused") || raw.contains("connect") {
            format!("model service unavailable at {}: {raw}", self.endpoint())
        } else if raw.contains("model") && raw.contains("not found") {
            format!("model '{}' not found: {raw}", self.model)
        } else {
            raw
        };
        AppError::generation(message)
    }
}

#[async_trait]
impl ModelGateway for RigGateway {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        debug!(model = %self.model, prompt_bytes = prompt.len(), "Sending prompt");

        let result = match &self.provider {
            Provider::Ollama { client, .. } => {
                let agent = client.agent(&self.model).preamble(PREAMBLE).build();
                agent.prompt(prompt).await
            }
            Provider::Gemini(client) => {
                let agent = client.agent(&self.model).preamble(PREAMBLE).build();
                agent.prompt(prompt).await
            }
        };

        let text = result.map_err(|e| {
            error!("Model call to {} failed: {e}", self.endpoint());
            self.classify(e.to_string())
        })?;

        if text.trim().is_empty() {
            error!("Model '{}' returned an empty response", self.model);
            return Err(AppError::generation("model returned an empty response"));
        }
        Ok(text)
    }
}
