//! Ollama LLM provider (local HTTP server).
//!
//! Talks to a running Ollama instance over its HTTP API. Completions use
//! `/api/generate` with streaming disabled; `/api/tags` serves availability
//! checks and model listing.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::LlmError;
use super::{LlmProvider, LlmResponse, LlmUsage};

/// Default Ollama server URL (local installation).
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model.
pub const DEFAULT_MODEL: &str = "llama3.1:8b";

/// Default request timeout; local generation can be slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// LLM provider backed by a local Ollama server.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    /// Create a provider for the given server and model.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            model: model.into(),
        })
    }

    /// Create a provider with the default local server and model.
    pub fn with_defaults() -> Result<Self, LlmError> {
        Self::new(DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT)
    }

    /// URL of the Ollama server.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check whether the server responds at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    /// List model names available on the server.
    pub fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()?;

        if !response.status().is_success() {
            return Err(LlmError::Api {
                status: response.status().as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response.json()?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl LlmProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(&self, prompt: &str, system: Option<&str>) -> Result<LlmResponse, LlmError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
        };

        debug!(model = %self.model, "requesting completion");
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LlmError::ModelNotFound {
                model: self.model.clone(),
            });
        }
        if !response.status().is_success() {
            return Err(LlmError::Api {
                status: response.status().as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        let body: GenerateResponse = response.json()?;
        let usage = match (body.prompt_eval_count, body.eval_count) {
            (None, None) => None,
            (prompt_tokens, completion_tokens) => Some(LlmUsage {
                prompt_tokens: prompt_tokens.unwrap_or(0),
                completion_tokens: completion_tokens.unwrap_or(0),
            }),
        };

        Ok(LlmResponse {
            text: body.response,
            model: body.model.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}
