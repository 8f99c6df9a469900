//! LLM provider contract and response types.
//!
//! Providers are synchronous: the planner blocks on completion calls, and
//! the substrate imposes no async contract. Anything that speaks
//! prompt-in/text-out can implement [`LlmProvider`].

mod error;
mod ollama;

pub use error::LlmError;
pub use ollama::{OllamaProvider, DEFAULT_BASE_URL, DEFAULT_MODEL};

use serde::{Deserialize, Serialize};

/// A text-completion backend.
pub trait LlmProvider: Send + Sync {
    /// Name of the model this provider completes with.
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`, optionally steered by a system
    /// message. Blocks until the full response is available.
    fn complete(&self, prompt: &str, system: Option<&str>) -> Result<LlmResponse, LlmError>;
}

/// A completed generation.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: Option<LlmUsage>,
}

/// Token accounting for one completion, when the backend reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}
