//! LLM capability trait.
//!
//! The pipeline only ever needs "send a prompt, get raw text back". Concrete
//! clients (Gemini, OpenAI, disabled) live in the `reqtrace` app crate; tests
//! substitute scripted fakes.

use async_trait::async_trait;

use crate::error::Result;

/// One completion request: an optional system instruction plus a single
/// user message.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A text-completion backend.
///
/// Implementations report missing credentials and transport failures as
/// [`PipelineError::UpstreamUnavailable`](crate::error::PipelineError::UpstreamUnavailable)
/// and unreadable response envelopes as
/// [`PipelineError::UpstreamFormat`](crate::error::PipelineError::UpstreamFormat).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.0-flash"`).
    fn model_name(&self) -> &str;

    /// Returns the raw response text.
    async fn complete(&self, request: &LlmRequest) -> Result<String>;
}
