//! The uniform interface every upstream provider is driven through.

use async_trait::async_trait;
use neuralchat_types::{ChatMessage, ProviderKind};

use super::error::LLMError;
use super::types::ChatStream;

/// Trait for LLM providers.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Which upstream service this adapter talks to.
    fn kind(&self) -> ProviderKind;

    /// Display name used for badges and SSE metadata.
    fn name(&self) -> &'static str {
        self.kind().display_name()
    }

    /// The model actually in use, after any per-request override.
    fn model(&self) -> &str;

    /// Start a streaming chat completion.
    ///
    /// Errors returned here happen before any fragment was produced; errors
    /// after that point are yielded by the stream itself.
    async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<ChatStream, LLMError>;

    /// Models the user can pick for this provider.
    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        Ok(self
            .kind()
            .curated_models()
            .iter()
            .map(|m| m.to_string())
            .collect())
    }
}
