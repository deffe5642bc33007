//! In-process provider used by unit tests.

use async_trait::async_trait;
use neuralchat_types::{ChatMessage, ProviderKind};

use super::error::LLMError;
use super::provider::LLMProvider;
use super::types::ChatStream;

/// Replies with a fixed list of fragments, or fails before streaming.
pub(crate) struct ScriptedProvider {
    pub kind: ProviderKind,
    pub model: String,
    pub fragments: Vec<String>,
    pub fail_with: Option<(u16, String)>,
}

impl ScriptedProvider {
    pub(crate) fn replying(kind: ProviderKind, fragments: &[&str]) -> Self {
        Self {
            kind,
            model: kind.default_model().to_string(),
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_with: None,
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_stream(&self, _messages: Vec<ChatMessage>) -> Result<ChatStream, LLMError> {
        if let Some((status, message)) = &self.fail_with {
            return Err(LLMError::Api {
                status: *status,
                message: message.clone(),
            });
        }
        let items: Vec<Result<String, LLMError>> =
            self.fragments.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
