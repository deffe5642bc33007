//! Common types for streaming chat completions.

use std::pin::Pin;

use futures::Stream;
use neuralchat_types::{ChatMessage, ProviderKind};
use serde::Serialize;

use super::error::LLMError;

/// A lazy, single-pass sequence of assistant text fragments.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// Which field carries the output token limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLimit {
    MaxTokens(u32),
    MaxCompletionTokens(u32),
}

/// Fixed sampling parameters sent with every request to a provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub limit: TokenLimit,
}

impl Sampling {
    pub fn for_provider(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Groq => Self {
                temperature: 0.6,
                top_p: Some(1.0),
                limit: TokenLimit::MaxCompletionTokens(4096),
            },
            ProviderKind::Cerebras => Self {
                temperature: 0.6,
                top_p: Some(0.95),
                limit: TokenLimit::MaxCompletionTokens(8192),
            },
            ProviderKind::OpenRouter => Self {
                temperature: 0.6,
                top_p: None,
                limit: TokenLimit::MaxTokens(4096),
            },
        }
    }
}

/// A streaming chat completion request (OpenAI-compatible format).
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn streaming(model: String, messages: Vec<ChatMessage>, sampling: Sampling) -> Self {
        let (max_tokens, max_completion_tokens) = match sampling.limit {
            TokenLimit::MaxTokens(n) => (Some(n), None),
            TokenLimit::MaxCompletionTokens(n) => (None, Some(n)),
        };
        Self {
            model,
            messages,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            max_tokens,
            max_completion_tokens,
            stream: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groq_request_serialization() {
        let request = ChatRequest::streaming(
            "llama-3.3-70b-versatile".to_string(),
            vec![
                ChatMessage::system("You are a helpful assistant."),
                ChatMessage::user("Hello!"),
            ],
            Sampling::for_provider(ProviderKind::Groq),
        );

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"llama-3.3-70b-versatile\""));
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"temperature\":0.6"));
        assert!(json.contains("\"top_p\":1.0"));
        assert!(json.contains("\"max_completion_tokens\":4096"));
        assert!(json.contains("\"stream\":true"));
        assert!(!json.contains("\"max_tokens\""));
    }

    #[test]
    fn test_cerebras_request_limits() {
        let request = ChatRequest::streaming(
            "gpt-oss-120b".to_string(),
            vec![ChatMessage::user("Hi")],
            Sampling::for_provider(ProviderKind::Cerebras),
        );
        assert_eq!(request.max_completion_tokens, Some(8192));
        assert_eq!(request.top_p, Some(0.95));
    }

    #[test]
    fn test_openrouter_request_without_top_p() {
        let request = ChatRequest::streaming(
            "openrouter/auto".to_string(),
            vec![ChatMessage::user("Hi")],
            Sampling::for_provider(ProviderKind::OpenRouter),
        );

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("top_p"));
        assert!(json.contains("\"max_tokens\":4096"));
        assert!(!json.contains("max_completion_tokens"));
    }
}
