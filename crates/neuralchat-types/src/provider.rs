//! The closed set of upstream providers NeuralChat can talk to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An upstream chat-completion provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Groq,
    Cerebras,
    OpenRouter,
}

impl ProviderKind {
    /// Every provider, in round-robin order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Groq,
        ProviderKind::Cerebras,
        ProviderKind::OpenRouter,
    ];

    /// Identifier used in URLs, request bodies and storage.
    pub fn id(self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::Cerebras => "cerebras",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    /// Human-readable name shown in badges and SSE metadata.
    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Groq => "Groq",
            ProviderKind::Cerebras => "Cerebras",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    /// Request header carrying a per-request API key.
    pub fn key_header(self) -> &'static str {
        match self {
            ProviderKind::Groq => "x-groq-key",
            ProviderKind::Cerebras => "x-cerebras-key",
            ProviderKind::OpenRouter => "x-openrouter-key",
        }
    }

    /// Request header carrying a per-request model override.
    pub fn model_header(self) -> &'static str {
        match self {
            ProviderKind::Groq => "x-groq-model",
            ProviderKind::Cerebras => "x-cerebras-model",
            ProviderKind::OpenRouter => "x-openrouter-model",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::Groq => "moonshotai/kimi-k2-instruct-0905",
            ProviderKind::Cerebras => "gpt-oss-120b",
            ProviderKind::OpenRouter => "openrouter/auto",
        }
    }

    /// Hand-picked models offered when the provider cannot be queried.
    pub fn curated_models(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Groq => &[
                "moonshotai/kimi-k2-instruct-0905",
                "deepseek-r1-distill-llama-70b",
                "llama-3.3-70b-versatile",
            ],
            ProviderKind::Cerebras => &[
                "gpt-oss-120b",
                "qwen-3-235b-a22b-instruct-2507",
                "zai-glm-4.7",
                "llama3.1-8b",
            ],
            ProviderKind::OpenRouter => &[
                "openrouter/auto",
                "google/gemini-2.0-flash-exp:free",
                "meta-llama/llama-3.3-70b-instruct:free",
                "deepseek/deepseek-r1:free",
            ],
        }
    }

    /// Look a provider up by its display name, as carried in SSE metadata.
    pub fn from_display_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.display_name() == name)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Returned when a string names no known provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown service '{}'", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}
