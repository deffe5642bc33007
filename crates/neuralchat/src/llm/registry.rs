//! Provider registry: which upstream services are usable for a request.
//!
//! Credentials come from two places. Environment keys are read once at
//! startup; `X-<Provider>-Key` / `X-<Provider>-Model` headers arrive with each
//! request and take precedence over the environment.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use neuralchat_types::ProviderKind;
use reqwest::Client;
use tracing::{info, warn};

use super::openai::OpenAICompatibleProvider;
use super::provider::LLMProvider;
use crate::config::ProvidersConfig;

/// API key and model for one provider. Blank values are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl Credentials {
    pub fn new(api_key: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key: non_blank(api_key),
            model: non_blank(model),
        }
    }

    fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.model.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Credentials supplied with a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    entries: HashMap<ProviderKind, Credentials>,
}

impl RequestCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let mut credentials = Self::default();
        for kind in ProviderKind::ALL {
            let entry = Credentials::new(header(kind.key_header()), header(kind.model_header()));
            if !entry.is_empty() {
                credentials.insert(kind, entry);
            }
        }
        credentials
    }

    pub fn insert(&mut self, kind: ProviderKind, credentials: Credentials) {
        self.entries.insert(kind, credentials);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&Credentials> {
        self.entries.get(&kind)
    }
}

/// Environment variable holding a provider's API key.
pub fn env_key_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Groq => "GROQ_API_KEY",
        ProviderKind::Cerebras => "CEREBRAS_API_KEY",
        ProviderKind::OpenRouter => "OPENROUTER_API_KEY",
    }
}

/// Environment variable holding a provider's model override.
pub fn env_model_var(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Groq => "GROQ_MODEL",
        ProviderKind::Cerebras => "CEREBRAS_MODEL",
        ProviderKind::OpenRouter => "OPENROUTER_MODEL",
    }
}

/// Registry of LLM providers, keyed by provider kind.
#[derive(Clone)]
pub struct ProviderRegistry {
    client: Client,
    settings: ProvidersConfig,
    env: HashMap<ProviderKind, Credentials>,
    fixed: HashMap<ProviderKind, Arc<dyn LLMProvider>>,
}

impl ProviderRegistry {
    pub fn new(settings: ProvidersConfig) -> Self {
        Self {
            client: Client::new(),
            settings,
            env: HashMap::new(),
            fixed: HashMap::new(),
        }
    }

    /// Initialize providers from environment variables.
    pub fn from_env(settings: ProvidersConfig) -> Self {
        Self::from_lookup(settings, |name| std::env::var(name).ok())
    }

    /// Initialize providers from an arbitrary variable lookup.
    pub fn from_lookup(settings: ProvidersConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut registry = Self::new(settings);

        for kind in ProviderKind::ALL {
            let credentials = Credentials::new(lookup(env_key_var(kind)), lookup(env_model_var(kind)));
            if credentials.api_key.is_some() {
                info!(provider = kind.display_name(), "Registered provider from environment");
            }
            if !credentials.is_empty() {
                registry.env.insert(kind, credentials);
            }
        }

        if registry.env.values().all(|c| c.api_key.is_none()) {
            warn!(
                "No provider API keys in the environment. \
                Set GROQ_API_KEY, CEREBRAS_API_KEY or OPENROUTER_API_KEY, \
                or send X-<Provider>-Key headers."
            );
        }

        registry
    }

    /// Register a provider implementation, used regardless of credentials.
    pub fn register(&mut self, implementation: Arc<dyn LLMProvider>) {
        self.fixed.insert(implementation.kind(), implementation);
    }

    /// Build the adapter for one provider, if it has an API key.
    pub fn resolve_one(
        &self,
        kind: ProviderKind,
        request: &RequestCredentials,
    ) -> Option<Arc<dyn LLMProvider>> {
        if let Some(provider) = self.fixed.get(&kind) {
            return Some(provider.clone());
        }

        let header = request.get(kind);
        let env = self.env.get(&kind);

        let api_key = header
            .and_then(|c| c.api_key.clone())
            .or_else(|| env.and_then(|c| c.api_key.clone()))?;

        let settings = self.settings.get(kind);
        let model = header
            .and_then(|c| c.model.clone())
            .or_else(|| env.and_then(|c| c.model.clone()))
            .or_else(|| settings.model.clone())
            .unwrap_or_else(|| kind.default_model().to_string());

        Some(Arc::new(OpenAICompatibleProvider::new(
            self.client.clone(),
            kind,
            self.settings.base_url(kind),
            api_key,
            model,
        )))
    }

    /// Every usable provider for a request, in round-robin order.
    pub fn resolve(&self, request: &RequestCredentials) -> Vec<Arc<dyn LLMProvider>> {
        ProviderKind::ALL
            .into_iter()
            .filter_map(|kind| self.resolve_one(kind, request))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedProvider;
    use axum::http::HeaderValue;

    fn lookup(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn environment_keys_register_providers() {
        let registry = ProviderRegistry::from_lookup(
            ProvidersConfig::default(),
            lookup(&[("CEREBRAS_API_KEY", "csk"), ("GROQ_API_KEY", "  ")]),
        );
        let providers = registry.resolve(&RequestCredentials::default());
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].kind(), ProviderKind::Cerebras);
        assert_eq!(providers[0].model(), "gpt-oss-120b");
    }

    #[test]
    fn environment_model_override() {
        let registry = ProviderRegistry::from_lookup(
            ProvidersConfig::default(),
            lookup(&[("GROQ_API_KEY", "gsk"), ("GROQ_MODEL", "llama-3.3-70b-versatile")]),
        );
        let groq = registry
            .resolve_one(ProviderKind::Groq, &RequestCredentials::default())
            .unwrap();
        assert_eq!(groq.model(), "llama-3.3-70b-versatile");
    }

    #[test]
    fn header_credentials_take_precedence() {
        let registry = ProviderRegistry::from_lookup(
            ProvidersConfig::default(),
            lookup(&[("GROQ_API_KEY", "env-key"), ("GROQ_MODEL", "env-model")]),
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-groq-model", HeaderValue::from_static("header-model"));
        headers.insert("x-openrouter-key", HeaderValue::from_static("or-key"));
        let request = RequestCredentials::from_headers(&headers);

        let providers = registry.resolve(&request);
        let kinds: Vec<_> = providers.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![ProviderKind::Groq, ProviderKind::OpenRouter]);
        assert_eq!(providers[0].model(), "header-model");
        assert_eq!(providers[1].model(), "openrouter/auto");
    }

    #[test]
    fn blank_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-cerebras-key", HeaderValue::from_static("   "));
        let request = RequestCredentials::from_headers(&headers);
        assert!(request.get(ProviderKind::Cerebras).is_none());

        let registry = ProviderRegistry::new(ProvidersConfig::default());
        assert!(registry.resolve(&request).is_empty());
    }

    #[test]
    fn registered_implementation_wins() {
        let mut registry = ProviderRegistry::new(ProvidersConfig::default());
        registry.register(Arc::new(ScriptedProvider::replying(
            ProviderKind::OpenRouter,
            &["hi"],
        )));
        let providers = registry.resolve(&RequestCredentials::default());
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name(), "OpenRouter");
    }
}
