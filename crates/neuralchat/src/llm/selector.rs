//! Chooses the provider that handles a chat request.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use neuralchat_types::{AUTO_SERVICE, ProviderKind};
use thiserror::Error;

use super::provider::LLMProvider;

/// Errors from provider selection.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error(
        "No AI provider is configured. Add an API key in the settings, \
        or set GROQ_API_KEY, CEREBRAS_API_KEY or OPENROUTER_API_KEY on the server."
    )]
    NoProviders,
}

/// Picks an explicitly named provider, or rotates through the available ones.
///
/// The cursor is shared by every request. It is advanced atomically, so
/// sequential auto selections over a fixed provider set alternate strictly;
/// concurrent selections are fair in aggregate.
#[derive(Debug, Default)]
pub struct ServiceSelector {
    cursor: AtomicUsize,
}

impl ServiceSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(
        &self,
        requested: Option<&str>,
        available: &[Arc<dyn LLMProvider>],
    ) -> Result<Arc<dyn LLMProvider>, SelectError> {
        if let Some(name) = requested.filter(|n| !n.eq_ignore_ascii_case(AUTO_SERVICE))
            && let Ok(kind) = name.parse::<ProviderKind>()
            && let Some(provider) = available.iter().find(|p| p.kind() == kind)
        {
            return Ok(provider.clone());
        }

        if available.is_empty() {
            return Err(SelectError::NoProviders);
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % available.len();
        Ok(available[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedProvider;

    fn providers(kinds: &[ProviderKind]) -> Vec<Arc<dyn LLMProvider>> {
        kinds
            .iter()
            .map(|k| Arc::new(ScriptedProvider::replying(*k, &[])) as Arc<dyn LLMProvider>)
            .collect()
    }

    #[test]
    fn explicit_service_is_used() {
        let selector = ServiceSelector::new();
        let available = providers(&[ProviderKind::Groq, ProviderKind::Cerebras]);
        for _ in 0..3 {
            let chosen = selector.select(Some("cerebras"), &available).unwrap();
            assert_eq!(chosen.kind(), ProviderKind::Cerebras);
        }
    }

    #[test]
    fn round_robin_visits_each_provider_once() {
        let selector = ServiceSelector::new();
        let available = providers(&ProviderKind::ALL);

        let mut chosen: Vec<_> = (0..available.len())
            .map(|_| selector.select(None, &available).unwrap().kind())
            .collect();
        chosen.sort();
        assert_eq!(chosen, ProviderKind::ALL.to_vec());
    }

    #[test]
    fn sequential_auto_requests_alternate() {
        let selector = ServiceSelector::new();
        let available = providers(&[ProviderKind::Groq, ProviderKind::OpenRouter]);

        let first = selector.select(Some("auto"), &available).unwrap().kind();
        let second = selector.select(None, &available).unwrap().kind();
        assert_ne!(first, second);
    }

    #[test]
    fn unknown_or_unavailable_name_falls_back_to_rotation() {
        let selector = ServiceSelector::new();
        let available = providers(&[ProviderKind::Groq]);

        let chosen = selector.select(Some("mistral"), &available).unwrap();
        assert_eq!(chosen.kind(), ProviderKind::Groq);
        let chosen = selector.select(Some("cerebras"), &available).unwrap();
        assert_eq!(chosen.kind(), ProviderKind::Groq);
    }

    #[test]
    fn no_providers_is_a_configuration_error() {
        let selector = ServiceSelector::new();
        let err = selector.select(None, &[]).err().unwrap();
        assert!(err.to_string().contains("No AI provider is configured"));

        assert!(selector.select(Some("groq"), &[]).is_err());
    }
}
