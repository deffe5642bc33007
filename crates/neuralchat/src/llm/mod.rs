//! Upstream LLM providers and the logic that chooses between them.

mod error;
mod openai;
mod provider;
mod registry;
mod selector;
mod types;

pub use error::LLMError;
pub use openai::{OpenAICompatibleProvider, default_base_url};
pub use provider::LLMProvider;
pub use registry::{Credentials, ProviderRegistry, RequestCredentials};
pub use selector::{SelectError, ServiceSelector};
pub use types::{ChatRequest, ChatStream, Sampling, TokenLimit};

#[cfg(test)]
pub(crate) mod testing;
