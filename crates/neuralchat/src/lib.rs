//! NeuralChat - a streaming relay between a chat client and hosted LLM providers.

pub mod config;
pub mod handlers;
pub mod llm;
pub mod response;
pub mod server;
pub mod upload;
