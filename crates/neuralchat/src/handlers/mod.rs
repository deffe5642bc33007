//! HTTP request handlers.

mod assets;
mod chat;
mod health;
mod services;
mod upload;

pub use assets::{index, script, stylesheet};
pub use chat::chat;
pub use health::livez;
pub use services::{list_cerebras_models, list_models, list_services};
pub use upload::upload;

use axum::response::IntoResponse;

use crate::response;

/// Fallback for unknown routes and unsupported methods.
pub async fn not_found() -> impl IntoResponse {
    response::not_found("Not found")
}
