//! Service and model discovery.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use neuralchat_types::{AUTO_SERVICE, ModelsResponse, ProviderKind, ServicesResponse};
use serde::Deserialize;
use tracing::warn;

use crate::llm::RequestCredentials;
use crate::response;
use crate::server::AppState;

#[derive(Deserialize)]
pub struct ModelsQuery {
    service: Option<String>,
}

/// GET /services
///
/// `auto` followed by every provider usable with the caller's credentials,
/// or an empty list when none is.
pub async fn list_services(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ServicesResponse> {
    let request = RequestCredentials::from_headers(&headers);
    let providers = state.providers.resolve(&request);

    let services = if providers.is_empty() {
        Vec::new()
    } else {
        std::iter::once(AUTO_SERVICE.to_string())
            .chain(providers.iter().map(|p| p.kind().id().to_string()))
            .collect()
    };

    Json(ServicesResponse { services })
}

/// GET /models?service=NAME
pub async fn list_models(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ModelsQuery>,
) -> Response {
    let name = query.service.unwrap_or_default();
    let Ok(kind) = name.parse::<ProviderKind>() else {
        return response::bad_request(format!("Unknown service '{name}'")).into_response();
    };
    Json(models_for(&state, &headers, kind).await).into_response()
}

/// GET /cerebras-models
pub async fn list_cerebras_models(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ModelsResponse> {
    Json(models_for(&state, &headers, ProviderKind::Cerebras).await)
}

async fn models_for(state: &AppState, headers: &HeaderMap, kind: ProviderKind) -> ModelsResponse {
    let curated = || kind.curated_models().iter().map(|m| m.to_string()).collect();

    let request = RequestCredentials::from_headers(headers);
    let models = match state.providers.resolve_one(kind, &request) {
        Some(provider) => provider.list_models().await.unwrap_or_else(|e| {
            warn!(provider = kind.display_name(), error = %e, "Model listing failed, using curated list");
            curated()
        }),
        None => curated(),
    };

    ModelsResponse { models }
}
