use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::error;

use crate::config::{Config, ServerConfig};
use crate::handlers;
use crate::llm::{ProviderRegistry, ServiceSelector};
use crate::response;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub providers: ProviderRegistry,
    pub selector: Arc<ServiceSelector>,
    pub public_dir: PathBuf,
    pub idle_timeout_seconds: u64,
    pub keep_alive_interval_seconds: u64,
}

impl AppState {
    pub fn new(providers: ProviderRegistry, config: &Config) -> Self {
        Self {
            providers,
            selector: Arc::new(ServiceSelector::new()),
            public_dir: config.public_dir.clone(),
            idle_timeout_seconds: config.server.idle_timeout_seconds,
            keep_alive_interval_seconds: config.server.keep_alive_interval_seconds,
        }
    }
}

pub fn build_app(state: AppState, server: &ServerConfig) -> Router {
    let router = Router::new()
        .route("/", get(handlers::index))
        .route("/index.html", get(handlers::index))
        .route("/style.css", get(handlers::stylesheet))
        .route("/app.js", get(handlers::script))
        .route("/livez", get(handlers::livez))
        .route("/services", get(handlers::list_services))
        .route("/models", get(handlers::list_models))
        .route("/cerebras-models", get(handlers::list_cerebras_models))
        .route(
            "/upload",
            post(handlers::upload).layer(DefaultBodyLimit::max(server.max_upload_bytes)),
        )
        .route("/chat", post(handlers::chat))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::not_found)
        .with_state(state);
    with_layers(router, server)
}

/// Request timeout, panic recovery and CORS, outermost last.
fn with_layers(router: Router, server: &ServerConfig) -> Router {
    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(server.request_timeout_seconds),
        ))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn(cors))
}

/// Answers preflight requests and adds permissive CORS headers to every response.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    response
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Internal server error".to_string()
    };
    error!(%message, "Handler panicked");
    response::internal_error(message).into_response()
}
