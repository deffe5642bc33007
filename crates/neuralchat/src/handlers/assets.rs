//! The browser front end, served from the configured public directory.

use std::io::ErrorKind;
use std::path::Path;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use tokio::fs;
use tracing::warn;

use crate::response;
use crate::server::AppState;

/// GET / and GET /index.html
pub async fn index(State(state): State<AppState>) -> Response {
    serve(&state.public_dir, "index.html", "text/html; charset=utf-8").await
}

/// GET /style.css
pub async fn stylesheet(State(state): State<AppState>) -> Response {
    serve(&state.public_dir, "style.css", "text/css; charset=utf-8").await
}

/// GET /app.js
pub async fn script(State(state): State<AppState>) -> Response {
    serve(
        &state.public_dir,
        "app.js",
        "application/javascript; charset=utf-8",
    )
    .await
}

async fn serve(dir: &Path, name: &str, content_type: &'static str) -> Response {
    match fs::read(dir.join(name)).await {
        Ok(bytes) => ([(CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(file = name, error = %e, "Failed to read static asset");
            }
            response::not_found(format!("{name} not found")).into_response()
        }
    }
}
