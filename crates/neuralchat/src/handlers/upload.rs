//! File upload handler.

use axum::Json;
use axum::extract::Multipart;
use axum::extract::multipart::MultipartRejection;
use axum::response::{IntoResponse, Response};
use neuralchat_types::ErrorBody;
use tracing::info;

use crate::response;
use crate::upload;

const FILE_FIELD: &str = "file";
const NO_FILE: &str = "No file provided";

/// POST /upload
///
/// Reads the first multipart field named `file` that carries a file name.
pub async fn upload(multipart: Result<Multipart, MultipartRejection>) -> Response {
    let Ok(mut multipart) = multipart else {
        return response::bad_request(NO_FILE).into_response();
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return response::bad_request(NO_FILE).into_response(),
            Err(e) => return multipart_error(e),
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return multipart_error(e),
        };

        let descriptor = upload::process(filename, bytes).await;
        info!(
            filename = %descriptor.filename,
            mime_type = %descriptor.mime_type,
            size = descriptor.size,
            "Processed upload"
        );
        return Json(descriptor).into_response();
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> Response {
    (
        e.status(),
        Json(ErrorBody {
            error: e.body_text(),
        }),
    )
        .into_response()
}
