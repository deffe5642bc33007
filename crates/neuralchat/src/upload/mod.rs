//! Classification and text extraction for uploaded files.

pub mod mime;
pub mod pdf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use neuralchat_types::{UploadKind, UploadResponse};
use tracing::warn;

/// Turn an uploaded file into the descriptor returned by `POST /upload`.
pub async fn process(filename: String, bytes: Bytes) -> UploadResponse {
    let mime_type = mime::mime_type_for(&filename);
    let size = bytes.len() as u64;

    let (kind, content) = if mime_type == mime::PDF {
        (UploadKind::Text, extract_pdf(bytes).await)
    } else if mime::is_textual(mime_type) {
        (
            UploadKind::Text,
            String::from_utf8_lossy(&bytes).into_owned(),
        )
    } else if mime::is_image(mime_type) {
        (UploadKind::Image, STANDARD.encode(&bytes))
    } else {
        (UploadKind::Binary, STANDARD.encode(&bytes))
    };

    UploadResponse {
        kind,
        filename,
        content,
        mime_type: mime_type.to_string(),
        size,
    }
}

async fn extract_pdf(bytes: Bytes) -> String {
    match tokio::task::spawn_blocking(move || pdf::extract_text(&bytes)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "Unreadable PDF upload");
            pdf::EXTRACTION_FAILED.to_string()
        }
        Err(e) => {
            warn!(error = %e, "PDF text extraction failed");
            pdf::EXTRACTION_FAILED.to_string()
        }
    }
}
