//! Extension-based MIME lookup.

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const PDF: &str = "application/pdf";
pub const JSON: &str = "application/json";

/// MIME type for a file name, judged only by the text after its last dot.
pub fn mime_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => PDF,
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => JSON,
        "csv" => "text/csv",
        "js" => "text/javascript",
        "ts" => "text/typescript",
        "html" => "text/html",
        "css" => "text/css",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        _ => OCTET_STREAM,
    }
}

/// Whether the payload should be handed to the model as UTF-8 text.
pub fn is_textual(mime_type: &str) -> bool {
    mime_type.starts_with("text/") || mime_type == JSON
}

pub fn is_image(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}
