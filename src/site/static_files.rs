use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use mime_guess::from_path;
use std::io;
use std::path::Path;

/// Serve a single file from disk with a content type guessed from its name.
///
/// Missing files and directories are a 404; any other read error is a 500.
/// With `head` set, headers are sent without the body.
pub async fn serve_file(path: &Path, head: bool) -> Response {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return not_found(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return not_found(),
        Err(e) => return read_error(path, e),
    }

    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return not_found(),
        Err(e) => return read_error(path, e),
    };

    let mime = from_path(path).first_or_octet_stream();
    let content_type = if mime.type_() == mime_guess::mime::TEXT {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.essence_str().to_string()
    };
    let content_type = HeaderValue::from_str(&content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let length = content.len();
    let body = if head { Body::empty() } else { Body::from(content) };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        body,
    )
        .into_response()
}

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 Not Found").into_response()
}

fn read_error(path: &Path, e: io::Error) -> Response {
    tracing::error!(path = %path.display(), error = %e, "Failed to read file");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}
