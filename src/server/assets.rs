use std::path::Component;
use std::path::Path;

use axum::extract::State;
use axum::http::header;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::server::AppState;

/// Serve the web client from the static directory, with `index.html` for `/`.
pub async fn serve_static(State(app): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let file = if path.is_empty() { "index.html" } else { path };

    // Only plain relative paths, nothing that could leave the directory
    if !Path::new(file).components().all(|c| matches!(c, Component::Normal(_))) {
        return StatusCode::NOT_FOUND.into_response();
    }

    match tokio::fs::read(app.static_dir.join(file)).await {
        Ok(content) => ([(header::CONTENT_TYPE, mime_type(file))], content).into_response(),
        Err(e) => {
            log::debug!("Static file {file} not served: {e}");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn mime_type(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
use crate::server::test_app_state;

#[tokio::test]
async fn test_serves_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>Health Pad</h1>").unwrap();
    let app = test_app_state(dir.path().to_path_buf());

    let response = serve_static(State(app), Uri::from_static("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"<h1>Health Pad</h1>");
}

#[tokio::test]
async fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app_state(dir.path().to_path_buf());
    let response = serve_static(State(app), Uri::from_static("/preview.html")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("web")).unwrap();
    std::fs::write(dir.path().join("secret.txt"), "secret").unwrap();
    let app = test_app_state(dir.path().join("web"));
    let response = serve_static(State(app), Uri::from_static("/../secret.txt")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_mime_types() {
    assert_eq!(mime_type("app.js"), "application/javascript; charset=utf-8");
    assert_eq!(mime_type("preview.html"), "text/html; charset=utf-8");
    assert_eq!(mime_type("data.bin"), "application/octet-stream");
}
