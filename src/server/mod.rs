//! HTTP and WebSocket surface of the bridge.

pub mod api;
pub mod assets;
pub mod stream;
pub mod types;

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::Request;
use axum::http::header;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Router;

use crate::broadcaster::Broadcaster;
use crate::config::BridgeConfig;
use crate::connection_state::ConnectionState;
use crate::device_session::DeviceSession;
use crate::message::Decoder;
use crate::pipeline::Pipeline;
use crate::reading_log::ReadingLog;

/// Shared state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<ConnectionState>,
    pub device: Arc<DeviceSession>,
    pub static_dir: Arc<PathBuf>,
}

impl AppState {
    /// Wire up the broadcaster, connection state, pipeline and device session
    pub fn new(config: &BridgeConfig) -> Self {
        let broadcaster = Arc::new(Broadcaster::new());
        let state = Arc::new(ConnectionState::new(broadcaster));
        let pipeline = Arc::new(Pipeline::new(
            Decoder::new(config.fixed_offset_fallback),
            state.clone(),
            config.readings_log.clone().map(ReadingLog::new),
        ));
        let device = Arc::new(DeviceSession::new(config.clone(), pipeline));
        Self { state, device, static_dir: Arc::new(config.static_dir.clone()) }
    }
}

/// Build the complete axum router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/scan", get(api::get_scan))
        .route("/api/connect", post(api::post_connect))
        .route("/api/disconnect", post(api::post_disconnect))
        .route("/api/measure", post(api::post_measure))
        .route("/api/status", get(api::get_status))
        .route("/ws", get(stream::ws_handler))
        .fallback(assets::serve_static)
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    bind: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    let addr = listener.local_addr()?;
    log::info!("Listening on http://{addr}");
    log::info!("WebSocket: ws://{addr}/ws");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Allow the web client to be served from anywhere. Preflight requests are
/// answered here without reaching the routes.
async fn cors_middleware(req: Request, next: Next) -> Response {
    let mut response = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    add_cors_headers(response.headers_mut());
    response
}

fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, OPTIONS"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, HeaderValue::from_static("*"));
}

#[cfg(test)]
pub(crate) fn test_app_state(static_dir: PathBuf) -> AppState {
    let config = BridgeConfig { static_dir, ..BridgeConfig::default() };
    AppState::new(&config)
}

#[tokio::test]
async fn test_cors_preflight() {
    let state = test_app_state(PathBuf::from("/nonexistent"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("OPTIONS /api/connect HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes()).await.unwrap();
    let mut response = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 204"), "{response}");
    assert!(response.to_ascii_lowercase().contains("access-control-allow-origin: *"));
}

#[tokio::test]
async fn test_status_over_http() {
    let state = test_app_state(PathBuf::from("/nonexistent"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET /api/status HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    tokio::io::AsyncWriteExt::write_all(&mut stream, request.as_bytes()).await.unwrap();
    let mut response = String::new();
    tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with(r#"{"connected":false,"last_measurement":null}"#), "{response}");
}
