use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::State;
use axum::extract::WebSocketUpgrade;
use axum::response::IntoResponse;

use crate::server::AppState;

pub async fn ws_handler(State(app): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, app))
}

/// Forward published readings to the socket until either side goes away.
/// Incoming messages are ignored.
async fn handle_ws(mut socket: WebSocket, app: AppState) {
    let broadcaster = app.state.broadcaster().clone();
    let (id, mut frames) = broadcaster.open_channel();
    log::info!("WebSocket client connected. Total: {}", broadcaster.subscriber_count());

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = socket.send(Message::Text(frame.to_string().into())).await {
                    log::warn!("Error sending to WebSocket: {e}");
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::warn!("WebSocket error: {e}");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    broadcaster.unsubscribe(id);
    log::info!("WebSocket client disconnected. Total: {}", broadcaster.subscriber_count());
}
