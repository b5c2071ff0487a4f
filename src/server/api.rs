use axum::extract::State;
use axum::Json;

use crate::connection_state::Snapshot;
use crate::server::types::ConnectRequest;
use crate::server::types::ScanResponse;
use crate::server::types::SuccessResponse;
use crate::server::AppState;

pub async fn get_scan(State(app): State<AppState>) -> Json<ScanResponse> {
    match app.device.scan().await {
        Ok(devices) => Json(ScanResponse { devices, error: None }),
        Err(e) => {
            log::error!("Scan failed: {e}");
            Json(ScanResponse { devices: Vec::new(), error: Some(e.to_string()) })
        }
    }
}

pub async fn post_connect(
    State(app): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Json<SuccessResponse> {
    let Some(address) = request.address else {
        return Json(SuccessResponse::failed("address is required"));
    };
    match app.device.connect(&address).await {
        Ok(()) => Json(SuccessResponse::ok()),
        Err(e) => {
            log::error!("Connection failed: {e}");
            Json(SuccessResponse::failed(e))
        }
    }
}

pub async fn post_disconnect(State(app): State<AppState>) -> Json<SuccessResponse> {
    app.device.disconnect().await;
    Json(SuccessResponse::ok())
}

pub async fn post_measure(State(app): State<AppState>) -> Json<SuccessResponse> {
    match app.device.start_measurement() {
        Ok(()) => Json(SuccessResponse::ok()),
        Err(e) => Json(SuccessResponse::failed(e)),
    }
}

pub async fn get_status(State(app): State<AppState>) -> Json<Snapshot> {
    Json(app.state.snapshot())
}

#[cfg(test)]
use crate::server::test_app_state;

#[tokio::test]
async fn test_measure_when_disconnected() {
    let app = test_app_state("/nonexistent".into());
    let Json(response) = post_measure(State(app)).await;
    assert_eq!(response, SuccessResponse::failed("Device not connected"));
    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        serde_json::json!({"success": false, "error": "Device not connected"})
    );
}

#[tokio::test]
async fn test_measure_when_connected() {
    let app = test_app_state("/nonexistent".into());
    app.state.begin_session();
    let Json(response) = post_measure(State(app)).await;
    assert_eq!(serde_json::to_value(&response).unwrap(), serde_json::json!({"success": true}));
}

#[tokio::test]
async fn test_status_reports_last_measurement() {
    let app = test_app_state("/nonexistent".into());
    let session = app.state.begin_session();
    app.device.pipeline().process(session, &[0xFD, 0x96, 0x00, 0x50, 0x00, 0x48]);

    let Json(snapshot) = get_status(State(app)).await;
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["connected"], true);
    assert_eq!(json["last_measurement"]["systolic"], 150);
    assert_eq!(json["last_measurement"]["classification"]["name"], "High Blood Pressure Stage 1");
}

#[tokio::test]
async fn test_connect_without_address() {
    let app = test_app_state("/nonexistent".into());
    let Json(response) = post_connect(State(app.clone()), Json(ConnectRequest { address: None })).await;
    assert!(!response.success);
    assert!(!app.state.is_connected());
}

#[tokio::test]
async fn test_disconnect_always_succeeds() {
    let app = test_app_state("/nonexistent".into());
    let Json(response) = post_disconnect(State(app)).await;
    assert_eq!(response, SuccessResponse::ok());
}
