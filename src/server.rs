//! Embedded web server: WebSocket fan-out of processed results plus the
//! HTTP control surface (recalibrate / settings).
//!
//! Fan-out must never block the processor: frames go through a lossy
//! `tokio::sync::broadcast` channel, and a subscriber that lags simply
//! skips ahead. Control messages flow the other way over an mpsc channel
//! into the processing loop.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::processor::SettingsUpdate;
use crate::types::ProcessedSample;

/// Commands from the control surface into the processing loop.
#[derive(Debug)]
pub enum ControlMsg {
    Recalibrate,
    UpdateSettings(SettingsUpdate),
}

/// One result frame on the wire.
#[derive(Serialize)]
pub struct ImuFrame<'a> {
    pub r#type: &'static str,
    #[serde(flatten)]
    pub sample: &'a ProcessedSample,
}

/// Broadcast when the input stream has gone quiet.
#[derive(Serialize)]
pub struct SignalLostFrame {
    pub r#type: &'static str,
    pub timestamp: f64,
}

#[derive(Clone)]
pub struct AppState {
    pub frames: broadcast::Sender<String>,
    pub control: mpsc::Sender<ControlMsg>,
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .route("/recalibrate", post(recalibrate_handler))
        .route("/settings", post(settings_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    log::info!("monitor server listening on http://{}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("monitor_static.html"))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut frames = state.frames.subscribe();

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break; // client disconnected
                    }
                }
                // Slow subscriber: skip the frames it missed.
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("websocket subscriber lagged, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = ws_rx.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_client_message(&text, &state).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
}

#[derive(Deserialize)]
struct ClientMessage {
    r#type: String,
}

async fn handle_client_message(text: &str, state: &AppState) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) if msg.r#type == "recalibrate" => {
            let _ = state.control.send(ControlMsg::Recalibrate).await;
        }
        Ok(msg) => log::debug!("ignoring websocket message type {:?}", msg.r#type),
        Err(e) => log::warn!("invalid websocket message: {}", e),
    }
}

async fn recalibrate_handler(State(state): State<AppState>) -> impl IntoResponse {
    let _ = state.control.send(ControlMsg::Recalibrate).await;
    (StatusCode::OK, r#"{"success":true}"#)
}

async fn settings_handler(State(state): State<AppState>, body: String) -> impl IntoResponse {
    match serde_json::from_str::<SettingsUpdate>(&body) {
        Ok(update) => {
            let _ = state.control.send(ControlMsg::UpdateSettings(update)).await;
            (StatusCode::OK, r#"{"success":true}"#)
        }
        Err(_) => (StatusCode::BAD_REQUEST, r#"{"error":"Invalid JSON"}"#),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quat::Quaternion;
    use crate::quat::EulerAngles;
    use crate::state_machine::MotionState;
    use crate::types::Vec3;

    #[test]
    fn test_imu_frame_flattens_sample() {
        let sample = ProcessedSample {
            timestamp: 1.5,
            quaternion: Quaternion::identity(),
            euler: EulerAngles { roll: 0.0, pitch: 0.0, yaw: 12.0 },
            acceleration: Vec3::new(0.0, 0.0, 9.8),
            gyro_rms: 0.5,
            tilt_magnitude: 0.0,
            state: MotionState::Still,
            is_calibrating: false,
        };
        let json = serde_json::to_string(&ImuFrame { r#type: "imu_data", sample: &sample }).unwrap();
        assert!(json.contains(r#""type":"imu_data""#));
        assert!(json.contains(r#""state":"still""#));
        assert!(json.contains(r#""tilt_magnitude":0.0"#));
    }

    #[test]
    fn test_client_message_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"recalibrate"}"#).unwrap();
        assert_eq!(msg.r#type, "recalibrate");
    }
}
