//! HTTP API handlers

use axum::{extract::State, http::StatusCode, response::Html, Json};
use std::sync::Arc;

use crate::audio::device::{list_devices, AudioDeviceInfo};
use crate::protocol::UiCommand;
use crate::ui::server::AppState;
use crate::ui::view::DisplayState;
use crate::ui::CommandRequest;

const INDEX_HTML: &str = include_str!("index.html");

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub display: DisplayState,
    pub uptime_seconds: u64,
}

type CommandResponse = (StatusCode, Json<ApiResponse<DisplayState>>);

/// Dashboard page
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let status = SystemStatus {
        display: state.display.borrow().clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    Json(ApiResponse::ok(status))
}

/// Get available output devices
pub async fn get_devices() -> Json<ApiResponse<Vec<AudioDeviceInfo>>> {
    let devices = tokio::task::spawn_blocking(list_devices)
        .await
        .unwrap_or_default();
    Json(ApiResponse::ok(devices))
}

/// Hand a command to the session loop and wait for its outcome
async fn submit(state: &AppState, command: UiCommand) -> CommandResponse {
    let (request, reply) = CommandRequest::new(command);

    if state.commands.send(request).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("session is not running")),
        );
    }

    match reply.await {
        Ok(Ok(())) => {
            let display = state.display.borrow().clone();
            (StatusCode::OK, Json(ApiResponse::ok(display)))
        }
        Ok(Err(e)) => (StatusCode::CONFLICT, Json(ApiResponse::error(e))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error("session stopped before answering")),
        ),
    }
}

pub async fn start(State(state): State<Arc<AppState>>) -> CommandResponse {
    submit(&state, UiCommand::Start).await
}

pub async fn stop(State(state): State<Arc<AppState>>) -> CommandResponse {
    submit(&state, UiCommand::Stop).await
}

pub async fn toggle_playback(State(state): State<Arc<AppState>>) -> CommandResponse {
    submit(&state, UiCommand::TogglePlayback).await
}

/// Set playback volume
#[derive(serde::Deserialize)]
pub struct VolumeRequest {
    pub percent: f32,
}

pub async fn set_volume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VolumeRequest>,
) -> CommandResponse {
    if !req.percent.is_finite() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("percent must be a number")),
        );
    }
    submit(
        &state,
        UiCommand::SetVolume {
            percent: req.percent,
        },
    )
    .await
}

pub async fn recenter(State(state): State<Arc<AppState>>) -> CommandResponse {
    submit(&state, UiCommand::Recenter).await
}
