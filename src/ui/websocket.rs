//! Live dashboard channel
//!
//! Pushes the full [`DisplayState`] on connect and after every change, and
//! accepts [`UiCommand`] JSON from the page.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use std::sync::Arc;

use crate::protocol::UiCommand;
use crate::ui::server::AppState;
use crate::ui::view::DisplayState;
use crate::ui::CommandRequest;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(display: &DisplayState) -> Option<Message> {
    match serde_json::to_string(display) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!("Failed to encode display state: {}", e);
            None
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    tracing::debug!("Dashboard client connected");
    let mut display = state.display.clone();

    let initial = display.borrow_and_update().clone();
    if let Some(msg) = encode(&initial) {
        if socket.send(msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            changed = display.changed() => {
                if changed.is_err() {
                    // Session loop has exited
                    break;
                }
                let snapshot = display.borrow_and_update().clone();
                if let Some(msg) = encode(&snapshot) {
                    if socket.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<UiCommand>(&text) {
                            Ok(command) => {
                                let request = CommandRequest::fire_and_forget(command);
                                if state.commands.send(request).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!("Ignoring dashboard message: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("Dashboard client disconnected");
}
