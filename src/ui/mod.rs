//! Web UI module
//!
//! A local dashboard served by axum. Handlers never touch session state;
//! they forward [`UiCommand`]s to the session loop and read the latest
//! published [`DisplayState`].

pub mod handlers;
pub mod server;
pub mod view;
pub mod websocket;

pub use server::WebServer;
pub use view::{DisplayState, Presenter};

use tokio::sync::oneshot;

use crate::protocol::UiCommand;

/// A user command on its way to the session loop
#[derive(Debug)]
pub struct CommandRequest {
    pub command: UiCommand,
    /// Outcome of the command; `None` for fire-and-forget senders
    pub reply: Option<oneshot::Sender<Result<(), String>>>,
}

impl CommandRequest {
    pub fn new(command: UiCommand) -> (Self, oneshot::Receiver<Result<(), String>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command,
                reply: Some(tx),
            },
            rx,
        )
    }

    pub fn fire_and_forget(command: UiCommand) -> Self {
        Self {
            command,
            reply: None,
        }
    }

    /// Report the outcome; a caller that went away is ignored
    pub fn respond(self, result: Result<(), String>) {
        if let Some(reply) = self.reply {
            let _ = reply.send(result);
        }
    }
}
