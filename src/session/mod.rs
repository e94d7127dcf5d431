//! Session control: start/stop state machine, pan gating and calibration

pub mod controller;
pub mod pan;
pub mod permission;

pub use controller::{PlaybackChange, SessionController};
pub use pan::{clamp_pan, PanCalibration};
pub use permission::{PermissionProvider, PolicyPermission};

use serde::{Deserialize, Serialize};

use crate::protocol::ServerEvent;

/// Where the start/stop state machine is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Everything the connection reports to the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionOpened,
    ConnectionResponse(String),
    PanUpdate(f64),
    AudioUpdate {
        pan: f64,
        volume: Option<f64>,
        confidence: Option<f64>,
    },
    TrackingStarted(String),
    TrackingStopped(String),
    ServerError(String),
    /// Base64 JPEG from the tracking camera
    VideoFrame(String),
    ConnectionClosed,
}

impl SessionEvent {
    /// Map a decoded server event; events the session ignores yield `None`
    pub fn from_server(event: ServerEvent) -> Option<Self> {
        match event {
            ServerEvent::ConnectionResponse(msg) => Some(Self::ConnectionResponse(msg)),
            ServerEvent::PanUpdate(pan) => Some(Self::PanUpdate(pan)),
            ServerEvent::AudioUpdate {
                pan,
                volume,
                confidence,
            } => Some(Self::AudioUpdate {
                pan,
                volume,
                confidence,
            }),
            ServerEvent::TrackingStarted(msg) => Some(Self::TrackingStarted(msg)),
            ServerEvent::TrackingStopped(msg) => Some(Self::TrackingStopped(msg)),
            ServerEvent::Error(msg) => Some(Self::ServerError(msg)),
            ServerEvent::Disconnect => Some(Self::ConnectionClosed),
            ServerEvent::VideoFrame(frame) => Some(Self::VideoFrame(frame)),
            ServerEvent::Unknown(name) => {
                tracing::debug!("Ignoring event {}", name);
                None
            }
        }
    }
}
