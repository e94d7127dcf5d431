//! # Head Pan Player
//!
//! Stereo playback whose left/right balance follows head position updates
//! pushed by an external tracking service.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────┐        WebSocket (named events)
//! │   Tracking backend   │◄──────────────────────────────────────┐
//! └──────────┬───────────┘  start_tracking / stop_tracking       │
//!            │ pan_update, tracking_started, error, ...          │
//!            ▼                                                   │
//! ┌─────────────────────────────────────────────────────────────┼───────┐
//! │                         PLAYER PROCESS                       │       │
//! │  ┌──────────────────────┐                    ┌──────────────┴────┐  │
//! │  │ connection::client   │── SessionEvent ───►│ session loop      │  │
//! │  │ (ConnectionManager)  │◄── ClientEvent ────│ (app::run)        │  │
//! │  └──────────────────────┘                    │  SessionController│  │
//! │                                              └───┬──────────┬────┘  │
//! │  ┌──────────────────────┐      UiCommand         │          │       │
//! │  │ ui::server (axum)    │───────────────────────►│          │       │
//! │  │  dashboard + /ws     │◄── DisplayState ───────┘          │       │
//! │  └──────────────────────┘                                   │       │
//! │                                           GraphCommand      ▼       │
//! │  ┌──────────────────────────────────────────────────────────────┐   │
//! │  │ audio::graph  ── crossbeam ──►  output thread (cpal stream)  │   │
//! │  │                                 MediaSource → Pan → Gain → ▶ │   │
//! │  └──────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod app;
pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod session;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate when the device does not report one
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Channel layout of the playback graph (stereo)
    pub const GRAPH_CHANNELS: usize = 2;

    /// Default parameter ramp window in milliseconds
    pub const DEFAULT_RAMP_MS: u32 = 100;

    /// Default calibration banner lifetime in milliseconds
    pub const DEFAULT_NOTIFICATION_MS: u64 = 2000;

    /// Pan magnitude below which the meter shows the neutral colour
    pub const DEFAULT_NEUTRAL_BAND: f64 = 0.1;

    /// Default tracking backend endpoint
    pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:5000/socket.io/?EIO=4&transport=websocket";

    /// Minimum spacing of camera previews pushed to the dashboard
    pub const DEFAULT_PREVIEW_INTERVAL_MS: u64 = 100;

    /// How often the session re-reads the render side's playing state
    pub const PLAYBACK_POLL_MS: u64 = 250;

    /// Default HTTP port for the dashboard
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Capacity of the control → render command channel
    pub const GRAPH_COMMAND_CAPACITY: usize = 256;

    /// Capacity of the session event / command channels
    pub const SESSION_CHANNEL_CAPACITY: usize = 1024;
}
