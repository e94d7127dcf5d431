//! Presentation state
//!
//! Everything the dashboard shows is derived here from session state. The
//! functions are pure; [`Presenter`] only remembers what was last shown so a
//! complete [`DisplayState`] snapshot can be produced at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;
use uuid::Uuid;

use crate::config::PresentationConfig;
use crate::session::SessionPhase;

/// Alerts kept for the dashboard
const MAX_ALERTS: usize = 16;

/// Meter position in percent: -1 → 0%, 0 → 50%, 1 → 100%
pub fn meter_position(pan: f64) -> f64 {
    (pan.clamp(-1.0, 1.0) + 1.0) / 2.0 * 100.0
}

/// Two-decimal readout, e.g. `0.50` or `-0.25`
pub fn format_pan(pan: f64) -> String {
    let text = format!("{:.2}", pan);
    // -0.00 reads oddly on a meter
    if text == "-0.00" {
        "0.00".to_string()
    } else {
        text
    }
}

/// Colour band of the pan meter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PanBand {
    Neutral,
    Left,
    Right,
}

impl PanBand {
    pub fn color(&self) -> &'static str {
        match self {
            Self::Neutral => "#00ff88",
            Self::Left => "#3b82f6",
            Self::Right => "#f97316",
        }
    }
}

/// Band for `pan`; |pan| below `neutral_band` is neutral
pub fn pan_band(pan: f64, neutral_band: f64) -> PanBand {
    if pan.abs() < neutral_band {
        PanBand::Neutral
    } else if pan < 0.0 {
        PanBand::Left
    } else {
        PanBand::Right
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionIndicator {
    Connected,
    Disconnected,
}

impl ConnectionIndicator {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Connected => "status connected",
            Self::Disconnected => "status disconnected",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::Connected => "Connected to tracking server",
            Self::Disconnected => "Disconnected from tracking server",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingIndicator {
    Active,
    Idle,
}

impl TrackingIndicator {
    pub fn class(&self) -> &'static str {
        match self {
            Self::Active => "status tracking-active",
            Self::Idle => "status tracking-idle",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::Active => "Head tracking active",
            Self::Idle => "Head tracking idle",
        }
    }
}

/// Indicator as rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorView<S> {
    pub state: S,
    pub class: String,
    pub text: String,
}

/// Pan meter as rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanMeter {
    pub value: f64,
    pub text: String,
    /// Horizontal position of the marker in percent
    pub position: f64,
    pub band: PanBand,
    pub color: String,
}

impl PanMeter {
    pub fn new(pan: f64, neutral_band: f64) -> Self {
        let pan = pan.clamp(-1.0, 1.0);
        let band = pan_band(pan, neutral_band);
        Self {
            value: pan,
            text: format_pan(pan),
            position: meter_position(pan),
            band,
            color: band.color().to_string(),
        }
    }
}

/// Which controls accept input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub playback: bool,
    pub recenter: bool,
}

impl Controls {
    pub fn for_phase(phase: SessionPhase) -> Self {
        let active = phase == SessionPhase::Active;
        Self {
            start: phase == SessionPhase::Idle,
            stop: active,
            playback: active,
            recenter: active,
        }
    }
}

/// Who raised an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Player,
    /// Text sent by the tracking service, shown as received
    Server,
}

/// A user-facing error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub source: AlertSource,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Transient banner, e.g. after recentering
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationView {
    pub id: Uuid,
    pub message: String,
}

/// Complete dashboard state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    pub connection: IndicatorView<ConnectionIndicator>,
    pub tracking: IndicatorView<TrackingIndicator>,
    pub meter: PanMeter,
    pub volume: f32,
    pub playing: bool,
    pub phase: SessionPhase,
    pub controls: Controls,
    pub notification: Option<NotificationView>,
    pub alerts: Vec<Alert>,
    /// Latest camera frame as a `data:` URI
    pub preview: Option<String>,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// Last displayed values
#[derive(Debug)]
pub struct Presenter {
    config: PresentationConfig,
    connection: ConnectionIndicator,
    tracking: TrackingIndicator,
    pan: f64,
    volume: f32,
    playing: bool,
    phase: SessionPhase,
    notification: Option<Notification>,
    alerts: VecDeque<Alert>,
    preview: Option<String>,
    preview_at: Option<Instant>,
    revision: u64,
}

impl Presenter {
    pub fn new(config: PresentationConfig, volume: f32) -> Self {
        Self {
            config,
            connection: ConnectionIndicator::Disconnected,
            tracking: TrackingIndicator::Idle,
            pan: 0.0,
            volume,
            playing: false,
            phase: SessionPhase::Idle,
            notification: None,
            alerts: VecDeque::new(),
            preview: None,
            preview_at: None,
            revision: 0,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connection = if connected {
            ConnectionIndicator::Connected
        } else {
            ConnectionIndicator::Disconnected
        };
        self.touch();
    }

    pub fn set_tracking(&mut self, active: bool) {
        self.tracking = if active {
            TrackingIndicator::Active
        } else {
            TrackingIndicator::Idle
        };
        self.touch();
    }

    pub fn set_pan(&mut self, pan: f64) {
        self.pan = pan.clamp(-1.0, 1.0);
        self.touch();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        self.touch();
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.touch();
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.touch();
    }

    /// Queue an error for the user
    pub fn alert(&mut self, message: impl Into<String>) {
        self.push_alert(AlertSource::Player, message.into());
    }

    /// Queue an error reported by the tracking service
    pub fn server_alert(&mut self, message: impl Into<String>) {
        self.push_alert(AlertSource::Server, message.into());
    }

    fn push_alert(&mut self, source: AlertSource, message: String) {
        tracing::error!(?source, "{}", message);
        if self.alerts.len() == MAX_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(Alert {
            id: Uuid::new_v4(),
            source,
            message,
            raised_at: Utc::now(),
        });
        self.touch();
    }

    /// Show a camera frame unless one was shown less than the configured
    /// interval ago; true if the frame was taken
    pub fn set_preview(&mut self, frame: &str, now: Instant) -> bool {
        if let Some(last) = self.preview_at {
            if now.saturating_duration_since(last) < self.config.preview_interval() {
                return false;
            }
        }
        let uri = if frame.starts_with("data:") {
            frame.to_string()
        } else {
            format!("data:image/jpeg;base64,{}", frame)
        };
        self.preview = Some(uri);
        self.preview_at = Some(now);
        self.touch();
        true
    }

    pub fn clear_preview(&mut self) {
        self.preview_at = None;
        if self.preview.take().is_some() {
            self.touch();
        }
    }

    /// Show a banner for the configured duration, replacing any current one
    pub fn show_notification(&mut self, message: impl Into<String>, now: Instant) -> Uuid {
        let id = Uuid::new_v4();
        self.notification = Some(Notification {
            id,
            message: message.into(),
            expires_at: now + self.config.notification_duration(),
        });
        self.touch();
        id
    }

    /// Drop the banner once its time is up; true if anything changed
    pub fn expire_notifications(&mut self, now: Instant) -> bool {
        match &self.notification {
            Some(n) if n.expires_at <= now => {
                self.notification = None;
                self.touch();
                true
            }
            _ => false,
        }
    }

    /// When the current banner is due to disappear
    pub fn next_deadline(&self) -> Option<Instant> {
        self.notification.as_ref().map(|n| n.expires_at)
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn preview(&self) -> Option<&str> {
        self.preview.as_deref()
    }

    pub fn pan_text(&self) -> String {
        format_pan(self.pan)
    }

    pub fn connection(&self) -> ConnectionIndicator {
        self.connection
    }

    pub fn tracking(&self) -> TrackingIndicator {
        self.tracking
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn meter(&self) -> PanMeter {
        PanMeter::new(self.pan, self.config.neutral_band)
    }

    pub fn controls(&self) -> Controls {
        Controls::for_phase(self.phase)
    }

    pub fn snapshot(&self) -> DisplayState {
        DisplayState {
            connection: IndicatorView {
                state: self.connection,
                class: self.connection.class().to_string(),
                text: self.connection.text().to_string(),
            },
            tracking: IndicatorView {
                state: self.tracking,
                class: self.tracking.class().to_string(),
                text: self.tracking.text().to_string(),
            },
            meter: self.meter(),
            volume: self.volume,
            playing: self.playing,
            phase: self.phase,
            controls: self.controls(),
            notification: self.notification.as_ref().map(|n| NotificationView {
                id: n.id,
                message: n.message.clone(),
            }),
            alerts: self.alerts.iter().cloned().collect(),
            preview: self.preview.clone(),
            revision: self.revision,
            updated_at: Utc::now(),
        }
    }
}
