//! Session controller
//!
//! Owns the audio graph, the presenter and the pan calibration, and drives
//! the Idle → Starting → Active → Stopping → Idle state machine. Every
//! input (connection events, user commands, permission answers) arrives on
//! one task, so no locking is involved.
//!
//! Errors meant for the user are raised as alerts on the presenter and also
//! returned, so callers can react without parsing display state.

use std::time::Instant;

use crate::audio::{AudioGraph, MediaBuffer, MediaLoad};
use crate::config::PresentationConfig;
use crate::connection::Emitter;
use crate::error::{AudioError, Error, PermissionError, SessionError};
use crate::protocol::ClientEvent;
use crate::session::pan::PanCalibration;
use crate::session::{SessionEvent, SessionPhase};
use crate::ui::view::{DisplayState, Presenter};

const RECENTER_MESSAGE: &str = "Calibrated: current head position is now center";

/// Outcome of a play/pause request
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackChange {
    /// Playback flipped; carries the new playing flag
    Toggled(bool),
    /// Media must be decoded first. Run the job off the session task and
    /// hand the result to [`SessionController::finish_media_load`].
    Loading(MediaLoad),
}

pub struct SessionController<E: Emitter> {
    connection: E,
    audio: AudioGraph,
    display: Presenter,
    calibration: PanCalibration,
    phase: SessionPhase,
    active: bool,
    gesture_seen: bool,
    /// A decode is running and playback should start when it lands
    media_loading: bool,
}

impl<E: Emitter> SessionController<E> {
    pub fn new(connection: E, audio: AudioGraph, presentation: PresentationConfig) -> Self {
        let display = Presenter::new(presentation, audio.volume());
        Self {
            connection,
            audio,
            display,
            calibration: PanCalibration::new(),
            phase: SessionPhase::Idle,
            active: false,
            gesture_seen: false,
            media_loading: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True only between a completed start and the next stop or disconnect
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn display(&self) -> &Presenter {
        &self.display
    }

    pub fn audio(&self) -> &AudioGraph {
        &self.audio
    }

    pub fn connection(&self) -> &E {
        &self.connection
    }

    pub fn calibration(&self) -> &PanCalibration {
        &self.calibration
    }

    pub fn snapshot(&self) -> DisplayState {
        self.display.snapshot()
    }

    /// Surface an error to the user
    pub fn report(&mut self, message: impl Into<String>) {
        self.display.alert(message);
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::debug!("Session {:?} -> {:?}", self.phase, phase);
        }
        self.phase = phase;
        self.display.set_phase(phase);
    }

    /// The first user action also unlocks audio output
    fn note_gesture(&mut self) {
        if !self.gesture_seen {
            self.gesture_seen = true;
            self.audio.resume();
        }
    }

    /// Apply one connection event
    pub fn dispatch(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ConnectionOpened => {
                tracing::info!("Tracking server connected");
                self.display.set_connected(true);
            }
            SessionEvent::ConnectionResponse(message) => {
                tracing::info!("Server: {}", message);
            }
            SessionEvent::PanUpdate(raw) => self.apply_pan(raw),
            SessionEvent::AudioUpdate {
                pan,
                volume,
                confidence,
            } => {
                if !self.active {
                    return;
                }
                tracing::trace!("Audio update pan={:.3} confidence={:?}", pan, confidence);
                self.apply_pan(pan);
                if let Some(volume) = volume {
                    self.apply_volume((volume * 100.0) as f32);
                }
            }
            SessionEvent::TrackingStarted(message) => {
                tracing::info!("Tracking started: {}", message);
                self.display.set_tracking(true);
            }
            SessionEvent::TrackingStopped(message) => {
                tracing::info!("Tracking stopped: {}", message);
                self.display.set_tracking(false);
            }
            SessionEvent::ServerError(message) => {
                self.display.server_alert(message);
            }
            SessionEvent::VideoFrame(frame) => {
                if self.active {
                    self.display.set_preview(&frame, Instant::now());
                }
            }
            SessionEvent::ConnectionClosed => {
                tracing::warn!("Tracking server disconnected");
                self.display.set_connected(false);
                self.enter_idle();
            }
        }
    }

    fn apply_pan(&mut self, raw: f64) {
        if !self.active {
            return;
        }
        let pan = self.calibration.apply(raw);
        self.audio.set_pan(pan as f32);
        self.display.set_pan(pan);
    }

    fn apply_volume(&mut self, percent: f32) {
        let percent = percent.clamp(0.0, 100.0);
        self.audio.set_volume(percent);
        self.display.set_volume(percent);
    }

    /// Idle → Starting. The caller must then obtain camera permission and
    /// pass the answer to [`finish_start`](Self::finish_start).
    pub fn begin_start(&mut self) -> Result<(), SessionError> {
        self.note_gesture();

        match self.phase {
            SessionPhase::Idle => {}
            SessionPhase::Starting | SessionPhase::Stopping => {
                tracing::warn!("Start ignored, transition already in progress");
                return Err(SessionError::TransitionInProgress);
            }
            SessionPhase::Active => return Err(SessionError::AlreadyActive),
        }

        if !self.connection.is_connected() {
            self.display.alert("Not connected to tracking server");
            return Err(SessionError::NotConnected);
        }

        self.set_phase(SessionPhase::Starting);
        tracing::info!("Requesting camera permission");
        Ok(())
    }

    /// Starting → Active on grant, Starting → Idle on denial
    pub fn finish_start(&mut self, permission: Result<(), PermissionError>) -> Result<(), Error> {
        if self.phase != SessionPhase::Starting {
            tracing::debug!("Discarding stale permission answer in {:?}", self.phase);
            return Ok(());
        }

        if let Err(e) = permission {
            self.display.alert(format!("Camera access is required: {}", e));
            self.set_phase(SessionPhase::Idle);
            return Err(e.into());
        }

        if let Err(e) = self.connection.emit(ClientEvent::StartTracking) {
            self.display.alert(e.to_string());
            self.set_phase(SessionPhase::Idle);
            return Err(e.into());
        }

        self.active = true;
        self.set_phase(SessionPhase::Active);
        tracing::info!("System active");
        Ok(())
    }

    /// Active → Stopping → Idle
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.note_gesture();

        match self.phase {
            SessionPhase::Active => {}
            SessionPhase::Starting | SessionPhase::Stopping => {
                return Err(SessionError::TransitionInProgress)
            }
            SessionPhase::Idle => return Err(SessionError::NotActive),
        }

        self.set_phase(SessionPhase::Stopping);
        if let Err(e) = self.connection.emit(ClientEvent::StopTracking) {
            tracing::warn!("Could not send stop_tracking: {}", e);
        }
        self.enter_idle();
        tracing::info!("System stopped");
        Ok(())
    }

    /// Common landing for stop and disconnect
    fn enter_idle(&mut self) {
        self.active = false;
        self.media_loading = false;
        self.audio.pause();
        if self.display.playing() {
            self.display.set_playing(false);
        }
        self.display.clear_preview();
        self.calibration.reset();
        self.audio.set_pan(0.0);
        self.display.set_pan(0.0);
        self.display.set_tracking(false);
        self.set_phase(SessionPhase::Idle);
    }

    /// Play/pause the media; only available while active. The first play
    /// hands back a decode job instead of blocking on the file.
    pub fn toggle_playback(&mut self) -> Result<PlaybackChange, Error> {
        self.note_gesture();

        if self.phase != SessionPhase::Active {
            return Err(SessionError::NotActive.into());
        }
        if self.media_loading {
            return Err(SessionError::TransitionInProgress.into());
        }

        if !self.audio.is_playing() {
            if let Some(load) = self.audio.media_load() {
                tracing::info!("Loading media from {}", load.path().display());
                self.media_loading = true;
                return Ok(PlaybackChange::Loading(load));
            }
        }

        self.apply_toggle().map(PlaybackChange::Toggled)
    }

    fn apply_toggle(&mut self) -> Result<bool, Error> {
        match self.audio.toggle_playback() {
            Ok(playing) => {
                self.display.set_playing(playing);
                Ok(playing)
            }
            Err(e) => {
                self.display.alert(format!("Cannot play audio: {}", e));
                Err(e.into())
            }
        }
    }

    /// Install decoded media and start playback if it is still wanted.
    /// Returns the playing flag afterwards.
    pub fn finish_media_load(
        &mut self,
        result: Result<MediaBuffer, AudioError>,
    ) -> Result<bool, Error> {
        let wanted = std::mem::take(&mut self.media_loading);
        match result {
            Ok(media) => {
                self.audio.set_media(media);
                if wanted && self.phase == SessionPhase::Active {
                    self.apply_toggle()
                } else {
                    tracing::debug!("Media ready, playback no longer requested");
                    Ok(false)
                }
            }
            Err(e) => {
                self.display.alert(format!("Cannot play audio: {}", e));
                Err(e.into())
            }
        }
    }

    pub fn is_loading_media(&self) -> bool {
        self.media_loading
    }

    /// Pick up playback that ended on the render side; true if the display
    /// changed
    pub fn refresh_playback(&mut self) -> bool {
        let playing = self.audio.is_playing();
        if playing == self.display.playing() {
            return false;
        }
        if !playing {
            tracing::info!("Playback reached the end of the media");
        }
        self.display.set_playing(playing);
        true
    }

    /// Volume in percent, 0..=100
    pub fn set_volume(&mut self, percent: f32) {
        self.note_gesture();
        self.apply_volume(percent);
    }

    /// Treat the current head position as centre
    pub fn recenter(&mut self, now: Instant) -> Result<(), SessionError> {
        self.note_gesture();

        if !self.active {
            return Err(SessionError::NotActive);
        }

        self.calibration.recenter();
        self.audio.set_pan(0.0);
        self.display.set_pan(0.0);
        self.display.show_notification(RECENTER_MESSAGE, now);
        Ok(())
    }

    /// Drop expired banners; true if the display changed
    pub fn expire_notifications(&mut self, now: Instant) -> bool {
        self.display.expire_notifications(now)
    }

    /// Best-effort shutdown: tell the backend to stop and close the link
    pub fn teardown(&mut self) {
        if self.connection.is_connected() {
            if let Err(e) = self.connection.emit(ClientEvent::StopTracking) {
                tracing::debug!("stop_tracking on teardown: {}", e);
            }
            self.connection.close();
        }
        self.active = false;
        self.audio.shutdown();
        tracing::info!("Session torn down");
    }
}
