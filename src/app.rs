//! Runtime wiring
//!
//! Builds the audio graph, connection and dashboard, then runs the session
//! loop: one task that owns the [`SessionController`] and applies connection
//! events, user commands, permission answers, decoded media and timers in
//! arrival order. Slow work (permission prompts, media decoding) runs
//! elsewhere and reports back over channels.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::audio::{AudioGraph, MediaBuffer, MediaLoad};
use crate::config::AppConfig;
use crate::connection::{ConnectionManager, Emitter};
use crate::constants::{PLAYBACK_POLL_MS, SESSION_CHANNEL_CAPACITY};
use crate::error::{AudioError, Error, PermissionError};
use crate::protocol::UiCommand;
use crate::session::{
    PermissionProvider, PlaybackChange, PolicyPermission, SessionController, SessionEvent,
};
use crate::ui::{CommandRequest, DisplayState, WebServer};

/// Inputs of the session loop
pub struct SessionInputs {
    pub events: mpsc::Receiver<SessionEvent>,
    pub commands: mpsc::Receiver<CommandRequest>,
}

/// Where background work reports its results
struct Completions {
    permission: mpsc::Sender<Result<(), PermissionError>>,
    media: mpsc::Sender<Result<MediaBuffer, AudioError>>,
}

/// Run the player until Ctrl-C
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    let (commands_tx, commands_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);

    // Opening the device can block for a while
    let audio_config = config.audio.clone();
    let (audio, audio_init) = tokio::task::spawn_blocking(move || {
        let mut audio = AudioGraph::new(audio_config);
        let result = audio.initialize();
        (audio, result)
    })
    .await?;

    let connection = ConnectionManager::new(config.connection.framing);
    let mut controller =
        SessionController::new(connection.clone(), audio, config.presentation.clone());
    if let Err(e) = audio_init {
        controller.report(e.to_string());
    }

    connection.connect(&config.connection.endpoint, events_tx)?;
    tracing::info!("Connecting to {}", config.connection.endpoint);

    let (display_tx, display_rx) = watch::channel(controller.snapshot());
    let web_handle = WebServer::new(config.ui.clone(), commands_tx, display_rx).start_background();

    let permission: Arc<dyn PermissionProvider> =
        Arc::new(PolicyPermission::new(config.session.camera_permission));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down...");
    };

    let inputs = SessionInputs {
        events: events_rx,
        commands: commands_rx,
    };
    run_session(controller, inputs, permission, display_tx, shutdown).await;

    web_handle.abort();
    Ok(())
}

/// The session loop. Returns the controller after teardown.
pub async fn run_session<E, S>(
    mut controller: SessionController<E>,
    mut inputs: SessionInputs,
    permission: Arc<dyn PermissionProvider>,
    display: watch::Sender<DisplayState>,
    shutdown: S,
) -> SessionController<E>
where
    E: Emitter,
    S: Future<Output = ()>,
{
    let (permission_tx, mut permission_rx) = mpsc::channel(4);
    let (media_tx, mut media_rx) = mpsc::channel(4);
    let completions = Completions {
        permission: permission_tx,
        media: media_tx,
    };
    let mut playback_poll = tokio::time::interval(Duration::from_millis(PLAYBACK_POLL_MS));
    playback_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut events_open = true;
    let mut commands_open = true;
    let mut published = controller.display().revision();
    display.send_replace(controller.snapshot());

    tokio::pin!(shutdown);

    loop {
        let deadline = controller.display().next_deadline();
        let banner_timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending().await,
            }
        };

        let mut pending_reply = None;

        tokio::select! {
            _ = &mut shutdown => break,

            event = inputs.events.recv(), if events_open => match event {
                Some(event) => controller.dispatch(event),
                None => {
                    tracing::debug!("Connection task finished");
                    events_open = false;
                }
            },

            request = inputs.commands.recv(), if commands_open => match request {
                Some(request) => {
                    let result = apply_command(
                        &mut controller,
                        request.command.clone(),
                        &permission,
                        &completions,
                    );
                    pending_reply = Some((request, result.map_err(|e| e.to_string())));
                }
                None => {
                    tracing::debug!("Command channel closed");
                    commands_open = false;
                }
            },

            Some(result) = permission_rx.recv() => {
                if let Err(e) = controller.finish_start(result) {
                    tracing::warn!("Start failed: {}", e);
                }
            }

            Some(result) = media_rx.recv() => {
                if let Err(e) = controller.finish_media_load(result) {
                    tracing::warn!("Playback failed: {}", e);
                }
            }

            _ = playback_poll.tick() => {
                controller.refresh_playback();
            }

            _ = banner_timer => {
                controller.expire_notifications(Instant::now());
            }
        }

        let revision = controller.display().revision();
        if revision != published {
            published = revision;
            display.send_replace(controller.snapshot());
        }

        // Reply after publishing so callers read the updated state
        if let Some((request, result)) = pending_reply {
            request.respond(result);
        }
    }

    controller.teardown();
    display.send_replace(controller.snapshot());
    controller
}

/// Apply one user command
fn apply_command<E: Emitter>(
    controller: &mut SessionController<E>,
    command: UiCommand,
    permission: &Arc<dyn PermissionProvider>,
    completions: &Completions,
) -> Result<(), Error> {
    tracing::debug!("Command {:?}", command);
    match command {
        UiCommand::Start => {
            controller.begin_start()?;
            let request = permission.request_camera();
            let results = completions.permission.clone();
            tokio::spawn(async move {
                let _ = results.send(request.await).await;
            });
        }
        UiCommand::Stop => controller.stop()?,
        UiCommand::TogglePlayback => {
            if let PlaybackChange::Loading(load) = controller.toggle_playback()? {
                spawn_media_load(load, completions.media.clone());
            }
        }
        UiCommand::SetVolume { percent } => controller.set_volume(percent),
        UiCommand::Recenter => controller.recenter(Instant::now())?,
    }
    Ok(())
}

/// Decode on the blocking pool so the session loop keeps running
fn spawn_media_load(load: MediaLoad, results: mpsc::Sender<Result<MediaBuffer, AudioError>>) {
    tokio::spawn(async move {
        let result = match tokio::task::spawn_blocking(move || load.run()).await {
            Ok(result) => result,
            Err(e) => Err(AudioError::Media(format!("decoder task failed: {}", e))),
        };
        let _ = results.send(result).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::media::tests::write_test_wav;
    use crate::config::{AudioConfig, PermissionPolicy, PresentationConfig};
    use crate::protocol::ClientEvent;
    use crate::session::controller::tests::{controller, RecordingEmitter};
    use crate::session::SessionPhase;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio::sync::oneshot;

    struct Harness {
        events: mpsc::Sender<SessionEvent>,
        commands: mpsc::Sender<CommandRequest>,
        display: watch::Receiver<DisplayState>,
        stop: oneshot::Sender<()>,
        session: tokio::task::JoinHandle<SessionController<RecordingEmitter>>,
    }

    fn spawn_session(
        controller: SessionController<RecordingEmitter>,
        policy: PermissionPolicy,
    ) -> Harness {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (display_tx, display_rx) = watch::channel(controller.snapshot());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let permission: Arc<dyn PermissionProvider> = Arc::new(PolicyPermission::new(policy));

        let inputs = SessionInputs {
            events: events_rx,
            commands: commands_rx,
        };
        let session = tokio::spawn(run_session(
            controller,
            inputs,
            permission,
            display_tx,
            async move {
                let _ = stop_rx.await;
            },
        ));

        Harness {
            events: events_tx,
            commands: commands_tx,
            display: display_rx,
            stop: stop_tx,
            session,
        }
    }

    async fn command(harness: &Harness, command: UiCommand) -> Result<(), String> {
        let (request, reply) = CommandRequest::new(command);
        harness.commands.send(request).await.unwrap();
        reply.await.unwrap()
    }

    async fn wait_until(harness: &mut Harness, check: impl FnMut(&DisplayState) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), harness.display.wait_for(check))
            .await
            .expect("display did not reach expected state")
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_then_pan_update() {
        let emitter = RecordingEmitter::connected();
        let (controller, _processor) = controller(emitter.clone());
        let mut harness = spawn_session(controller, PermissionPolicy::Grant);

        assert_eq!(command(&harness, UiCommand::Start).await, Ok(()));
        wait_until(&mut harness, |s| s.phase == SessionPhase::Active).await;

        harness.events.send(SessionEvent::PanUpdate(0.5)).await.unwrap();
        wait_until(&mut harness, |s| s.meter.text == "0.50").await;
        assert_eq!(harness.display.borrow().meter.position, 75.0);

        harness.stop.send(()).unwrap();
        let controller = harness.session.await.unwrap();
        assert!(emitter.closed.load(Ordering::SeqCst));
        assert_eq!(
            emitter.sent(),
            vec![ClientEvent::StartTracking, ClientEvent::StopTracking]
        );
        assert!(!controller.is_active());
    }

    #[tokio::test]
    async fn test_denied_permission_returns_to_idle() {
        let emitter = RecordingEmitter::connected();
        let (controller, _processor) = controller(emitter.clone());
        let mut harness = spawn_session(controller, PermissionPolicy::Deny);

        assert_eq!(command(&harness, UiCommand::Start).await, Ok(()));
        wait_until(&mut harness, |s| !s.alerts.is_empty()).await;

        let state = harness.display.borrow().clone();
        assert_eq!(state.phase, SessionPhase::Idle);
        assert!(state.controls.start);
        assert!(!state.controls.stop);
        assert!(emitter.sent().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_command_reports_error() {
        let (controller, _processor) = controller(RecordingEmitter::connected());
        let harness = spawn_session(controller, PermissionPolicy::Grant);

        let result = command(&harness, UiCommand::Stop).await;
        assert!(result.is_err());
        let result = command(&harness, UiCommand::TogglePlayback).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_calibration_banner_expires() {
        let emitter = RecordingEmitter::connected();
        let (audio, _processor) = AudioGraph::offline(
            AudioConfig {
                media_path: PathBuf::from("/nonexistent/song.mp3"),
                ..AudioConfig::default()
            },
            48000,
        );
        let presentation = PresentationConfig {
            notification_ms: 300,
            ..PresentationConfig::default()
        };
        let mut controller = SessionController::new(emitter, audio, presentation);
        controller.dispatch(SessionEvent::ConnectionOpened);
        let mut harness = spawn_session(controller, PermissionPolicy::Grant);

        command(&harness, UiCommand::Start).await.unwrap();
        wait_until(&mut harness, |s| s.phase == SessionPhase::Active).await;

        command(&harness, UiCommand::Recenter).await.unwrap();
        assert!(harness.display.borrow().notification.is_some());
        wait_until(&mut harness, |s| s.notification.is_none()).await;
    }

    #[tokio::test]
    async fn test_connection_drop_goes_idle() {
        let emitter = RecordingEmitter::connected();
        let (controller, _processor) = controller(emitter.clone());
        let mut harness = spawn_session(controller, PermissionPolicy::Grant);

        command(&harness, UiCommand::Start).await.unwrap();
        wait_until(&mut harness, |s| s.phase == SessionPhase::Active).await;

        emitter.connected.store(false, Ordering::SeqCst);
        harness.events.send(SessionEvent::ConnectionClosed).await.unwrap();
        wait_until(&mut harness, |s| s.phase == SessionPhase::Idle).await;

        let state = harness.display.borrow().clone();
        assert_eq!(state.connection.text, "Disconnected from tracking server");
        assert!(state.controls.start);
    }

    #[tokio::test]
    async fn test_playback_loads_media_then_plays_to_end() {
        let path = write_test_wav(2, 48000, 4800);
        let config = AudioConfig {
            media_path: path.clone(),
            looped: false,
            ..AudioConfig::default()
        };
        let (audio, mut processor) = AudioGraph::offline(config, 48000);
        let mut controller =
            SessionController::new(RecordingEmitter::connected(), audio, PresentationConfig::default());
        controller.dispatch(SessionEvent::ConnectionOpened);
        let mut harness = spawn_session(controller, PermissionPolicy::Grant);

        command(&harness, UiCommand::Start).await.unwrap();
        wait_until(&mut harness, |s| s.phase == SessionPhase::Active).await;

        assert_eq!(command(&harness, UiCommand::TogglePlayback).await, Ok(()));
        // the loop keeps serving other commands while the file decodes
        command(&harness, UiCommand::SetVolume { percent: 40.0 })
            .await
            .unwrap();
        wait_until(&mut harness, |s| s.playing).await;

        let mut out = vec![0.0f32; 4800 * 2];
        processor.render(&mut out, 2);
        assert!(out.iter().any(|s| s.abs() > 0.0));
        processor.render(&mut out, 2);

        wait_until(&mut harness, |s| !s.playing).await;
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_missing_media_alerts_without_playing() {
        let (controller, _processor) = controller(RecordingEmitter::connected());
        let mut harness = spawn_session(controller, PermissionPolicy::Grant);

        command(&harness, UiCommand::Start).await.unwrap();
        wait_until(&mut harness, |s| s.phase == SessionPhase::Active).await;

        command(&harness, UiCommand::TogglePlayback).await.unwrap();
        wait_until(&mut harness, |s| !s.alerts.is_empty()).await;

        let state = harness.display.borrow().clone();
        assert!(!state.playing);
        assert!(state.alerts[0].message.starts_with("Cannot play audio"));
    }

    #[tokio::test]
    async fn test_volume_command_always_applies() {
        let (controller, _processor) = controller(RecordingEmitter::connected());
        let mut harness = spawn_session(controller, PermissionPolicy::Grant);

        command(&harness, UiCommand::SetVolume { percent: 30.0 })
            .await
            .unwrap();
        wait_until(&mut harness, |s| s.volume == 30.0).await;
    }
}
