//! Control side of the playback graph
//!
//! [`AudioGraph`] owns the command channel into the render processor and the
//! output thread that keeps the cpal stream alive. It is created once per
//! process; if the output device cannot be opened the graph is marked
//! unavailable and every later operation is a silent no-op.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::resolve_output_device;
use crate::audio::media::MediaBuffer;
use crate::audio::processor::{GraphCommand, GraphMeters, GraphProcessor};
use crate::audio::ramp::ramp_frames;
use crate::config::AudioConfig;
use crate::constants::{DEFAULT_SAMPLE_RATE, GRAPH_COMMAND_CAPACITY};
use crate::error::AudioError;

/// How long `initialize` waits for the output thread to open the device
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphStatus {
    Uninitialized,
    Ready,
    Unavailable(String),
}

/// Thread owning the cpal output stream
struct OutputThread {
    running: Arc<AtomicBool>,
    resume: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl OutputThread {
    /// Open the device and build a paused stream around `processor`.
    /// Returns the device sample rate once the stream exists.
    fn spawn(device_id: String, mut processor: GraphProcessor) -> Result<(Self, u32), AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let resume = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = bounded::<Result<u32, AudioError>>(1);

        let running_for_loop = running.clone();
        let resume_for_loop = resume.clone();

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let device = match resolve_output_device(&device_id) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let supported = match device.default_output_config() {
                    Ok(config) => config,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if supported.sample_format() != cpal::SampleFormat::F32 {
                    let _ = ready_tx.send(Err(AudioError::UnsupportedFormat(format!(
                        "{:?} output on {}",
                        supported.sample_format(),
                        device.name
                    ))));
                    return;
                }

                let config: cpal::StreamConfig = supported.into();
                let channels = config.channels as usize;
                let sample_rate = config.sample_rate.0;
                let device_name = device.name.clone();
                let cpal_device = device.into_inner();

                let stream = cpal_device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        processor.render(data, channels);
                    },
                    |err| tracing::error!("Output stream error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };

                // Some hosts start streams on creation; stay suspended until resumed
                let _ = stream.pause();

                tracing::info!(
                    "Output stream ready on {} ({}Hz, {} channels)",
                    device_name,
                    sample_rate,
                    channels
                );
                let _ = ready_tx.send(Ok(sample_rate));

                let mut started = false;
                while running_for_loop.load(Ordering::Relaxed) {
                    if !started && resume_for_loop.load(Ordering::Relaxed) {
                        match stream.play() {
                            Ok(()) => tracing::info!("Audio output resumed"),
                            Err(e) => tracing::error!("Failed to start output stream: {}", e),
                        }
                        started = true;
                    }
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, stopping output
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let sample_rate = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                running.store(false, Ordering::SeqCst);
                return Err(AudioError::StreamError(
                    "timed out opening output device".to_string(),
                ));
            }
        };

        Ok((
            Self {
                running,
                resume,
                handle: Some(handle),
            },
            sample_rate,
        ))
    }

    fn resume(&self) {
        self.resume.store(true, Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode job for the graph's media file
///
/// Decoding a long file takes seconds, so the graph hands this out instead of
/// decoding inline; run it on a blocking thread and pass the buffer back
/// through [`AudioGraph::set_media`].
#[derive(Debug, Clone, PartialEq)]
pub struct MediaLoad {
    path: PathBuf,
    sample_rate: u32,
}

impl MediaLoad {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run(self) -> Result<MediaBuffer, AudioError> {
        MediaBuffer::load(&self.path, self.sample_rate)
    }
}

/// Playback element, panner and gain wired into the output device
pub struct AudioGraph {
    config: AudioConfig,
    status: GraphStatus,
    sample_rate: u32,
    commands: Option<Sender<GraphCommand>>,
    output: Option<OutputThread>,
    meters: Option<Arc<GraphMeters>>,
    media: Option<Arc<MediaBuffer>>,
    resumed: bool,
    playing: bool,
    /// `media_ends` meter value when playback last started
    ends_at_play: u64,
    pan: f32,
    volume: f32,
}

impl AudioGraph {
    pub fn new(config: AudioConfig) -> Self {
        let volume = config.initial_volume.clamp(0.0, 100.0);
        Self {
            config,
            status: GraphStatus::Uninitialized,
            sample_rate: DEFAULT_SAMPLE_RATE,
            commands: None,
            output: None,
            meters: None,
            media: None,
            resumed: false,
            playing: false,
            ends_at_play: 0,
            pan: 0.0,
            volume,
        }
    }

    /// A graph rendered by the caller instead of an audio device.
    ///
    /// Used for headless operation and tests; the returned processor must be
    /// pulled with [`GraphProcessor::render`].
    pub fn offline(config: AudioConfig, sample_rate: u32) -> (Self, GraphProcessor) {
        let mut graph = Self::new(config);
        let processor = graph.build_processor();
        graph.sample_rate = sample_rate;
        graph.status = GraphStatus::Ready;
        (graph, processor)
    }

    fn build_processor(&mut self) -> GraphProcessor {
        let (tx, rx) = bounded(GRAPH_COMMAND_CAPACITY);
        let processor = GraphProcessor::new(rx, self.volume / 100.0, self.config.looped);
        self.meters = Some(processor.meters());
        self.commands = Some(tx);
        processor
    }

    /// Open the output device and wire the graph. Only the first call does
    /// any work; later calls return the outcome of the first.
    pub fn initialize(&mut self) -> Result<(), AudioError> {
        match &self.status {
            GraphStatus::Ready => return Ok(()),
            GraphStatus::Unavailable(reason) => return Err(AudioError::Unavailable(reason.clone())),
            GraphStatus::Uninitialized => {}
        }

        let processor = self.build_processor();
        match OutputThread::spawn(self.config.output_device.clone(), processor) {
            Ok((output, sample_rate)) => {
                self.output = Some(output);
                self.sample_rate = sample_rate;
                self.status = GraphStatus::Ready;
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!("Audio output unavailable: {}", reason);
                self.disable(reason.clone());
                Err(AudioError::Unavailable(reason))
            }
        }
    }

    /// Mark the graph unusable; all later operations become no-ops
    pub(crate) fn disable(&mut self, reason: String) {
        self.commands = None;
        self.output = None;
        self.meters = None;
        self.playing = false;
        self.status = GraphStatus::Unavailable(reason);
    }

    pub fn status(&self) -> &GraphStatus {
        &self.status
    }

    pub fn is_available(&self) -> bool {
        self.status == GraphStatus::Ready
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Start the suspended output stream. Takes effect once.
    pub fn resume(&mut self) {
        if self.resumed || !self.is_available() {
            return;
        }
        self.resumed = true;
        if let Some(output) = &self.output {
            output.resume();
        }
    }

    fn ramp_frames(&self) -> u32 {
        ramp_frames(self.config.ramp(), self.sample_rate)
    }

    fn send(&self, command: GraphCommand) {
        if let Some(tx) = &self.commands {
            if tx.try_send(command).is_err() {
                tracing::warn!("Audio command queue full, dropping command");
            }
        }
    }

    /// Ramp the panner to `value`, which the caller has already clamped
    pub fn set_pan(&mut self, value: f32) {
        if !self.is_available() {
            return;
        }
        self.pan = value;
        self.send(GraphCommand::SetPan {
            value,
            frames: self.ramp_frames(),
        });
    }

    /// Ramp the gain to `percent / 100`
    pub fn set_volume(&mut self, percent: f32) {
        if !self.is_available() {
            return;
        }
        self.volume = percent.clamp(0.0, 100.0);
        self.send(GraphCommand::SetGain {
            value: volume_to_gain(self.volume),
            frames: self.ramp_frames(),
        });
    }

    /// Hand the graph pre-decoded media, replacing anything loaded before
    pub fn set_media(&mut self, media: MediaBuffer) {
        let media = Arc::new(media);
        self.media = Some(media.clone());
        self.send(GraphCommand::Load(media));
    }

    pub fn has_media(&self) -> bool {
        self.media.is_some()
    }

    /// The decode job still needed before playback can start, if any
    pub fn media_load(&self) -> Option<MediaLoad> {
        if !self.is_available() || self.media.is_some() {
            return None;
        }
        Some(MediaLoad {
            path: self.config.media_path.clone(),
            sample_rate: self.sample_rate,
        })
    }

    /// Toggle between playing and paused; returns the new playing flag.
    /// Starting requires media from [`AudioGraph::set_media`]; without it the
    /// flag is left unchanged.
    pub fn toggle_playback(&mut self) -> Result<bool, AudioError> {
        if !self.is_available() {
            return Ok(self.playing);
        }

        if self.is_playing() {
            self.pause();
            return Ok(false);
        }

        if self.media.is_none() {
            return Err(AudioError::Media("no media loaded".to_string()));
        }
        self.ends_at_play = self.meters.as_ref().map_or(0, |m| m.media_ends());
        self.send(GraphCommand::Play);
        self.playing = true;
        tracing::info!("Playback started");
        Ok(true)
    }

    /// Pause if playing
    pub fn pause(&mut self) {
        if !self.is_playing() {
            self.playing = false;
            return;
        }
        self.send(GraphCommand::Pause);
        self.playing = false;
        tracing::info!("Playback paused");
    }

    /// Playing unless paused or the render side ran off the end of
    /// non-looped media
    pub fn is_playing(&self) -> bool {
        self.playing && !self.reached_end()
    }

    fn reached_end(&self) -> bool {
        self.meters
            .as_ref()
            .is_some_and(|m| m.media_ends() > self.ends_at_play)
    }

    /// Last pan target requested
    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Current volume in percent
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Values observed by the render thread, if it exists
    pub fn meters(&self) -> Option<Arc<GraphMeters>> {
        self.meters.clone()
    }

    /// Stop the output thread
    pub fn shutdown(&mut self) {
        self.pause();
        if let Some(mut output) = self.output.take() {
            output.stop();
        }
    }
}

/// Linear map from volume percent to gain multiplier
pub fn volume_to_gain(percent: f32) -> f32 {
    percent.clamp(0.0, 100.0) / 100.0
}
