//! Render-side graph: media element → stereo panner → gain → device
//!
//! Runs inside the output stream callback. Parameter changes arrive as
//! [`GraphCommand`]s and are drained at the start of every buffer, so the
//! callback never blocks on the control side.

use crossbeam_channel::Receiver;
use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::media::MediaBuffer;
use crate::audio::ramp::LinearRamp;

/// Control → render messages
#[derive(Debug, Clone)]
pub enum GraphCommand {
    /// Replace the media element's source and rewind
    Load(Arc<MediaBuffer>),
    Play,
    Pause,
    /// Ramp pan to `value` over `frames`
    SetPan { value: f32, frames: u32 },
    /// Ramp gain to `value` over `frames`
    SetGain { value: f32, frames: u32 },
}

/// Equal-power stereo panning of a stereo input
///
/// Same curve as the Web Audio `StereoPannerNode`: panning left folds the
/// right channel into the left, panning right folds left into right.
#[inline]
pub fn stereo_pan(pan: f32, left: f32, right: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        (left + right * x.cos(), right * x.sin())
    } else {
        let x = pan * FRAC_PI_2;
        (left * x.cos(), right + left * x.sin())
    }
}

/// Stereo panner with a smoothed pan parameter
#[derive(Debug, Clone)]
pub struct PanNode {
    pan: LinearRamp,
}

impl PanNode {
    pub fn new() -> Self {
        Self {
            pan: LinearRamp::new(0.0),
        }
    }

    pub fn set_target(&mut self, value: f32, frames: u32) {
        self.pan.set_target(value.clamp(-1.0, 1.0), frames);
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        stereo_pan(self.pan.next(), left, right)
    }

    pub fn value(&self) -> f32 {
        self.pan.value()
    }
}

impl Default for PanNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Gain stage with a smoothed multiplier
#[derive(Debug, Clone)]
pub struct GainNode {
    gain: LinearRamp,
}

impl GainNode {
    pub fn new(gain: f32) -> Self {
        Self {
            gain: LinearRamp::new(gain),
        }
    }

    pub fn set_target(&mut self, value: f32, frames: u32) {
        self.gain.set_target(value.max(0.0), frames);
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let g = self.gain.next();
        (left * g, right * g)
    }

    pub fn value(&self) -> f32 {
        self.gain.value()
    }
}

/// Values published by the render thread for the control side
#[derive(Debug, Default)]
pub struct GraphMeters {
    pan_bits: AtomicU32,
    gain_bits: AtomicU32,
    playing: AtomicBool,
    frames_rendered: AtomicU64,
    media_ends: AtomicU64,
}

impl GraphMeters {
    /// Pan value the panner actually used for the last rendered frame
    pub fn pan(&self) -> f32 {
        f32::from_bits(self.pan_bits.load(Ordering::Relaxed))
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain_bits.load(Ordering::Relaxed))
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Times non-looped media ran out and playback stopped on its own
    pub fn media_ends(&self) -> u64 {
        self.media_ends.load(Ordering::Acquire)
    }
}

/// The render half of the audio graph
pub struct GraphProcessor {
    commands: Receiver<GraphCommand>,
    media: Option<Arc<MediaBuffer>>,
    position: usize,
    playing: bool,
    looped: bool,
    pan: PanNode,
    gain: GainNode,
    meters: Arc<GraphMeters>,
}

impl GraphProcessor {
    pub fn new(commands: Receiver<GraphCommand>, initial_gain: f32, looped: bool) -> Self {
        let meters = Arc::new(GraphMeters::default());
        meters.gain_bits.store(initial_gain.to_bits(), Ordering::Relaxed);
        Self {
            commands,
            media: None,
            position: 0,
            playing: false,
            looped,
            pan: PanNode::new(),
            gain: GainNode::new(initial_gain),
            meters,
        }
    }

    pub fn meters(&self) -> Arc<GraphMeters> {
        self.meters.clone()
    }

    /// Fill an interleaved device buffer with `channels` channels
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        self.drain_commands();

        if channels == 0 {
            return;
        }

        let mut frames = 0u64;
        for frame in output.chunks_mut(channels) {
            let (l, r) = self.next_source_frame();
            let (l, r) = self.pan.process(l, r);
            let (l, r) = self.gain.process(l, r);
            write_frame(frame, l, r);
            frames += 1;
        }

        self.meters
            .pan_bits
            .store(self.pan.value().to_bits(), Ordering::Relaxed);
        self.meters
            .gain_bits
            .store(self.gain.value().to_bits(), Ordering::Relaxed);
        self.meters.playing.store(self.playing, Ordering::Relaxed);
        self.meters
            .frames_rendered
            .fetch_add(frames, Ordering::Relaxed);
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                GraphCommand::Load(media) => {
                    self.media = Some(media);
                    self.position = 0;
                }
                GraphCommand::Play => {
                    self.playing = self.media.as_ref().is_some_and(|m| !m.is_empty());
                }
                GraphCommand::Pause => self.playing = false,
                GraphCommand::SetPan { value, frames } => self.pan.set_target(value, frames),
                GraphCommand::SetGain { value, frames } => self.gain.set_target(value, frames),
            }
        }
    }

    #[inline]
    fn next_source_frame(&mut self) -> (f32, f32) {
        if !self.playing {
            return (0.0, 0.0);
        }
        let Some(media) = self.media.as_ref() else {
            return (0.0, 0.0);
        };

        let sample = media.frame(self.position);
        self.position += 1;
        if self.position >= media.frames() {
            self.position = 0;
            if !self.looped {
                self.playing = false;
                self.meters.media_ends.fetch_add(1, Ordering::Release);
            }
        }
        sample
    }
}

/// Write a stereo frame into a device frame of any width
#[inline]
fn write_frame(frame: &mut [f32], left: f32, right: f32) {
    match frame {
        [mono] => *mono = (left + right) * 0.5,
        [l, r, rest @ ..] => {
            *l = left;
            *r = right;
            rest.iter_mut().for_each(|s| *s = 0.0);
        }
        [] => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};

    fn processor_with_tone(value: f32, frames: usize) -> (Sender<GraphCommand>, GraphProcessor) {
        let (tx, rx) = unbounded();
        let processor = GraphProcessor::new(rx, 1.0, true);
        let media = MediaBuffer::from_interleaved(vec![value; frames * 2], 48000);
        tx.send(GraphCommand::Load(Arc::new(media))).unwrap();
        (tx, processor)
    }

    #[test]
    fn test_stereo_pan_law() {
        // centre leaves a stereo signal untouched
        let (l, r) = stereo_pan(0.0, 0.5, 0.25);
        assert!((l - 0.5).abs() < 1e-6);
        assert!((r - 0.25).abs() < 1e-6);

        // hard left folds everything into the left channel
        let (l, r) = stereo_pan(-1.0, 0.5, 0.25);
        assert!((l - 0.75).abs() < 1e-6);
        assert!(r.abs() < 1e-6);

        // hard right folds everything into the right channel
        let (l, r) = stereo_pan(1.0, 0.5, 0.25);
        assert!(l.abs() < 1e-6);
        assert!((r - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_silent_until_play() {
        let (tx, mut processor) = processor_with_tone(0.5, 64);
        let mut out = vec![1.0f32; 32];
        processor.render(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.0));

        tx.send(GraphCommand::Play).unwrap();
        processor.render(&mut out, 2);
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(processor.meters().is_playing());
    }

    #[test]
    fn test_play_without_media_stays_silent() {
        let (tx, rx) = unbounded();
        let mut processor = GraphProcessor::new(rx, 1.0, true);
        tx.send(GraphCommand::Play).unwrap();
        let mut out = vec![1.0f32; 16];
        processor.render(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.0));
        assert!(!processor.meters().is_playing());
    }

    #[test]
    fn test_pan_ramp_is_gradual() {
        let (tx, mut processor) = processor_with_tone(0.5, 1024);
        tx.send(GraphCommand::Play).unwrap();
        tx.send(GraphCommand::SetPan { value: 1.0, frames: 100 }).unwrap();

        let mut out = vec![0.0f32; 200 * 2];
        processor.render(&mut out, 2);

        // first frame is barely panned, last is hard right
        assert!(out[0] > 0.45);
        assert!(out[398].abs() < 1e-5);
        assert!((out[399] - 1.0).abs() < 1e-5);
        assert_eq!(processor.meters().pan(), 1.0);
    }

    #[test]
    fn test_gain_ramp_and_mono_downmix() {
        let (tx, mut processor) = processor_with_tone(0.5, 1024);
        tx.send(GraphCommand::Play).unwrap();
        tx.send(GraphCommand::SetGain { value: 0.0, frames: 10 }).unwrap();

        let mut out = vec![0.0f32; 20];
        processor.render(&mut out, 1);
        assert!(out[0] > 0.0);
        assert_eq!(out[19], 0.0);
        assert_eq!(processor.meters().gain(), 0.0);
    }

    #[test]
    fn test_non_looped_media_stops_at_end() {
        let (tx, rx) = unbounded();
        let mut processor = GraphProcessor::new(rx, 1.0, false);
        let media = MediaBuffer::from_interleaved(vec![0.5; 8], 48000);
        tx.send(GraphCommand::Load(Arc::new(media))).unwrap();
        tx.send(GraphCommand::Play).unwrap();

        let mut out = vec![0.0f32; 16];
        processor.render(&mut out, 2);
        assert!(out[..8].iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert!(out[8..].iter().all(|s| *s == 0.0));
        assert!(!processor.meters().is_playing());
        assert_eq!(processor.meters().media_ends(), 1);

        // replay starts from the top
        tx.send(GraphCommand::Play).unwrap();
        processor.render(&mut out, 2);
        assert!(out[..8].iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert_eq!(processor.meters().media_ends(), 2);
    }

    #[test]
    fn test_looped_media_never_ends() {
        let (tx, mut processor) = processor_with_tone(0.5, 4);
        tx.send(GraphCommand::Play).unwrap();
        let mut out = vec![0.0f32; 64];
        processor.render(&mut out, 2);
        assert!(out.iter().all(|s| (*s - 0.5).abs() < 1e-6));
        assert_eq!(processor.meters().media_ends(), 0);
    }

    #[test]
    fn test_extra_device_channels_are_zeroed() {
        let (tx, mut processor) = processor_with_tone(0.5, 64);
        tx.send(GraphCommand::Play).unwrap();
        let mut out = vec![1.0f32; 4 * 4];
        processor.render(&mut out, 4);
        for frame in out.chunks(4) {
            assert_eq!(frame[2], 0.0);
            assert_eq!(frame[3], 0.0);
        }
    }
}
