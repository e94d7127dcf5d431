//! Media loading
//!
//! Decodes the playback file into an interleaved stereo buffer at the
//! output device rate. Mono sources are duplicated to both channels and
//! anything wider than stereo keeps its first two channels.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::constants::GRAPH_CHANNELS;
use crate::error::AudioError;

/// Decoded, interleaved stereo audio
#[derive(Debug, Clone)]
pub struct MediaBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl MediaBuffer {
    /// Wrap already interleaved stereo samples
    pub fn from_interleaved(samples: Vec<f32>, sample_rate: u32) -> Self {
        debug_assert!(samples.len() % GRAPH_CHANNELS == 0);
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decode `path` and resample it to `target_rate`
    pub fn load<P: AsRef<Path>>(path: P, target_rate: u32) -> Result<Self, AudioError> {
        let path = path.as_ref();
        let (samples, source_rate) = decode_stereo(path)?;

        if samples.is_empty() {
            return Err(AudioError::Media(format!(
                "{} contains no audio",
                path.display()
            )));
        }

        let samples = if source_rate != target_rate {
            resample(samples, source_rate, target_rate)?
        } else {
            samples
        };

        tracing::info!(
            "Loaded {} ({} frames at {}Hz)",
            path.display(),
            samples.len() / GRAPH_CHANNELS,
            target_rate
        );

        Ok(Self::from_interleaved(samples, target_rate))
    }

    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / GRAPH_CHANNELS
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Left/right samples of frame `index`
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        let i = index * GRAPH_CHANNELS;
        (self.samples[i], self.samples[i + 1])
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode every packet of the first audio track into interleaved stereo
fn decode_stereo(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let src = File::open(path)
        .map_err(|e| AudioError::Media(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Media(format!("{}: {}", path.display(), e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::Media(format!("{}: no supported audio track", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();
    let mut source_rate = track.codec_params.sample_rate.unwrap_or(0);

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            // Chained streams are not supported; keep what was decoded so far
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Media(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                source_rate = spec.rate;
                let channels = spec.channels.count();

                let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);

                for frame in sample_buf.samples().chunks(channels) {
                    match frame {
                        [mono] => samples.extend_from_slice(&[*mono, *mono]),
                        [left, right, ..] => samples.extend_from_slice(&[*left, *right]),
                        [] => {}
                    }
                }
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(AudioError::Media(e.to_string())),
        }
    }

    if source_rate == 0 {
        return Err(AudioError::Media(format!(
            "{}: unknown sample rate",
            path.display()
        )));
    }

    Ok((samples, source_rate))
}

/// Resample interleaved stereo with a sinc interpolator
fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>, AudioError> {
    let frames = samples.len() / GRAPH_CHANNELS;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in samples.chunks_exact(GRAPH_CHANNELS) {
        left.push(frame[0]);
        right.push(frame[1]);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        to as f64 / from as f64,
        2.0,
        params,
        frames,
        GRAPH_CHANNELS,
    )
    .map_err(|e| AudioError::Media(format!("resampler: {}", e)))?;

    let waves_in = vec![left, right];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| AudioError::Media(format!("resampling {}Hz -> {}Hz: {}", from, to, e)))?;

    let out_frames = waves_out[0].len().min(waves_out[1].len());
    let mut out = Vec::with_capacity(out_frames * GRAPH_CHANNELS);
    for i in 0..out_frames {
        out.push(waves_out[0][i]);
        out.push(waves_out[1][i]);
    }
    Ok(out)
}
