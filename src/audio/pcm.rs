//! Signed 16-bit little-endian PCM decoding.
//!
//! The synthesis service returns base64 text wrapping raw interleaved PCM16.
//! Decoding de-interleaves into one sample sequence per channel and
//! normalizes with `sample / 32768.0`. The divisor is the asymmetric PCM16
//! convention (not 32767) and must stay that way to match the provider.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sample rate of synthesized speech (Hz)
pub const SPEECH_SAMPLE_RATE: u32 = 24000;

/// Channel count of synthesized speech
pub const SPEECH_CHANNELS: u16 = 1;

/// Divisor mapping an i16 sample into [-1.0, 1.0)
const PCM16_SCALE: f32 = 32768.0;

const BYTES_PER_SAMPLE: usize = 2;

/// Sample encoding of an audio payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian PCM
    #[default]
    S16Le,
}

/// Encoded audio as received from the synthesis service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPayload {
    /// Base64 text of the raw PCM bytes
    pub data: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Always PCM16 LE
    #[serde(default)]
    pub format: SampleFormat,
}

impl AudioPayload {
    /// Wrap base64 PCM16 text received from the speech service
    pub fn speech(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            sample_rate: SPEECH_SAMPLE_RATE,
            channels: SPEECH_CHANNELS,
            format: SampleFormat::S16Le,
        }
    }

    /// Build a payload from interleaved samples
    pub fn from_samples(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(encode_pcm16(samples)),
            sample_rate,
            channels,
            format: SampleFormat::S16Le,
        }
    }

    /// Decode into a playable buffer
    pub fn decode(&self) -> Result<DecodedAudioBuffer> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(self.data.trim())
            .map_err(|e| Error::MalformedAudio(format!("invalid base64: {e}")))?;
        decode(&bytes, self.sample_rate, self.channels)
    }
}

/// Decoded, de-interleaved audio
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    sample_rate: u32,
    /// One sample sequence per channel, all of equal length
    channels: Vec<Vec<f32>>,
}

impl DecodedAudioBuffer {
    /// Build from per-channel samples
    ///
    /// Channels must be non-empty and of equal length; samples are clamped
    /// to [-1.0, 1.0] and non-finite values become silence.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::MalformedAudio("no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(Error::MalformedAudio("sample rate must be positive".to_string()));
        }
        let frame_count = channels[0].len();
        if channels.iter().any(|c| c.len() != frame_count) {
            return Err(Error::MalformedAudio("channels differ in length".to_string()));
        }

        let channels = channels
            .into_iter()
            .map(|c| {
                c.into_iter()
                    .map(|s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
                    .collect()
            })
            .collect();

        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Samples of one channel
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Nominal playback duration
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / f64::from(self.sample_rate))
    }

    /// Re-interleave for output devices (frame-major, channel-minor)
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frame_count();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for frame in 0..frames {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }
}

/// Decode PCM16 LE bytes into a de-interleaved buffer.
///
/// Fails with [`Error::MalformedAudio`] when the byte count is odd or the
/// sample count is not a whole number of frames; nothing is decoded then.
pub fn decode(bytes: &[u8], sample_rate: u32, channel_count: u16) -> Result<DecodedAudioBuffer> {
    if channel_count == 0 {
        return Err(Error::MalformedAudio("channel count must be at least 1".to_string()));
    }
    if sample_rate == 0 {
        return Err(Error::MalformedAudio("sample rate must be positive".to_string()));
    }
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(Error::MalformedAudio(format!(
            "odd byte length {} for 16-bit samples",
            bytes.len()
        )));
    }

    let total_samples = bytes.len() / BYTES_PER_SAMPLE;
    let channels = usize::from(channel_count);
    if total_samples % channels != 0 {
        return Err(Error::MalformedAudio(format!(
            "{total_samples} samples do not divide into {channels} channels"
        )));
    }

    let frame_count = total_samples / channels;
    let mut planar = vec![Vec::with_capacity(frame_count); channels];

    for (i, pair) in bytes.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
        let sample = i16::from_le_bytes([pair[0], pair[1]]);
        planar[i % channels].push(f32::from(sample) / PCM16_SCALE);
    }

    Ok(DecodedAudioBuffer {
        sample_rate,
        channels: planar,
    })
}

/// Encode interleaved samples as PCM16 LE bytes
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Convert a normalized sample back to i16 with the same convention
pub fn to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_SCALE).round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}
