use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::pcm::{to_pcm16, DecodedAudioBuffer};
use crate::{Error, Result};

/// Where a reply's audio was exported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavExport {
    pub path: PathBuf,
    pub frame_count: usize,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Write a decoded buffer as 16-bit PCM WAV.
///
/// Samples are converted back with the same 32768 convention the decoder
/// uses, so exporting a decoded payload reproduces the original integers.
pub fn write_wav(path: impl AsRef<Path>, buffer: &DecodedAudioBuffer) -> Result<WavExport> {
    let path = path.as_ref();

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let spec = hound::WavSpec {
        channels: buffer.channel_count(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    if let Err(e) = write_samples(&mut writer, buffer) {
        if let Err(finalize_err) = writer.finalize() {
            warn!("Failed to finalize partial WAV {}: {}", path.display(), finalize_err);
        }
        return Err(e);
    }
    writer.finalize()?;

    info!(
        "Exported reply audio: {} ({} frames, {}Hz, {} ch)",
        path.display(),
        buffer.frame_count(),
        buffer.sample_rate(),
        buffer.channel_count()
    );

    Ok(WavExport {
        path: path.to_path_buf(),
        frame_count: buffer.frame_count(),
        sample_rate: buffer.sample_rate(),
        channels: buffer.channel_count(),
    })
}

fn write_samples(
    writer: &mut hound::WavWriter<BufWriter<File>>,
    buffer: &DecodedAudioBuffer,
) -> Result<()> {
    for sample in buffer.interleaved() {
        writer.write_sample(to_pcm16(sample))?;
    }
    Ok(())
}

/// Read a 16-bit PCM WAV file into a decoded buffer
pub fn read_wav(path: impl AsRef<Path>) -> Result<DecodedAudioBuffer> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::MalformedAudio(format!(
            "{} is not 16-bit PCM ({:?}, {} bits)",
            path.display(),
            spec.sample_format,
            spec.bits_per_sample
        )));
    }

    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let bytes = super::pcm::encode_pcm16(&samples);
    super::pcm::decode(&bytes, spec.sample_rate, spec.channels)
}
