use std::sync::mpsc as std_mpsc;
use std::thread;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use super::pcm::DecodedAudioBuffer;
use crate::{Error, Result};

/// A sound output device that can start buffers.
///
/// Implementations:
/// - `RodioOutput`: default system output via rodio, buffers are mixed
/// - test doubles that record submissions without a sound card
pub trait AudioOutput: Send + Sync {
    /// Start playing a buffer immediately
    fn start(&self, buffer: &DecodedAudioBuffer) -> Result<Box<dyn PlaybackHandle>>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Control over one started buffer
pub trait PlaybackHandle: Send {
    /// True once the device has played everything
    fn is_finished(&self) -> bool;

    /// Stop playing and release the buffer
    fn stop(&self);
}

/// Opens the output device. Called at most once per scheduler.
pub type OutputFactory = Box<dyn Fn() -> Result<Box<dyn AudioOutput>> + Send + Sync>;

/// Factory for the default system output
pub fn default_output_factory() -> OutputFactory {
    Box::new(|| Ok(Box::new(RodioOutput::open()?) as Box<dyn AudioOutput>))
}

struct StartRequest {
    channels: u16,
    sample_rate: u32,
    samples: Vec<f32>,
    reply: std_mpsc::Sender<Sink>,
}

/// Default output device through rodio.
///
/// The rodio stream stays on a dedicated thread for the lifetime of this
/// value; sinks created there are handed back and mixed by the device.
pub struct RodioOutput {
    requests: std_mpsc::Sender<StartRequest>,
}

impl RodioOutput {
    /// Open the default output stream
    pub fn open() -> Result<Self> {
        let (request_tx, request_rx) = std_mpsc::channel::<StartRequest>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<std::result::Result<(), String>>();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Runs until the RodioOutput (and its sender) is dropped
                while let Ok(request) = request_rx.recv() {
                    let sink = Sink::connect_new(stream.mixer());
                    sink.append(SamplesBuffer::new(
                        request.channels,
                        request.sample_rate,
                        request.samples,
                    ));
                    if request.reply.send(sink).is_err() {
                        debug!("Start request abandoned before sink was returned");
                    }
                }

                info!("Audio output thread stopped");
            })
            .map_err(|e| Error::PlaybackDevice(format!("failed to spawn audio thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Audio output opened (default device)");
                Ok(Self {
                    requests: request_tx,
                })
            }
            Ok(Err(e)) => Err(Error::PlaybackDevice(format!("failed to open audio output: {e}"))),
            Err(_) => Err(Error::PlaybackDevice("audio output thread exited".to_string())),
        }
    }
}

impl AudioOutput for RodioOutput {
    fn start(&self, buffer: &DecodedAudioBuffer) -> Result<Box<dyn PlaybackHandle>> {
        let (reply_tx, reply_rx) = std_mpsc::channel();

        self.requests
            .send(StartRequest {
                channels: buffer.channel_count(),
                sample_rate: buffer.sample_rate(),
                samples: buffer.interleaved(),
                reply: reply_tx,
            })
            .map_err(|_| Error::PlaybackDevice("audio output thread is gone".to_string()))?;

        let sink = reply_rx.recv().map_err(|_| {
            warn!("Audio output thread dropped a start request");
            Error::PlaybackDevice("buffer failed to start".to_string())
        })?;

        Ok(Box::new(SinkHandle { sink }))
    }

    fn name(&self) -> &str {
        "rodio-default"
    }
}

struct SinkHandle {
    sink: Sink,
}

impl PlaybackHandle for SinkHandle {
    fn is_finished(&self) -> bool {
        self.sink.empty()
    }

    fn stop(&self) {
        self.sink.stop();
    }
}
