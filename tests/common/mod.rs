//! Shared test utilities: stand-ins for the advisory service and the sound card
#![allow(dead_code)]

use agrivoice::advisor::{ImageDiagnoser, SpeechSynthesizer, TextGenerator};
use agrivoice::audio::{
    AudioOutput, AudioPayload, DecodedAudioBuffer, OutputFactory, PlaybackHandle, PlaybackPolicy,
    PlaybackScheduler, SchedulerConfig,
};
use agrivoice::session::{ConversationSession, Language, SessionConfig};
use agrivoice::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Text generator with a canned reply
pub struct StubAdvisor {
    reply: std::result::Result<String, String>,
    delay: Duration,
    calls: Mutex<Vec<(String, Language)>>,
}

impl StubAdvisor {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(String, Language)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for StubAdvisor {
    async fn generate_reply(&self, prompt: &str, language: Language) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), language));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(Error::Service)
    }
}

#[async_trait]
impl ImageDiagnoser for StubAdvisor {
    async fn diagnose(&self, image: &[u8], mime_type: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((format!("{} bytes of {}", image.len(), mime_type), Language::English));
        self.reply.clone().map_err(Error::Service)
    }
}

/// Speech synthesizer with a canned payload
pub struct StubSpeech {
    payload: std::result::Result<AudioPayload, String>,
    delay: Duration,
    calls: Mutex<Vec<(String, Language)>>,
}

impl StubSpeech {
    pub fn returning(payload: AudioPayload) -> Self {
        Self {
            payload: Ok(payload),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            payload: Err(message.to_string()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(String, Language)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for StubSpeech {
    async fn synthesize(&self, text: &str, language: Language) -> Result<AudioPayload> {
        self.calls.lock().unwrap().push((text.to_string(), language));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.payload.clone().map_err(Error::Service)
    }
}

/// One buffer started on a [`RecordingOutput`]
#[derive(Debug, Clone)]
pub struct StartedBuffer {
    pub frame_count: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub started_at: Instant,
    pub stopped: Arc<AtomicBool>,
}

struct RecordingState {
    play_time: Option<Duration>,
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
    fail_starts: AtomicBool,
    started: Mutex<Vec<StartedBuffer>>,
}

/// Output device that records what it is asked to play.
///
/// Every buffer "plays" for a fixed time, or until stopped when no play
/// time is set.
#[derive(Clone)]
pub struct RecordingOutput {
    state: Arc<RecordingState>,
}

impl RecordingOutput {
    /// Each buffer finishes after `play_time`
    pub fn new(play_time: Duration) -> Self {
        Self::build(Some(play_time))
    }

    /// Buffers play until stopped
    pub fn holding() -> Self {
        Self::build(None)
    }

    fn build(play_time: Option<Duration>) -> Self {
        Self {
            state: Arc::new(RecordingState {
                play_time,
                opens: AtomicUsize::new(0),
                failing_opens: AtomicUsize::new(0),
                fail_starts: AtomicBool::new(false),
                started: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The next `count` device opens fail
    pub fn fail_next_opens(&self, count: usize) {
        self.state.failing_opens.store(count, Ordering::SeqCst);
    }

    pub fn fail_starts(&self, fail: bool) {
        self.state.fail_starts.store(fail, Ordering::SeqCst);
    }

    /// How many times the device was opened
    pub fn opens(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<StartedBuffer> {
        self.state.started.lock().unwrap().clone()
    }

    pub fn factory(&self) -> OutputFactory {
        let output = self.clone();
        Box::new(move || {
            let failing = output.state.failing_opens.load(Ordering::SeqCst);
            if failing > 0 {
                output.state.failing_opens.store(failing - 1, Ordering::SeqCst);
                return Err(Error::PlaybackDevice("no output device".to_string()));
            }
            output.state.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(output.clone()) as Box<dyn AudioOutput>)
        })
    }
}

impl AudioOutput for RecordingOutput {
    fn start(&self, buffer: &DecodedAudioBuffer) -> Result<Box<dyn PlaybackHandle>> {
        if self.state.fail_starts.load(Ordering::SeqCst) {
            return Err(Error::PlaybackDevice("buffer rejected".to_string()));
        }

        let started = StartedBuffer {
            frame_count: buffer.frame_count(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channel_count(),
            started_at: Instant::now(),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        self.state.started.lock().unwrap().push(started.clone());

        Ok(Box::new(FakeHandle {
            ends_at: self.state.play_time.map(|t| started.started_at + t),
            stopped: started.stopped,
        }))
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct FakeHandle {
    ends_at: Option<Instant>,
    stopped: Arc<AtomicBool>,
}

impl PlaybackHandle for FakeHandle {
    fn is_finished(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
            || self.ends_at.is_some_and(|end| Instant::now() >= end)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Scheduler over a recording output with fast completion polling
pub fn scheduler(output: &RecordingOutput, policy: PlaybackPolicy) -> PlaybackScheduler {
    PlaybackScheduler::new(
        SchedulerConfig {
            policy,
            poll_interval: Duration::from_millis(5),
        },
        output.factory(),
    )
}

/// 24 kHz mono speech payload
pub fn speech_payload(samples: &[i16]) -> AudioPayload {
    AudioPayload::from_samples(samples, 24000, 1)
}

/// Session without a greeting, wired to the given stubs
pub fn session(
    config: SessionConfig,
    advisor: Arc<StubAdvisor>,
    speech: Arc<StubSpeech>,
    output: &RecordingOutput,
) -> ConversationSession {
    ConversationSession::new(
        SessionConfig {
            greeting: String::new(),
            ..config
        },
        advisor,
        speech,
        scheduler(output, PlaybackPolicy::Mix),
    )
}
