use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use crate::session::Language;
use crate::{Error, Result};

/// Event reported by a platform speech recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Recognizer is listening
    Started,
    /// Final transcript of the utterance
    Transcript(String),
    /// Listening ended without recognizable speech
    NoSpeech,
    /// Recognizer failed
    Error(String),
    /// Recognizer stopped
    Ended,
}

/// Speech capture backend trait
///
/// Implementations wrap whatever recognizer the host platform offers:
/// - `ChannelCapture`: events pushed in by an embedding application
/// - `UnavailableCapture`: hosts without speech recognition
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Whether the host can recognize speech at all
    fn is_available(&self) -> bool;

    /// Start recognizing one utterance in `language`
    ///
    /// Returns the stream of recognizer events for this capture
    async fn start(&self, language: Language) -> Result<BoxStream<'static, CaptureEvent>>;

    /// Stop the current recognition, if any
    async fn stop(&self) {}

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Backend for hosts without speech recognition
pub struct UnavailableCapture {
    reason: String,
}

impl UnavailableCapture {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for UnavailableCapture {
    fn default() -> Self {
        Self::new("speech recognition is not available on this host")
    }
}

#[async_trait]
impl SpeechCapture for UnavailableCapture {
    fn is_available(&self) -> bool {
        false
    }

    async fn start(&self, _language: Language) -> Result<BoxStream<'static, CaptureEvent>> {
        Err(Error::CaptureUnsupported(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

struct ActiveCapture {
    language: Language,
    events: mpsc::UnboundedSender<CaptureEvent>,
}

type CaptureSlot = Arc<Mutex<Option<ActiveCapture>>>;

/// Backend fed by an external recognizer through a [`CaptureFeed`]
///
/// Each `start` opens a fresh event channel; events pushed while no capture
/// is running are dropped.
pub struct ChannelCapture {
    slot: CaptureSlot,
}

/// Sending half of a [`ChannelCapture`]
#[derive(Clone)]
pub struct CaptureFeed {
    slot: CaptureSlot,
}

impl ChannelCapture {
    pub fn new() -> (Self, CaptureFeed) {
        let slot: CaptureSlot = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            CaptureFeed { slot },
        )
    }
}

#[async_trait]
impl SpeechCapture for ChannelCapture {
    fn is_available(&self) -> bool {
        true
    }

    async fn start(&self, language: Language) -> Result<BoxStream<'static, CaptureEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let replaced = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(ActiveCapture {
                language,
                events: tx,
            });
        if replaced.is_some() {
            debug!("Replacing stale capture channel");
        }

        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(events.boxed())
    }

    async fn stop(&self) {
        // Dropping the sender ends the event stream
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn name(&self) -> &str {
        "channel"
    }
}

impl CaptureFeed {
    /// Deliver an event to the running capture
    ///
    /// Returns false if no capture is listening.
    pub fn push(&self, event: CaptureEvent) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = slot.as_ref() else {
            debug!("No capture running, dropping {:?}", event);
            return false;
        };

        let ended = matches!(event, CaptureEvent::Ended);
        let delivered = active.events.send(event).is_ok();
        if ended || !delivered {
            slot.take();
        }
        delivered
    }

    /// Language of the running capture
    pub fn active_language(&self) -> Option<Language> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.language)
    }

    pub fn is_listening(&self) -> bool {
        self.active_language().is_some()
    }
}
