use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::backend::{CaptureEvent, SpeechCapture};
use crate::session::{ConversationSession, Language, TurnOutcome};
use crate::{Error, Result};

/// Turns a speech-capture backend into one awaited transcript per call
/// and feeds transcripts into a conversation session.
///
/// Only one capture runs at a time; a second start while one is running
/// fails with [`Error::CaptureBusy`].
pub struct CaptureBridge {
    backend: Arc<dyn SpeechCapture>,
    timeout: Duration,
    active: AtomicBool,
    cancel: Notify,
}

impl CaptureBridge {
    pub fn new(backend: Arc<dyn SpeechCapture>, timeout: Duration) -> Self {
        info!("Capture bridge using {} backend", backend.name());
        Self {
            backend,
            timeout,
            active: AtomicBool::new(false),
            cancel: Notify::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Capture one utterance and return its transcript
    ///
    /// # Errors
    ///
    /// - `CaptureUnsupported` if the backend cannot recognize speech
    /// - `CaptureBusy` if another capture is running
    /// - `CaptureAborted` on cancel, no speech, or recognizer failure
    /// - `Timeout` if no transcript arrives in time
    pub async fn start_capture(&self, language: Language) -> Result<String> {
        if !self.backend.is_available() {
            return Err(Error::CaptureUnsupported(format!(
                "{} backend cannot recognize speech",
                self.backend.name()
            )));
        }

        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Rejecting capture while another is running");
            return Err(Error::CaptureBusy);
        }
        let _active = ActiveGuard(&self.active);

        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        info!("Listening ({})", language);
        let outcome = tokio::select! {
            result = tokio::time::timeout(self.timeout, self.recognize(language)) => {
                result.unwrap_or(Err(Error::Timeout {
                    operation: "speech capture",
                    after: self.timeout,
                }))
            }
            _ = &mut cancelled => Err(Error::CaptureAborted("cancelled".to_string())),
        };

        if outcome.is_err() {
            self.backend.stop().await;
        }
        outcome
    }

    /// Cancel the running capture, if any
    pub fn cancel(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        debug!("Cancelling capture");
        self.cancel.notify_waiters();
        true
    }

    /// Capture a question and submit it to the session
    ///
    /// The session reports `is_capturing` while listening. Closing the
    /// session aborts the capture.
    pub async fn listen(&self, session: &ConversationSession) -> Result<TurnOutcome> {
        let transcript = {
            let _capturing = session.begin_capture()?;
            tokio::select! {
                result = self.start_capture(session.language()) => result?,
                _ = session.closed() => {
                    self.backend.stop().await;
                    return Err(Error::SessionClosed);
                }
            }
        };

        info!("Transcript: {}", transcript);
        session.submit_user_text(&transcript).await
    }

    async fn recognize(&self, language: Language) -> Result<String> {
        let mut events = self.backend.start(language).await?;

        while let Some(event) = events.next().await {
            match event {
                CaptureEvent::Started => debug!("Recognizer started"),
                CaptureEvent::Transcript(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Ok(text.to_string());
                    }
                    debug!("Ignoring empty transcript");
                }
                CaptureEvent::NoSpeech => {
                    return Err(Error::CaptureAborted("no speech detected".to_string()));
                }
                CaptureEvent::Error(reason) => return Err(Error::CaptureAborted(reason)),
                CaptureEvent::Ended => break,
            }
        }

        Err(Error::CaptureAborted(
            "recognizer ended without a transcript".to_string(),
        ))
    }
}

struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
