use super::config::{Language, SessionConfig};
use super::stats::{CachedAudio, Message, Role, SessionStats, SpeechOutcome, TurnOutcome, TurnPhase};
use crate::advisor::{SpeechSynthesizer, TextGenerator};
use crate::audio::{write_wav, DecodedAudioBuffer, PlaybackId, PlaybackScheduler};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// A conversation with the advisory service.
///
/// Tracks message history and turn state, sends questions to the text
/// generator, and hands spoken replies to the playback scheduler. Only one
/// turn may be in flight; replays of earlier replies run independently.
pub struct ConversationSession {
    /// Session configuration
    config: SessionConfig,

    /// Text-generation capability
    advisor: Arc<dyn TextGenerator>,

    /// Speech-synthesis capability
    speech: Arc<dyn SpeechSynthesizer>,

    /// Shared playback of reply audio
    scheduler: PlaybackScheduler,

    /// When the session started
    started_at: DateTime<Utc>,

    /// Mutable state; never held across an await
    inner: Mutex<SessionInner>,

    /// Set once by `close`; late results are discarded
    closed: AtomicBool,

    /// Wakes `closed()` waiters
    shutdown: Notify,
}

struct SessionInner {
    history: Vec<Message>,
    language: Language,
    phase: TurnPhase,
    capturing: bool,
    audio_cache: HashMap<usize, CachedAudio>,
    turns_completed: usize,
    turns_failed: usize,
    speech_failures: usize,
}

impl ConversationSession {
    /// Create a session. History starts with the configured greeting.
    pub fn new(
        config: SessionConfig,
        advisor: Arc<dyn TextGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        scheduler: PlaybackScheduler,
    ) -> Self {
        info!(
            "Creating conversation session: {} ({})",
            config.session_id, config.language
        );

        let mut history = Vec::new();
        if !config.greeting.trim().is_empty() {
            history.push(Message::model(config.greeting.trim()));
        }

        Self {
            inner: Mutex::new(SessionInner {
                history,
                language: config.language,
                phase: TurnPhase::Idle,
                capturing: false,
                audio_cache: HashMap::new(),
                turns_completed: 0,
                turns_failed: 0,
                speech_failures: 0,
            }),
            config,
            advisor,
            speech,
            scheduler,
            started_at: Utc::now(),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Send a question to the advisor.
    ///
    /// Blank input is ignored. While another turn is awaiting a reply this
    /// fails with [`Error::SessionBusy`]. A text-generation failure appends
    /// no reply and is returned; a speech failure only marks the speech as
    /// skipped. The session is back in `IDLE` on every return path.
    pub async fn submit_user_text(&self, text: &str) -> Result<TurnOutcome> {
        let prompt = text.trim();
        if prompt.is_empty() {
            debug!("Ignoring blank input");
            return Ok(TurnOutcome::Ignored);
        }
        self.ensure_open()?;

        let language = {
            let mut inner = self.lock();
            if inner.phase != TurnPhase::Idle {
                warn!("Rejecting question while {} is pending", inner.phase);
                return Err(Error::SessionBusy);
            }
            inner.phase = TurnPhase::AwaitingTextResponse;
            inner.history.push(Message::user(prompt));
            inner.language
        };
        let _turn = TurnGuard { session: self };
        info!("State: IDLE → AWAITING_TEXT_RESPONSE");

        if self.config.interrupt_on_submit {
            self.scheduler.cancel_all();
        }

        let reply = self
            .with_timeout("text generation", self.advisor.generate_reply(prompt, language))
            .await;

        if self.is_closed() {
            info!("Session closed during text generation, discarding reply");
            return Ok(TurnOutcome::Discarded);
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Advisor request failed: {}", e);
                self.lock().turns_failed += 1;
                return Err(e);
            }
        };

        let reply_index = {
            let mut inner = self.lock();
            inner.history.push(Message::model(reply.clone()));
            inner.phase = TurnPhase::AwaitingSpeech;
            inner.history.len() - 1
        };
        info!("State: AWAITING_TEXT_RESPONSE → AWAITING_SPEECH");

        let speech = match self.speak(reply_index, &reply, language).await {
            Ok(playback_id) => SpeechOutcome::Playing { playback_id },
            Err(Error::SessionClosed) => {
                info!("Session closed during speech synthesis, discarding audio");
                return Ok(TurnOutcome::Discarded);
            }
            Err(e) => {
                warn!("Reply will not be spoken: {}", e);
                self.lock().speech_failures += 1;
                SpeechOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        self.lock().turns_completed += 1;
        Ok(TurnOutcome::Completed { reply, speech })
    }

    /// Speak an earlier advisor reply again.
    ///
    /// Independent of the turn state, so it may run while a turn is pending.
    /// Never changes the history.
    pub async fn replay(&self, index: usize) -> Result<PlaybackId> {
        self.ensure_open()?;

        let (text, language, cached) = {
            let inner = self.lock();
            let message = inner
                .history
                .get(index)
                .ok_or_else(|| Error::InvalidMessage(format!("no message at index {index}")))?;
            if message.role != Role::Model {
                return Err(Error::InvalidMessage(format!(
                    "message {index} is not an advisor reply"
                )));
            }
            (
                message.text.clone(),
                inner.language,
                inner.audio_cache.get(&index).map(|c| Arc::clone(&c.buffer)),
            )
        };

        if self.config.replay_from_cache {
            if let Some(buffer) = cached {
                info!("Replaying message {} from cache", index);
                return self.scheduler.submit(buffer);
            }
        }

        info!("Replaying message {} ({})", index, language);
        self.speak(index, &text, language).await
    }

    /// Change the language for later requests
    pub fn set_language(&self, language: Language) {
        let mut inner = self.lock();
        if inner.language != language {
            info!("Language: {} → {}", inner.language, language);
            inner.language = language;
        }
    }

    /// Mark speech capture as running until the returned flag is dropped.
    ///
    /// Fails with [`Error::CaptureBusy`] if a capture is already running.
    pub fn begin_capture(&self) -> Result<CaptureFlag<'_>> {
        self.ensure_open()?;

        let mut inner = self.lock();
        if inner.capturing {
            return Err(Error::CaptureBusy);
        }
        inner.capturing = true;
        debug!("Capture started");

        Ok(CaptureFlag { session: self })
    }

    /// Tear the session down: stop all playback and drop late results.
    ///
    /// Returns how many playbacks were stopped. Calling it again is a no-op.
    pub fn close(&self) -> usize {
        if self.closed.swap(true, Ordering::SeqCst) {
            return 0;
        }

        self.shutdown.notify_waiters();
        let stopped = self.scheduler.cancel_all();
        info!(
            "Closed conversation session: {} ({} playback(s) stopped)",
            self.config.session_id, stopped
        );
        stopped
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    pub fn language(&self) -> Language {
        self.lock().language
    }

    pub fn phase(&self) -> TurnPhase {
        self.lock().phase
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.lock().phase != TurnPhase::Idle
    }

    pub fn is_capturing(&self) -> bool {
        self.lock().capturing
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the session has been closed
    pub async fn closed(&self) {
        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_closed() {
            return;
        }
        notified.await;
    }

    /// Copy of the message history in append order
    pub fn history(&self) -> Vec<Message> {
        self.lock().history.clone()
    }

    pub fn message_count(&self) -> usize {
        self.lock().history.len()
    }

    /// Audio last synthesized for the advisor reply at `index`
    pub fn cached_audio(&self, index: usize) -> Option<CachedAudio> {
        self.lock().audio_cache.get(&index).cloned()
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    /// Current session statistics
    pub fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        let inner = self.lock();

        SessionStats {
            session_id: self.config.session_id.clone(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            language: inner.language,
            phase: inner.phase,
            is_awaiting_response: inner.phase != TurnPhase::Idle,
            is_capturing: inner.capturing,
            message_count: inner.history.len(),
            turns_completed: inner.turns_completed,
            turns_failed: inner.turns_failed,
            speech_failures: inner.speech_failures,
            active_playbacks: self.scheduler.active_count(),
            closed: self.is_closed(),
        }
    }

    /// Synthesize, decode, cache and play one reply
    async fn speak(&self, index: usize, text: &str, language: Language) -> Result<PlaybackId> {
        let payload = self
            .with_timeout("speech synthesis", self.speech.synthesize(text, language))
            .await?;
        self.ensure_open()?;

        let buffer = Arc::new(payload.decode()?);
        debug!(
            "Decoded reply {}: {} frames at {}Hz",
            index,
            buffer.frame_count(),
            buffer.sample_rate()
        );

        let wav_path = self.export_audio(index, &buffer);
        self.lock().audio_cache.insert(
            index,
            CachedAudio {
                buffer: Arc::clone(&buffer),
                wav_path,
            },
        );

        self.scheduler.submit(buffer)
    }

    /// Write the reply to the audio cache directory, if one is configured
    fn export_audio(&self, index: usize, buffer: &DecodedAudioBuffer) -> Option<PathBuf> {
        let dir = self.config.audio_cache_dir.as_ref()?;
        let path = dir.join(format!("{}-{:03}.wav", self.config.session_id, index));

        match write_wav(&path, buffer) {
            Ok(export) => Some(export.path),
            Err(e) => {
                warn!("Failed to export reply audio to {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn with_timeout<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let after = self.config.request_timeout;
        tokio::time::timeout(after, call)
            .await
            .map_err(|_| Error::Timeout { operation, after })?
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Returns the session to `IDLE` when a turn ends, however it ends
struct TurnGuard<'a> {
    session: &'a ConversationSession,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.session.lock();
        if inner.phase != TurnPhase::Idle {
            info!("State: {} → IDLE", inner.phase);
            inner.phase = TurnPhase::Idle;
        }
    }
}

/// Keeps `is_capturing` set while speech capture runs
pub struct CaptureFlag<'a> {
    session: &'a ConversationSession,
}

impl Drop for CaptureFlag<'_> {
    fn drop(&mut self) {
        self.session.lock().capturing = false;
        debug!("Capture finished");
    }
}
