// Playback scheduler for synthesized replies
//
// Accepts decoded buffers and plays them without blocking the caller.
// A single output device is opened lazily on first use and reused for the
// lifetime of the scheduler. Each request is tracked in a registry from
// submission until it completes or is cancelled; a small watcher task per
// playing request removes it once the device reports it finished.
//
// Policies:
// - Mix: every submission starts at once and the device mixes them
// - Queue: one buffer at a time, in submission order

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::output::{AudioOutput, OutputFactory, PlaybackHandle};
use super::pcm::DecodedAudioBuffer;
use crate::{Error, Result};

/// Identifier returned by [`PlaybackScheduler::submit`]
pub type PlaybackId = Uuid;

/// How concurrent submissions share the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPolicy {
    /// Start immediately, overlapping playbacks are mixed
    #[default]
    Mix,
    /// Play one buffer at a time in submission order
    Queue,
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub policy: PlaybackPolicy,
    /// How often watchers check the device for completion
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: PlaybackPolicy::Mix,
            poll_interval: Duration::from_millis(20),
        }
    }
}

/// One submitted buffer
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub id: PlaybackId,
    pub buffer: Arc<DecodedAudioBuffer>,
    pub submitted_at: DateTime<Utc>,
}

/// Lifecycle of a registered request. Completed and cancelled requests are
/// removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Queued,
    Playing,
}

struct Entry {
    state: PlaybackState,
    submitted_at: DateTime<Utc>,
    handle: Option<Box<dyn PlaybackHandle>>,
}

struct Shared {
    config: SchedulerConfig,
    factory: OutputFactory,
    output: Mutex<Option<Arc<dyn AudioOutput>>>,
    registry: Mutex<HashMap<PlaybackId, Entry>>,
    queue: Mutex<Option<mpsc::UnboundedSender<PlaybackRequest>>>,
    idle: Notify,
}

/// Plays decoded audio buffers on a shared output device
#[derive(Clone)]
pub struct PlaybackScheduler {
    shared: Arc<Shared>,
}

impl PlaybackScheduler {
    /// Create a scheduler. The device is not opened until the first submit.
    pub fn new(config: SchedulerConfig, factory: OutputFactory) -> Self {
        info!(
            "Playback scheduler created: policy={:?}, poll={}ms",
            config.policy,
            config.poll_interval.as_millis()
        );

        Self {
            shared: Arc::new(Shared {
                config,
                factory,
                output: Mutex::new(None),
                registry: Mutex::new(HashMap::new()),
                queue: Mutex::new(None),
                idle: Notify::new(),
            }),
        }
    }

    pub fn policy(&self) -> PlaybackPolicy {
        self.shared.config.policy
    }

    /// Submit a buffer for playback and return at once.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`Error::PlaybackDevice`] if the device cannot be opened or, under the
    /// mix policy, if the buffer fails to start.
    pub fn submit(&self, buffer: impl Into<Arc<DecodedAudioBuffer>>) -> Result<PlaybackId> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::PlaybackDevice("no async runtime for playback".to_string()))?;

        let output = self.output()?;
        let request = PlaybackRequest {
            id: Uuid::new_v4(),
            buffer: buffer.into(),
            submitted_at: Utc::now(),
        };
        let id = request.id;

        debug!(
            "Submitting playback {}: {} frames, {} ch, {}Hz ({:.2}s)",
            id,
            request.buffer.frame_count(),
            request.buffer.channel_count(),
            request.buffer.sample_rate(),
            request.buffer.duration().as_secs_f64()
        );

        match self.shared.config.policy {
            PlaybackPolicy::Mix => {
                let handle = output.start(&request.buffer)?;
                lock(&self.shared.registry).insert(
                    id,
                    Entry {
                        state: PlaybackState::Playing,
                        submitted_at: request.submitted_at,
                        handle: Some(handle),
                    },
                );
                runtime.spawn(watch(Arc::clone(&self.shared), id));
            }
            PlaybackPolicy::Queue => {
                lock(&self.shared.registry).insert(
                    id,
                    Entry {
                        state: PlaybackState::Queued,
                        submitted_at: request.submitted_at,
                        handle: None,
                    },
                );
                self.enqueue(&runtime, output, request)?;
            }
        }

        Ok(id)
    }

    /// Stop one request. Returns false if it had already finished.
    pub fn cancel(&self, id: PlaybackId) -> bool {
        let entry = lock(&self.shared.registry).remove(&id);

        match entry {
            Some(entry) => {
                if let Some(handle) = entry.handle {
                    handle.stop();
                }
                info!("Playback {} cancelled", id);
                self.shared.notify_if_idle();
                true
            }
            None => {
                debug!("Cancel ignored, playback {} not active", id);
                false
            }
        }
    }

    /// Stop every queued and playing request. Returns how many were stopped.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<(PlaybackId, Entry)> = lock(&self.shared.registry).drain().collect();

        for (_, entry) in &drained {
            if let Some(handle) = &entry.handle {
                handle.stop();
            }
        }

        if !drained.is_empty() {
            info!("Cancelled {} playback(s)", drained.len());
        }
        self.shared.notify_if_idle();

        drained.len()
    }

    pub fn is_active(&self, id: PlaybackId) -> bool {
        lock(&self.shared.registry).contains_key(&id)
    }

    pub fn state(&self, id: PlaybackId) -> Option<PlaybackState> {
        lock(&self.shared.registry).get(&id).map(|e| e.state)
    }

    pub fn active_count(&self) -> usize {
        lock(&self.shared.registry).len()
    }

    /// Active request ids, oldest submission first
    pub fn active_ids(&self) -> Vec<PlaybackId> {
        let registry = lock(&self.shared.registry);
        let mut ids: Vec<(DateTime<Utc>, PlaybackId)> =
            registry.iter().map(|(id, e)| (e.submitted_at, *id)).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Whether the output device has been opened
    pub fn is_device_open(&self) -> bool {
        lock(&self.shared.output).is_some()
    }

    /// Resolve once nothing is queued or playing
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Open the device on first use; later calls reuse it.
    ///
    /// The slot lock is held while opening, so concurrent first submits
    /// open the device only once. A failed open leaves the slot empty.
    fn output(&self) -> Result<Arc<dyn AudioOutput>> {
        let mut slot = lock(&self.shared.output);
        if let Some(output) = slot.as_ref() {
            return Ok(Arc::clone(output));
        }

        let output: Arc<dyn AudioOutput> = Arc::from((self.shared.factory)().map_err(|e| {
            warn!("Failed to open audio output: {}", e);
            match e {
                Error::PlaybackDevice(_) => e,
                other => Error::PlaybackDevice(other.to_string()),
            }
        })?);
        info!("Audio output ready: {}", output.name());

        *slot = Some(Arc::clone(&output));
        Ok(output)
    }

    fn enqueue(
        &self,
        runtime: &tokio::runtime::Handle,
        output: Arc<dyn AudioOutput>,
        request: PlaybackRequest,
    ) -> Result<()> {
        let mut queue = lock(&self.shared.queue);
        let sender = queue.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            runtime.spawn(drive_queue(Arc::clone(&self.shared), output, rx));
            tx
        });

        let id = request.id;
        if sender.send(request).is_err() {
            *queue = None;
            lock(&self.shared.registry).remove(&id);
            return Err(Error::PlaybackDevice("playback queue stopped".to_string()));
        }

        Ok(())
    }
}

impl Shared {
    fn finish(&self, id: PlaybackId) {
        if lock(&self.registry).remove(&id).is_some() {
            info!("Playback {} completed", id);
        }
        self.notify_if_idle();
    }

    fn notify_if_idle(&self) {
        if lock(&self.registry).is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// Poll one playing request until the device drains it or it is cancelled
async fn watch(shared: Arc<Shared>, id: PlaybackId) {
    let mut ticker = tokio::time::interval(shared.config.poll_interval);

    loop {
        ticker.tick().await;

        let finished = {
            let registry = lock(&shared.registry);
            match registry.get(&id) {
                // Cancelled, handle already stopped
                None => return,
                Some(entry) => entry.handle.as_ref().map_or(true, |h| h.is_finished()),
            }
        };

        if finished {
            shared.finish(id);
            return;
        }
    }
}

/// Play queued requests one after another
async fn drive_queue(
    shared: Arc<Shared>,
    output: Arc<dyn AudioOutput>,
    mut requests: mpsc::UnboundedReceiver<PlaybackRequest>,
) {
    debug!("Playback queue started");

    while let Some(request) = requests.recv().await {
        let id = request.id;

        if !lock(&shared.registry).contains_key(&id) {
            debug!("Skipping cancelled playback {}", id);
            continue;
        }

        let started = match output.start(&request.buffer) {
            Ok(handle) => {
                let mut registry = lock(&shared.registry);
                match registry.get_mut(&id) {
                    Some(entry) => {
                        entry.handle = Some(handle);
                        entry.state = PlaybackState::Playing;
                        true
                    }
                    None => {
                        // Cancelled while starting
                        handle.stop();
                        false
                    }
                }
            }
            Err(e) => {
                warn!("Queued playback {} failed to start: {}", id, e);
                shared.finish(id);
                false
            }
        };

        if started {
            watch(Arc::clone(&shared), id).await;
        }
    }

    debug!("Playback queue stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
