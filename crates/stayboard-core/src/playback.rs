// ── Media playback scheduling ──
//
// Decides which media item a display surface shows. Images rotate on a
// timer; videos advance when the player reports the current one has
// finished. One scheduler exists per physical surface and every consumer
// rendering that surface shares it through `SurfaceRegistry`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::model::{MediaItem, MediaKind, RotationInterval, UnifiedMediaState};

/// What a surface should render right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackView {
    pub active_type: MediaKind,
    /// `None` when the active playlist is empty; render a placeholder.
    pub current_item: Option<MediaItem>,
    pub current_index: usize,
}

// ── PlaybackState ────────────────────────────────────────────────────

/// Pure playlist position. All timing lives in [`PlaybackScheduler`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    media: UnifiedMediaState,
    index: usize,
}

/// The inputs whose change tears down the rotation timer.
type RotationKey = (MediaKind, usize, RotationInterval);

impl PlaybackState {
    pub fn new(media: UnifiedMediaState) -> Self {
        Self { media, index: 0 }
    }

    /// Replace the media set. The position resets when the active type
    /// changes or the current index falls off the end of the playlist.
    pub fn apply(&mut self, media: UnifiedMediaState) {
        if media.active_type != self.media.active_type || self.index >= media.items().len() {
            self.index = 0;
        }
        self.media = media;
    }

    /// Step to the next item, wrapping. Returns whether the index moved.
    pub fn advance(&mut self) -> bool {
        let len = self.media.items().len();
        if len <= 1 {
            return false;
        }
        self.index = (self.index + 1) % len;
        true
    }

    /// The player finished the current item. Only meaningful for videos;
    /// a lone video loops in place.
    pub fn on_item_finished(&mut self) -> bool {
        self.media.active_type == MediaKind::Video && self.advance()
    }

    pub fn view(&self) -> PlaybackView {
        PlaybackView {
            active_type: self.media.active_type,
            current_item: self.media.items().get(self.index).cloned(),
            current_index: self.index,
        }
    }

    pub fn media(&self) -> &UnifiedMediaState {
        &self.media
    }

    /// Rotation period, if this state rotates on a timer at all.
    fn rotation_period(&self) -> Option<Duration> {
        (self.media.active_type == MediaKind::Image && self.media.items().len() > 1)
            .then(|| self.media.rotation_interval.as_duration())
    }

    fn rotation_key(&self) -> RotationKey {
        (
            self.media.active_type,
            self.media.items().len(),
            self.media.rotation_interval,
        )
    }
}

// ── PlaybackScheduler ────────────────────────────────────────────────

struct Shared {
    state: Mutex<PlaybackState>,
    view: watch::Sender<PlaybackView>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PlaybackState) {
        self.view.send_if_modified(|view| {
            let next = state.view();
            if *view == next {
                return false;
            }
            *view = next;
            true
        });
    }
}

struct Rotation {
    key: RotationKey,
    cancel: CancellationToken,
    _task: Option<JoinHandle<()>>,
}

/// Drives a [`PlaybackState`] for one display surface.
///
/// Must be used inside a Tokio runtime; image rotation runs as a
/// background task.
pub struct PlaybackScheduler {
    shared: Arc<Shared>,
    rotation: Mutex<Option<Rotation>>,
    cancel: CancellationToken,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        let state = PlaybackState::default();
        let (view, _) = watch::channel(state.view());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                view,
            }),
            rotation: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// Load a new media set, restarting the rotation timer only if the
    /// active type, playlist length or interval changed.
    pub fn set_media(&self, media: UnifiedMediaState) {
        let (key, period) = {
            let mut state = self.shared.lock();
            state.apply(media);
            self.shared.publish(&state);
            (state.rotation_key(), state.rotation_period())
        };
        self.reconcile_rotation(key, period);
    }

    /// Report that the current video finished playing.
    pub fn on_item_finished(&self) {
        let mut state = self.shared.lock();
        if state.on_item_finished() {
            self.shared.publish(&state);
        }
    }

    pub fn view(&self) -> PlaybackView {
        self.shared.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackView> {
        self.shared.view.subscribe()
    }

    /// Stop the rotation timer. Later `set_media` calls update the view
    /// but never start a new timer.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(rotation) = self.lock_rotation().take() {
            rotation.cancel.cancel();
        }
    }

    fn reconcile_rotation(&self, key: RotationKey, period: Option<Duration>) {
        let mut rotation = self.lock_rotation();
        if rotation.as_ref().is_some_and(|r| r.key == key) || self.cancel.is_cancelled() {
            return;
        }
        if let Some(old) = rotation.take() {
            old.cancel.cancel();
        }

        let cancel = self.cancel.child_token();
        let task = period.map(|period| {
            debug!(?period, items = key.1, "starting image rotation");
            tokio::spawn(rotate(Arc::clone(&self.shared), period, cancel.clone()))
        });
        *rotation = Some(Rotation {
            key,
            cancel,
            _task: task,
        });
    }

    fn lock_rotation(&self) -> MutexGuard<'_, Option<Rotation>> {
        self.rotation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn rotate(shared: Arc<Shared>, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let mut state = shared.lock();
                if state.advance() {
                    shared.publish(&state);
                }
            }
        }
    }
}

// ── SurfaceRegistry ──────────────────────────────────────────────────

/// One scheduler per display surface, shared by all its consumers.
#[derive(Default)]
pub struct SurfaceRegistry {
    schedulers: DashMap<String, Arc<PlaybackScheduler>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The scheduler for `surface`, created on first use.
    pub fn scheduler_for(&self, surface: &str) -> Arc<PlaybackScheduler> {
        Arc::clone(
            self.schedulers
                .entry(surface.to_owned())
                .or_insert_with(|| Arc::new(PlaybackScheduler::new()))
                .value(),
        )
    }

    /// Stop and forget the scheduler for `surface`.
    pub fn release(&self, surface: &str) {
        if let Some((_, scheduler)) = self.schedulers.remove(surface) {
            scheduler.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.schedulers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedulers.is_empty()
    }
}
