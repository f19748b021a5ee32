//! Background rotation controller.
//!
//! One instance per process, shared as `Arc<BackgroundController>`. All
//! mutable state sits in a single [`RotationState`] behind a mutex that is
//! never held across an `.await`. Timers only hold a `Weak` back-reference,
//! so dropping the last `Arc` stops them.

pub mod rotation;
pub mod schedule;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::Notifier;
use crate::models::config::BackgroundConfig;
use crate::models::media::{MediaItem, MediaMetadata};
use crate::models::status::ControllerStatus;
use crate::pipeline::metadata::MetadataEnricher;
use crate::pipeline::scan;
use crate::store::{ConfigError, ConfigStore};

use rotation::{build_rotation, MediaChange, RotationState};
use schedule::{Debouncer, RepeatingTimer};

pub const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Quiet period before a burst of refresh requests turns into one scan.
    pub refresh_debounce: Duration,
    /// Fixed rng seed for random playback; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self { refresh_debounce: DEFAULT_REFRESH_DEBOUNCE, seed: None }
    }
}

/// Lets exactly one `advance` run at a time; losers back off immediately.
struct AdvanceGuard<'a>(&'a AtomicBool);

impl<'a> AdvanceGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AdvanceGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BackgroundController {
    me: Weak<BackgroundController>,
    store: Arc<ConfigStore>,
    media_root: PathBuf,
    enricher: Arc<MetadataEnricher>,
    notifier: Notifier,
    settings: RwLock<BackgroundConfig>,
    state: Mutex<RotationState>,
    advancing: AtomicBool,
    stopped: AtomicBool,
    scan_lock: tokio::sync::Mutex<()>,
    advance_timer: Mutex<Option<RepeatingTimer>>,
    poll_timer: Mutex<Option<RepeatingTimer>>,
    refresh_debounce: Debouncer,
}

impl BackgroundController {
    pub fn new(
        store: Arc<ConfigStore>,
        media_root: PathBuf,
        enricher: Arc<MetadataEnricher>,
        notifier: Notifier,
        options: ControllerOptions,
    ) -> Arc<Self> {
        let settings = store.get().background;
        let state = match options.seed {
            Some(seed) => RotationState::with_seed(seed),
            None => RotationState::default(),
        };
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            store,
            media_root,
            enricher,
            notifier,
            settings: RwLock::new(settings),
            state: Mutex::new(state),
            advancing: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            scan_lock: tokio::sync::Mutex::new(()),
            advance_timer: Mutex::new(None),
            poll_timer: Mutex::new(None),
            refresh_debounce: Debouncer::new(options.refresh_debounce),
        })
    }

    /// Initial load: build the rotation, start the timers and pick the first
    /// item. An unreadable config falls back to what the store already holds.
    pub async fn start(&self) {
        self.stopped.store(false, Ordering::Release);
        let bg = match self.store.reload() {
            Ok(cfg) => cfg.background,
            Err(e) => {
                warn!("starting with cached configuration: {}", e);
                self.store.get().background
            }
        };
        self.apply(bg).await;
        let idle = self.state.lock().current.is_none();
        if idle {
            self.advance().await;
        }
        info!(items = self.state.lock().media.len(), "background controller started");
    }

    /// Reload the config store and rebuild everything derived from it.
    /// On failure nothing changes.
    pub async fn reconfigure(&self) -> Result<(), ConfigError> {
        let cfg = match self.store.reload() {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("reconfigure aborted: {}", e);
                return Err(e);
            }
        };
        self.apply(cfg.background).await;
        Ok(())
    }

    async fn apply(&self, bg: BackgroundConfig) {
        let use_local = bg.use_local_backgrounds;
        let polling = Duration::from_millis(bg.polling_interval_ms());
        *self.settings.write() = bg;

        self.refresh_media().await;

        let paused = {
            let mut st = self.state.lock();
            if !st.paused {
                st.restart_clock();
            }
            self.arm_advance_timer(&st);
            st.paused
        };
        self.restart_poll_timer(use_local.then_some(polling));
        debug!(use_local, paused, "controller reconfigured");
    }

    /// Rebuild the rotation set. When the current item disappeared, moves on
    /// to the next one. Returns whether the set changed.
    pub async fn refresh_media(&self) -> bool {
        let change = self.rescan().await;
        if change.current_lost {
            info!("current background vanished, advancing");
            self.advance().await;
        }
        change.changed
    }

    /// Schedule a refresh after the debounce window. Bursts collapse.
    pub fn request_refresh(&self) {
        let me = self.me.clone();
        self.refresh_debounce.trigger(async move {
            if let Some(controller) = me.upgrade() {
                controller.refresh_media().await;
            }
        });
    }

    async fn rescan(&self) -> MediaChange {
        let _scan = self.scan_lock.lock().await;
        let bg = self.settings.read().clone();

        let local = if bg.use_local_backgrounds {
            let root = self.media_root.clone();
            match tokio::task::spawn_blocking(move || scan::scan(&root)).await {
                Ok(items) => Some(items),
                Err(e) => {
                    warn!("media scan task failed: {}", e);
                    return MediaChange { changed: false, current_lost: false };
                }
            }
        } else {
            None
        };

        if let Some(items) = &local {
            let on_disk: HashSet<&str> = items.iter().map(|m| m.url.as_str()).collect();
            self.enricher.retain(&on_disk);
        }
        let fresh = build_rotation(&bg, local.unwrap_or_default());

        let change = self.state.lock().replace_media(fresh);
        if change.changed {
            info!(items = self.state.lock().media.len(), "rotation set changed");
        }
        change
    }

    /// Show the next background. Waiting list first, then the rotation set.
    ///
    /// Returns `false` when nothing was selected: another advance was
    /// already running, or there is no media at all.
    pub async fn advance(&self) -> bool {
        let Some(_guard) = AdvanceGuard::try_acquire(&self.advancing) else {
            debug!("advance already in progress");
            return false;
        };
        let order = self.settings.read().playback_order;

        let nothing_to_pick = {
            let st = self.state.lock();
            st.waiting.is_empty() && st.media.is_empty()
        };
        if nothing_to_pick {
            self.rescan().await;
        }

        let (status, item) = {
            let mut st = self.state.lock();
            let (item, index) = match st.waiting.pop_front() {
                Some(queued) => (queued, None),
                None => match st.pick_index(order) {
                    Some(i) => (st.media[i].clone(), Some(i)),
                    None => {
                        debug!("no media to advance to");
                        return false;
                    }
                },
            };
            st.commit(item.clone(), index);
            self.arm_advance_timer(&st);
            (self.snapshot(&st), item)
        };

        info!(url = %item.url, state_id = status.state_id, "advanced background");
        self.notifier.publish_status(status);
        self.enrich_in_background(item);
        true
    }

    /// Go back to the previously shown item. No-op with empty history.
    pub async fn previous(&self) -> bool {
        let (status, item) = {
            let mut st = self.state.lock();
            if !st.step_back() {
                debug!("history empty, nothing to go back to");
                return false;
            }
            self.arm_advance_timer(&st);
            (self.snapshot(&st), st.current.clone())
        };
        self.notifier.publish_status(status);
        if let Some(item) = item {
            self.enrich_in_background(item);
        }
        true
    }

    /// Flip pause. Returns the new pause flag.
    pub fn toggle_pause(&self) -> bool {
        let (status, paused) = {
            let mut st = self.state.lock();
            let paused = st.toggle_pause();
            self.arm_advance_timer(&st);
            (self.snapshot(&st), paused)
        };
        info!(paused, "background rotation pause toggled");
        self.notifier.publish_status(status);
        paused
    }

    pub fn add_to_waiting_list(&self, item: MediaItem) {
        let status = {
            let mut st = self.state.lock();
            st.enqueue(item);
            self.snapshot(&st)
        };
        self.notifier.publish_status(status);
    }

    /// Remove an entry from the waiting list. Out of range is a silent no-op.
    pub fn remove_from_waiting_list(&self, index: usize) -> bool {
        let status = {
            let mut st = self.state.lock();
            if st.dequeue_at(index).is_none() {
                return false;
            }
            self.snapshot(&st)
        };
        self.notifier.publish_status(status);
        true
    }

    /// Current status. Picks a first item when media exists but nothing is
    /// showing yet, so a client never sees an empty screen it does not need.
    pub async fn status(&self) -> ControllerStatus {
        let needs_pick = {
            let st = self.state.lock();
            st.current.is_none() && !st.media.is_empty()
        };
        if needs_pick {
            self.advance().await;
        }
        self.snapshot_now()
    }

    /// Status without any side effects.
    pub fn snapshot_now(&self) -> ControllerStatus {
        let st = self.state.lock();
        self.snapshot(&st)
    }

    fn snapshot(&self, st: &RotationState) -> ControllerStatus {
        let bg = self.settings.read();
        let interval = Duration::from_millis(bg.interval_ms());
        ControllerStatus {
            current_media: st.current.clone(),
            next_media: st.preview(bg.playback_order),
            remaining_time: st.remaining(interval).as_millis() as u64,
            transition_mode: bg.transition_mode,
            total_interval: bg.interval_ms(),
            waiting_list: st.waiting.iter().cloned().collect(),
            state_id: st.state_id,
            is_paused: st.paused,
        }
    }

    /// Store enrichment results; republishes when the current item changed.
    pub fn attach_metadata(&self, url: &str, meta: MediaMetadata) {
        let status = {
            let mut st = self.state.lock();
            if !st.attach_metadata(url, &meta) {
                return;
            }
            self.snapshot(&st)
        };
        debug!(url, "metadata attached to current background");
        self.notifier.publish_status(status);
    }

    fn enrich_in_background(&self, item: MediaItem) {
        if item.metadata.is_some() || !item.is_local() {
            return;
        }
        let enricher = self.enricher.clone();
        let me = self.me.clone();
        tokio::spawn(async move {
            if let Some(meta) = enricher.enrich(&item).await {
                if let Some(controller) = me.upgrade() {
                    controller.attach_metadata(&item.url, meta);
                }
            }
        });
    }

    /// Make the rotation timer match `st.paused`: a fresh full period when
    /// running, nothing when paused. Callers hold the state lock, so the
    /// pause flag cannot change between the decision and the swap.
    fn arm_advance_timer(&self, st: &RotationState) {
        let running = !st.paused && !self.stopped.load(Ordering::Acquire);
        let timer = running.then(|| {
            let period = Duration::from_millis(self.settings.read().interval_ms());
            let me = self.me.clone();
            RepeatingTimer::start(period, move || {
                let me = me.clone();
                async move {
                    if let Some(controller) = me.upgrade() {
                        controller.advance().await;
                    }
                }
            })
        });
        *self.advance_timer.lock() = timer;
    }


    fn restart_poll_timer(&self, period: Option<Duration>) {
        let timer = period.map(|period| {
            let me = self.me.clone();
            RepeatingTimer::start(period, move || {
                let me = me.clone();
                async move {
                    if let Some(controller) = me.upgrade() {
                        controller.request_refresh();
                    }
                }
            })
        });
        *self.poll_timer.lock() = timer;
    }

    /// Stop every timer and any pending debounced refresh.
    pub fn shutdown(&self) {
        {
            let _st = self.state.lock();
            self.stopped.store(true, Ordering::Release);
            self.advance_timer.lock().take();
        }
        self.poll_timer.lock().take();
        self.refresh_debounce.cancel();
        info!("background controller stopped");
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn settings(&self) -> BackgroundConfig {
        self.settings.read().clone()
    }

    pub fn media(&self) -> Vec<MediaItem> {
        self.state.lock().media.clone()
    }

    pub fn current(&self) -> Option<MediaItem> {
        self.state.lock().current.clone()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.state.lock().current_index
    }

    pub fn state_id(&self) -> u64 {
        self.state.lock().state_id
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Whether the advance and polling timers are currently armed.
    pub fn timers_armed(&self) -> (bool, bool) {
        let advance = self.advance_timer.lock().as_ref().is_some_and(RepeatingTimer::is_running);
        let poll = self.poll_timer.lock().as_ref().is_some_and(RepeatingTimer::is_running);
        (advance, poll)
    }
}
