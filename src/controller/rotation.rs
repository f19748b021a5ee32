use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::Instant;

use crate::models::config::{BackgroundConfig, PlaybackOrder};
use crate::models::media::MediaItem;

pub const HISTORY_CAPACITY: usize = 50;

/// Build the rotation set: external urls first, then local media.
///
/// With folder scoping active (`useAllFolders: false`) an item is only
/// eligible when its folder or url is listed explicitly; a missing list
/// enables nothing. Duplicate urls keep their first occurrence.
pub fn build_rotation(bg: &BackgroundConfig, local: Vec<MediaItem>) -> Vec<MediaItem> {
    let scoped = bg.folder_scoping();
    let url_enabled = |url: &str| {
        bg.enabled_external_urls
            .as_ref()
            .is_some_and(|urls| urls.iter().any(|u| u == url))
    };
    let folder_enabled = |folder: Option<&str>| {
        bg.enabled_folders
            .as_ref()
            .zip(folder)
            .is_some_and(|(folders, f)| folders.iter().any(|x| x == f))
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in &bg.external_media_url_list {
        if (!scoped || url_enabled(&item.url)) && seen.insert(item.url.clone()) {
            out.push(item.clone());
        }
    }
    if bg.use_local_backgrounds {
        for item in local {
            if (!scoped || folder_enabled(item.folder.as_deref())) && seen.insert(item.url.clone()) {
                out.push(item);
            }
        }
    }
    out
}

/// Two sets are the same when lengths and per-index urls match.
pub fn same_urls(a: &[MediaItem], b: &[MediaItem]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.url == y.url)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaChange {
    pub changed: bool,
    pub current_lost: bool,
}

/// Everything the controller mutates, kept behind one lock.
pub struct RotationState {
    pub media: Vec<MediaItem>,
    pub current: Option<MediaItem>,
    /// Index of the last item picked from `media`; `None` until the first pick.
    pub current_index: Option<usize>,
    pub history: VecDeque<MediaItem>,
    pub waiting: VecDeque<MediaItem>,
    pub paused: bool,
    pub state_id: u64,
    pub started_at: Instant,
    pub paused_at: Option<Instant>,
    rng: StdRng,
}

impl Default for RotationState {
    fn default() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl RotationState {
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            media: Vec::new(),
            current: None,
            current_index: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            waiting: VecDeque::new(),
            paused: false,
            state_id: 0,
            started_at: Instant::now(),
            paused_at: None,
            rng,
        }
    }

    /// Pick the next rotation index without committing to it.
    pub fn pick_index(&mut self, order: PlaybackOrder) -> Option<usize> {
        let n = self.media.len();
        if n == 0 {
            return None;
        }
        Some(match order {
            PlaybackOrder::Sequential => self.current_index.map(|i| (i + 1) % n).unwrap_or(0),
            PlaybackOrder::Random => self.rng.random_range(0..n),
        })
    }

    /// Make `item` current. Pushes the outgoing item on the history stack,
    /// bumps the state id and restarts the elapsed clock.
    pub fn commit(&mut self, item: MediaItem, index: Option<usize>) {
        if let Some(prev) = self.current.take() {
            if self.history.len() == HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.history.push_back(prev);
        }
        self.current = Some(item);
        if index.is_some() {
            self.current_index = index;
        }
        self.touch();
        self.restart_clock();
    }

    /// Return to the most recently replaced item, if any.
    pub fn step_back(&mut self) -> bool {
        let Some(item) = self.history.pop_back() else { return false };
        self.current = Some(item);
        self.touch();
        self.restart_clock();
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        if self.paused {
            self.paused_at = Some(Instant::now());
        } else {
            self.restart_clock();
        }
        self.touch();
        self.paused
    }

    pub fn enqueue(&mut self, item: MediaItem) {
        self.waiting.push_back(item);
        self.touch();
    }

    pub fn dequeue_at(&mut self, index: usize) -> Option<MediaItem> {
        let removed = self.waiting.remove(index)?;
        self.touch();
        Some(removed)
    }

    /// What the next advance would show, without drawing from the rng.
    /// Random order has no stable preview.
    pub fn preview(&self, order: PlaybackOrder) -> Option<MediaItem> {
        if let Some(head) = self.waiting.front() {
            return Some(head.clone());
        }
        let n = self.media.len();
        if n == 0 {
            return None;
        }
        match order {
            PlaybackOrder::Sequential => {
                let idx = self.current_index.map(|i| (i + 1) % n).unwrap_or(0);
                self.media.get(idx).cloned()
            }
            PlaybackOrder::Random => None,
        }
    }

    pub fn remaining(&self, interval: Duration) -> Duration {
        let until = self.paused_at.unwrap_or_else(Instant::now);
        interval.saturating_sub(until.saturating_duration_since(self.started_at))
    }

    pub fn restart_clock(&mut self) {
        self.started_at = Instant::now();
        self.paused_at = None;
    }

    /// Swap in a freshly computed set when its urls differ from the live one.
    ///
    /// Metadata already attached to surviving urls is carried over. When the
    /// current item is no longer a member it is cleared and reported lost.
    pub fn replace_media(&mut self, mut fresh: Vec<MediaItem>) -> MediaChange {
        if same_urls(&self.media, &fresh) {
            return MediaChange { changed: false, current_lost: false };
        }
        let known: HashMap<&str, &MediaItem> = self.media.iter().map(|m| (m.url.as_str(), m)).collect();
        for item in fresh.iter_mut() {
            if item.metadata.is_none() {
                item.metadata = known.get(item.url.as_str()).and_then(|m| m.metadata.clone());
            }
        }
        self.media = fresh;

        let mut current_lost = false;
        if let Some(cur) = &self.current {
            match self.media.iter().position(|m| m.url == cur.url) {
                Some(pos) => self.current_index = Some(pos),
                None => {
                    // the next sequential pick lands on the slot the lost item held
                    self.current = None;
                    self.current_index = self.current_index.and_then(|i| i.checked_sub(1));
                    current_lost = true;
                }
            }
        }
        MediaChange { changed: true, current_lost }
    }

    /// Store enrichment results on every copy of `url` we hold.
    pub fn attach_metadata(&mut self, url: &str, meta: &crate::models::media::MediaMetadata) -> bool {
        let mut touched_current = false;
        for item in self.media.iter_mut().filter(|m| m.url == url) {
            item.metadata = Some(meta.clone());
        }
        if let Some(cur) = self.current.as_mut().filter(|c| c.url == url) {
            cur.metadata = Some(meta.clone());
            touched_current = true;
        }
        touched_current
    }

    fn touch(&mut self) {
        self.state_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::media::MediaType;

    fn item(url: &str) -> MediaItem {
        MediaItem::new(url, MediaType::Image)
    }

    fn local(url: &str, folder: &str) -> MediaItem {
        MediaItem::new(url, MediaType::Image).in_folder(folder)
    }

    #[test]
    fn test_build_rotation_unscoped_keeps_order() {
        let bg = BackgroundConfig {
            external_media_url_list: vec![item("https://x/1.jpg")],
            ..BackgroundConfig::default()
        };
        let set = build_rotation(&bg, vec![local("/backgrounds/a.jpg", "root")]);
        let urls: Vec<_> = set.iter().map(|m| m.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/1.jpg", "/backgrounds/a.jpg"]);
    }

    #[test]
    fn test_build_rotation_local_disabled() {
        let bg = BackgroundConfig { use_local_backgrounds: false, ..BackgroundConfig::default() };
        assert!(build_rotation(&bg, vec![local("/backgrounds/a.jpg", "root")]).is_empty());
    }

    #[test]
    fn test_build_rotation_scoped_is_strict_opt_in() {
        let mut bg = BackgroundConfig {
            external_media_url_list: vec![item("https://x/1.jpg"), item("https://x/2.jpg")],
            use_all_folders: Some(false),
            ..BackgroundConfig::default()
        };
        let scanned = vec![local("/backgrounds/a.jpg", "root"), local("/backgrounds/trip/b.jpg", "trip")];
        assert!(build_rotation(&bg, scanned.clone()).is_empty());

        bg.enabled_folders = Some(vec!["trip".into()]);
        bg.enabled_external_urls = Some(vec!["https://x/2.jpg".into()]);
        let urls: Vec<_> = build_rotation(&bg, scanned).into_iter().map(|m| m.url).collect();
        assert_eq!(urls, vec!["https://x/2.jpg".to_string(), "/backgrounds/trip/b.jpg".to_string()]);
    }

    #[test]
    fn test_build_rotation_dedupes_urls() {
        let bg = BackgroundConfig {
            external_media_url_list: vec![item("https://x/1.jpg"), item("https://x/1.jpg")],
            ..BackgroundConfig::default()
        };
        assert_eq!(build_rotation(&bg, Vec::new()).len(), 1);
    }

    #[test]
    fn test_sequential_cycle_visits_every_index() {
        let mut st = RotationState::with_seed(1);
        st.media = (0..5).map(|i| item(&format!("/backgrounds/{}.jpg", i))).collect();
        let mut seen = Vec::new();
        for _ in 0..10 {
            let idx = st.pick_index(PlaybackOrder::Sequential).unwrap();
            let it = st.media[idx].clone();
            st.commit(it, Some(idx));
            seen.push(idx);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4]);
        assert_eq!(st.state_id, 10);
    }

    #[test]
    fn test_random_pick_in_range() {
        let mut st = RotationState::with_seed(7);
        st.media = (0..3).map(|i| item(&format!("/backgrounds/{}.jpg", i))).collect();
        for _ in 0..50 {
            assert!(st.pick_index(PlaybackOrder::Random).unwrap() < 3);
        }
        assert!(st.preview(PlaybackOrder::Random).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut st = RotationState::with_seed(0);
        for i in 0..(HISTORY_CAPACITY + 10) {
            st.commit(item(&format!("/backgrounds/{}.jpg", i)), None);
        }
        assert_eq!(st.history.len(), HISTORY_CAPACITY);
        assert_eq!(st.history.front().unwrap().url, "/backgrounds/9.jpg");
        assert!(st.step_back());
        assert_eq!(st.current.as_ref().unwrap().url, format!("/backgrounds/{}.jpg", HISTORY_CAPACITY + 8));
    }

    #[test]
    fn test_step_back_on_empty_history_is_noop() {
        let mut st = RotationState::with_seed(0);
        assert!(!st.step_back());
        assert_eq!(st.state_id, 0);
    }

    #[test]
    fn test_dequeue_out_of_range() {
        let mut st = RotationState::with_seed(0);
        st.enqueue(item("a"));
        st.enqueue(item("b"));
        let id = st.state_id;
        assert!(st.dequeue_at(5).is_none());
        assert_eq!(st.state_id, id);
        assert_eq!(st.waiting.len(), 2);
    }

    #[test]
    fn test_replace_media_preserves_metadata_and_detects_loss() {
        let mut st = RotationState::with_seed(0);
        let mut a = item("/backgrounds/a.jpg");
        a.metadata = Some(crate::models::media::MediaMetadata {
            file_name: "a.jpg".into(),
            file_size: 1,
            mime_type: "image/jpeg".into(),
            created_at: None,
            modified_at: None,
            gps: None,
        });
        st.media = vec![a, item("/backgrounds/b.jpg")];
        st.commit(item("/backgrounds/b.jpg"), Some(1));

        let same = st.replace_media(vec![item("/backgrounds/a.jpg"), item("/backgrounds/b.jpg")]);
        assert!(!same.changed);

        let change = st.replace_media(vec![item("/backgrounds/c.jpg"), item("/backgrounds/a.jpg")]);
        assert!(change.changed);
        assert!(change.current_lost);
        assert!(st.current.is_none());
        assert!(st.media[1].metadata.is_some());
        assert_eq!(st.preview(PlaybackOrder::Sequential).unwrap().url, "/backgrounds/a.jpg");
    }

    #[test]
    fn test_replace_media_retargets_current_index() {
        let mut st = RotationState::with_seed(0);
        st.media = vec![item("a"), item("b")];
        st.commit(item("b"), Some(1));
        let change = st.replace_media(vec![item("z"), item("y"), item("b")]);
        assert!(change.changed && !change.current_lost);
        assert_eq!(st.current_index, Some(2));
        assert_eq!(st.preview(PlaybackOrder::Sequential).unwrap().url, "z");
    }

    #[test]
    fn test_pause_freezes_remaining_time() {
        let mut st = RotationState::with_seed(0);
        st.toggle_pause();
        let r1 = st.remaining(Duration::from_secs(30));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(st.remaining(Duration::from_secs(30)), r1);
    }
}
