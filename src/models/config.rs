use serde::{Serialize, Deserialize};
use serde_json::{Map, Value};

use crate::models::media::MediaItem;

pub const DEFAULT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_POLLING_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DashboardConfig {
    pub background: BackgroundConfig,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    #[serde(default)]
    pub external_media_url_list: Vec<MediaItem>,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_true")]
    pub use_local_backgrounds: bool,
    #[serde(default = "default_polling_interval")]
    pub local_polling_interval: u64,
    #[serde(default)]
    pub transition_mode: TransitionMode,
    #[serde(default)]
    pub playback_order: PlaybackOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_playback_mode: Option<VideoPlaybackMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_folders: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_external_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_all_folders: Option<bool>,
    /// Keys this service does not interpret, kept so a write round-trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_interval() -> u64 { DEFAULT_INTERVAL_MS }
fn default_polling_interval() -> u64 { DEFAULT_POLLING_INTERVAL_MS }
fn default_true() -> bool { true }

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            external_media_url_list: Vec::new(),
            interval: DEFAULT_INTERVAL_MS,
            use_local_backgrounds: true,
            local_polling_interval: DEFAULT_POLLING_INTERVAL_MS,
            transition_mode: TransitionMode::default(),
            playback_order: PlaybackOrder::default(),
            video_playback_mode: None,
            enabled_folders: None,
            enabled_external_urls: None,
            use_all_folders: None,
            extra: Map::new(),
        }
    }
}

impl BackgroundConfig {
    /// Rotation interval, never zero.
    pub fn interval_ms(&self) -> u64 {
        if self.interval == 0 { DEFAULT_INTERVAL_MS } else { self.interval }
    }

    pub fn polling_interval_ms(&self) -> u64 {
        if self.local_polling_interval == 0 { DEFAULT_POLLING_INTERVAL_MS } else { self.local_polling_interval }
    }

    /// Folder scoping only applies when `useAllFolders` is explicitly false.
    pub fn folder_scoping(&self) -> bool {
        self.use_all_folders == Some(false)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransitionMode {
    #[default]
    Fade,
    Slide,
    Zoom,
    Blur,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackOrder {
    #[default]
    Sequential,
    Random,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoPlaybackMode {
    Loop,
    Once,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModulePosition {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    MiddleCenter,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModuleConfig {
    pub id: String,
    pub module: String,
    pub position: ModulePosition,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub config: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_document_gets_defaults() {
        let cfg: DashboardConfig = serde_json::from_str(r#"{"background":{},"modules":[]}"#).unwrap();
        assert_eq!(cfg.background.interval, 30_000);
        assert!(cfg.background.use_local_backgrounds);
        assert_eq!(cfg.background.transition_mode, TransitionMode::Fade);
        assert_eq!(cfg.background.playback_order, PlaybackOrder::Sequential);
        assert!(!cfg.background.folder_scoping());
    }

    #[test]
    fn test_unknown_background_keys_round_trip() {
        let raw = r#"{"background":{"interval":5000,"waitingList":[],"customFlag":true},"modules":[]}"#;
        let cfg: DashboardConfig = serde_json::from_str(raw).unwrap();
        let back = serde_json::to_value(&cfg).unwrap();
        assert_eq!(back["background"]["customFlag"], true);
        assert_eq!(back["background"]["interval"], 5000);
    }

    #[test]
    fn test_module_positions_parse() {
        let raw = r#"{"id":"clock-1","module":"Clock","position":"bottom_right","enabled":true,"config":{"displaySeconds":true}}"#;
        let m: ModuleConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(m.position, ModulePosition::BottomRight);
        assert_eq!(m.config["displaySeconds"], true);
    }

    #[test]
    fn test_zero_interval_falls_back() {
        let bg = BackgroundConfig { interval: 0, ..BackgroundConfig::default() };
        assert_eq!(bg.interval_ms(), DEFAULT_INTERVAL_MS);
    }
}
