use serde::{Serialize, Deserialize};

use crate::models::config::TransitionMode;
use crate::models::media::MediaItem;

/// Snapshot of what every display should be showing right now.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    pub current_media: Option<MediaItem>,
    pub next_media: Option<MediaItem>,
    /// Milliseconds until the next automatic advance.
    pub remaining_time: u64,
    pub transition_mode: TransitionMode,
    pub total_interval: u64,
    pub waiting_list: Vec<MediaItem>,
    pub state_id: u64,
    pub is_paused: bool,
}
