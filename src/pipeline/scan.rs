use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use crate::models::media::{FolderInfo, MediaItem, MediaType};

/// Url prefix under which local media is served.
pub const URL_PREFIX: &str = "/backgrounds/";
/// Folder tag for files that sit directly in the media root.
pub const ROOT_FOLDER: &str = "root";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov"];

pub(crate) fn is_hidden(p: &Path) -> bool {
    p.file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

pub fn media_type_for(path: &Path) -> Option<MediaType> {
    let ext = path.extension().and_then(|s| s.to_str())?.to_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Video)
    } else {
        None
    }
}

/// Build the public url of a file given its folder tag.
pub fn media_url(folder: &str, file_name: &str) -> String {
    if folder == ROOT_FOLDER {
        format!("{}{}", URL_PREFIX, file_name)
    } else {
        format!("{}{}/{}", URL_PREFIX, folder, file_name)
    }
}

/// Scan the media root and one level of subfolders.
///
/// A missing or unreadable root yields an empty list. Entries keep the order
/// the directory walk produced them in.
pub fn scan(root: &Path) -> Vec<MediaItem> {
    if !root.is_dir() {
        debug!(root = %root.display(), "media root missing, nothing to scan");
        return Vec::new();
    }

    let mut items = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .into_iter()
        .filter_entry(|e| !is_hidden(e.path()));
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(media_type) = media_type_for(entry.path()) else {
            continue;
        };
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let folder = if entry.depth() == 1 {
            ROOT_FOLDER.to_string()
        } else {
            match entry.path().parent().and_then(|p| p.file_name()).and_then(|s| s.to_str()) {
                Some(f) => f.to_string(),
                None => continue,
            }
        };
        items.push(MediaItem::new(media_url(&folder, file_name), media_type).in_folder(folder));
    }
    debug!(root = %root.display(), count = items.len(), "scanned media root");
    items
}

/// Media folders with their item counts, sorted by name. Empty subfolders
/// are listed too so they can be renamed or filled from the settings page.
pub fn list_folders(root: &Path) -> Vec<FolderInfo> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    if let Ok(rd) = std::fs::read_dir(root) {
        for entry in rd.flatten() {
            let path = entry.path();
            if path.is_dir() && !is_hidden(&path) {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    counts.entry(name.to_string()).or_insert(0);
                }
            }
        }
    }
    for item in scan(root) {
        if let Some(folder) = item.folder {
            *counts.entry(folder).or_insert(0) += 1;
        }
    }
    counts.into_iter().map(|(name, count)| FolderInfo { name, count }).collect()
}
