use std::path::{Path, PathBuf};

use crate::pipeline::scan::{ROOT_FOLDER, URL_PREFIX};

/// Resolve a media url (`/backgrounds/<file>` or `/backgrounds/<folder>/<file>`)
/// to a path inside the media root.
///
/// Returns `None` for external urls and for anything that would escape the
/// root (`..`, absolute segments, backslashes, more than one folder level).
pub fn resolve_media_url(root: &Path, url: &str) -> Option<PathBuf> {
    let relative = url.strip_prefix(URL_PREFIX)?;
    resolve_relative(root, relative)
}

/// Same as [`resolve_media_url`] for an already stripped `<folder>/<file>` path.
pub fn resolve_relative(root: &Path, relative: &str) -> Option<PathBuf> {
    let segments: Vec<&str> = relative.split('/').collect();
    if segments.is_empty() || segments.len() > 2 {
        return None;
    }
    if !segments.iter().all(|s| is_safe_segment(s)) {
        return None;
    }
    let mut path = root.to_path_buf();
    for s in segments {
        path.push(s);
    }
    Some(path)
}

/// Directory for a folder tag; `root` (or no tag) maps to the media root itself.
pub fn folder_dir(root: &Path, folder: Option<&str>) -> Option<PathBuf> {
    match folder.map(str::trim).filter(|f| !f.is_empty()) {
        None => Some(root.to_path_buf()),
        Some(f) if f == ROOT_FOLDER => Some(root.to_path_buf()),
        Some(f) if is_safe_segment(f) => Some(root.join(f)),
        Some(_) => None,
    }
}

/// Reduce a client supplied file name to its last component.
pub fn base_name(name: &str) -> Option<&str> {
    let last = name.rsplit(['/', '\\']).next()?;
    if is_safe_segment(last) { Some(last) } else { None }
}

pub fn is_safe_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_root_and_folder() {
        let root = Path::new("/data/backgrounds");
        assert_eq!(resolve_media_url(root, "/backgrounds/a.jpg"), Some(PathBuf::from("/data/backgrounds/a.jpg")));
        assert_eq!(resolve_media_url(root, "/backgrounds/trip/b.mp4"), Some(PathBuf::from("/data/backgrounds/trip/b.mp4")));
    }

    #[test]
    fn test_resolve_rejects_traversal_and_external() {
        let root = Path::new("/data/backgrounds");
        assert_eq!(resolve_media_url(root, "/backgrounds/../config.json"), None);
        assert_eq!(resolve_media_url(root, "/backgrounds/a/b/c.jpg"), None);
        assert_eq!(resolve_media_url(root, "/backgrounds/a\\..\\b.jpg"), None);
        assert_eq!(resolve_media_url(root, "https://example.com/a.jpg"), None);
        assert_eq!(resolve_media_url(root, "/backgrounds/"), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(base_name("C:\\photos\\cat.jpg"), Some("cat.jpg"));
        assert_eq!(base_name(".."), None);
        assert_eq!(base_name("dir/"), None);
    }

    #[test]
    fn test_folder_dir() {
        let root = Path::new("/m");
        assert_eq!(folder_dir(root, None), Some(PathBuf::from("/m")));
        assert_eq!(folder_dir(root, Some("root")), Some(PathBuf::from("/m")));
        assert_eq!(folder_dir(root, Some("trip")), Some(PathBuf::from("/m/trip")));
        assert_eq!(folder_dir(root, Some("../x")), None);
    }
}
