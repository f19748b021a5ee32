use anyhow::Result;
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::BackgroundController;
use crate::pipeline::scan::is_hidden;

/// Whether a filesystem event can change the set of scanned media.
/// Content-only writes to an existing file keep its url, so they are ignored.
pub(crate) fn affects_media(kind: &EventKind, paths: &[PathBuf], root: &Path) -> bool {
    let structural = matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    structural
        && paths.iter().any(|p| {
            // deeper than one folder level is never scanned
            let depth = p.strip_prefix(root).map(|r| r.components().count()).unwrap_or(usize::MAX);
            depth <= 2 && !is_hidden(p)
        })
}

/// Watch the media root and turn structural changes into debounced refreshes.
/// Runs until `shutdown` fires.
pub async fn watch(root: PathBuf, controller: Arc<BackgroundController>, shutdown: CancellationToken) -> Result<()> {
    let (evt_tx, mut evt_rx) = tokio::sync::mpsc::channel::<notify::Result<notify::Event>>(1024);
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        // a full channel already guarantees a pending refresh
        let _ = evt_tx.try_send(res);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching media root");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            res = evt_rx.recv() => match res {
                Some(Ok(ev)) => {
                    if affects_media(&ev.kind, &ev.paths, &root) {
                        debug!(kind = ?ev.kind, paths = ?ev.paths, "media root changed");
                        controller.request_refresh();
                    }
                }
                Some(Err(e)) => warn!("watch error: {}", e),
                None => break,
            },
        }
    }
    drop(watcher);
    debug!("media watcher stopped");
    Ok(())
}
