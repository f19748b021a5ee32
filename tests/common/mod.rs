#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use home_dashboard::api::routes;
use home_dashboard::controller::{BackgroundController, ControllerOptions};
use home_dashboard::events::Notifier;
use home_dashboard::pipeline::metadata::MetadataEnricher;
use home_dashboard::store::ConfigStore;
use home_dashboard::{AppPaths, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Interval long enough that the timer never fires during a test.
pub const NEVER_MS: u64 = 3_600_000;

pub struct TestEnv {
    pub tmp: TempDir,
    pub data: PathBuf,
    pub media_root: PathBuf,
    pub store: Arc<ConfigStore>,
    pub notifier: Notifier,
    pub controller: Arc<BackgroundController>,
}

/// Background section with timers pushed far out; `overrides` are merged on top.
pub fn background(overrides: Value) -> Value {
    let mut bg = json!({
        "externalMediaUrlList": [],
        "interval": NEVER_MS,
        "useLocalBackgrounds": true,
        "localPollingInterval": NEVER_MS,
        "transitionMode": "fade",
        "playbackOrder": "sequential",
    });
    if let (Some(base), Some(extra)) = (bg.as_object_mut(), overrides.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    bg
}

pub fn external(urls: &[&str]) -> Value {
    Value::Array(urls.iter().map(|u| json!({ "url": u, "type": "image" })).collect())
}

pub fn write_config(data: &Path, bg: Value) {
    std::fs::create_dir_all(data).unwrap();
    let doc = json!({ "background": bg, "modules": [] });
    std::fs::write(data.join("config.json"), serde_json::to_string_pretty(&doc).unwrap()).unwrap();
}

/// Build an environment without starting the controller.
pub fn setup(bg: Value) -> TestEnv {
    setup_with(bg, ControllerOptions { refresh_debounce: Duration::from_millis(50), seed: Some(42) })
}

pub fn setup_with(bg: Value, options: ControllerOptions) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    let media_root = data.join("backgrounds");
    std::fs::create_dir_all(&media_root).unwrap();
    write_config(&data, bg);

    let store = Arc::new(ConfigStore::open(&data, &tmp.path().join("no-defaults.json")).unwrap());
    let notifier = Notifier::default();
    let enricher = Arc::new(MetadataEnricher::new(media_root.clone(), 2));
    let controller = BackgroundController::new(store.clone(), media_root.clone(), enricher, notifier.clone(), options);
    TestEnv { tmp, data, media_root, store, notifier, controller }
}

impl TestEnv {
    pub fn app_state(&self) -> Arc<AppState> {
        let paths = AppPaths { media_root: self.media_root.clone() };
        Arc::new(AppState::new(paths, self.store.clone(), self.controller.clone(), self.notifier.clone()))
    }

    pub fn urls(&self) -> Vec<String> {
        self.controller.media().into_iter().map(|m| m.url).collect()
    }

    pub fn current_url(&self) -> Option<String> {
        self.controller.current().map(|m| m.url)
    }
}

/// Start the HTTP surface on an ephemeral port.
pub async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let app = routes::router(state);
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Minimal valid JPEG (no EXIF).
pub fn create_jpeg(path: &Path) {
    use base64::{engine::general_purpose, Engine as _};
    let img_bytes = general_purpose::STANDARD.decode("/9j/4AAQSkZJRgABAQAAAQABAAD/2wBDAP//////////////////////////////////////////////////////////////////////////////////////2wBDAf//////////////////////////////////////////////////////////////////////////////////////wAARCABkAGQDAREAAhEBAxEB/8QAFQABAQAAAAAAAAAAAAAAAAAAAAb/xAAUEAEAAAAAAAAAAAAAAAAAAAAA/8QAFQEBAQAAAAAAAAAAAAAAAAAAAgP/xAAUEQEAAAAAAAAAAAAAAAAAAAAA/9oADAMBAAIRAxEAPwB3AAAAAP/Z").unwrap();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(path, img_bytes).unwrap();
}

/// Poll `condition` until it holds or the attempts run out.
pub async fn wait_for_condition<F>(mut condition: F, max_attempts: usize, delay_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..max_attempts {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    condition()
}
