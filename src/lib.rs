pub mod api;
pub mod controller;
pub mod events;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use controller::BackgroundController;
use events::Notifier;
use store::ConfigStore;

#[derive(Clone, Debug)]
pub struct AppPaths {
    pub media_root: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub started_at: std::time::Instant,
    pub paths: AppPaths,
    pub config: Arc<ConfigStore>,
    pub controller: Arc<BackgroundController>,
    pub notifier: Notifier,
    /// Fired once on shutdown; long-lived connections watch it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(paths: AppPaths, config: Arc<ConfigStore>, controller: Arc<BackgroundController>, notifier: Notifier) -> Self {
        Self {
            started_at: std::time::Instant::now(),
            paths,
            config,
            controller,
            notifier,
            shutdown: CancellationToken::new(),
        }
    }
}
