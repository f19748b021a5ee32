use std::net::SocketAddr;
use std::sync::Arc;

use home_dashboard::controller::{BackgroundController, ControllerOptions};
use home_dashboard::events::Notifier;
use home_dashboard::pipeline::metadata::MetadataEnricher;
use home_dashboard::pipeline::watch;
use home_dashboard::store::ConfigStore;
use home_dashboard::utils::config::Config;
use home_dashboard::utils::logging;
use home_dashboard::{AppPaths, AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    let media_root = cfg.media_root();
    std::fs::create_dir_all(&media_root)?;

    let store = Arc::new(ConfigStore::open(&cfg.data, &cfg.defaults_file())?);
    let notifier = Notifier::default();
    let enricher = Arc::new(MetadataEnricher::new(media_root.clone(), cfg.meta_threads));
    let options = ControllerOptions { refresh_debounce: cfg.refresh_debounce, ..ControllerOptions::default() };
    let controller = BackgroundController::new(store.clone(), media_root.clone(), enricher, notifier.clone(), options);
    controller.start().await;

    let paths = AppPaths { media_root: media_root.clone() };
    let state = Arc::new(AppState::new(paths, store, controller.clone(), notifier));

    {
        let root = media_root.clone();
        let ctl = controller.clone();
        let token = state.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = watch::watch(root, ctl, token).await {
                error!("media watcher failed, relying on polling: {}", e);
            }
        });
    }

    let app = home_dashboard::api::routes::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening" = %addr, media_root = %media_root.display());

    let token = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            token.cancel();
        })
        .await?;

    controller.shutdown();
    Ok(())
}
