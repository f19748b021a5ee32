use axum::{Router, routing::{get, post}};
use std::sync::Arc;
use tower_http::cors::{CorsLayer, AllowOrigin};
use axum::http::Method;
use crate::AppState;
use crate::api::{handlers, ws};

/// Upload size cap for `POST /api/backgrounds`.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any()) // displays may be served from another origin
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT, axum::http::header::RANGE]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/background/next", post(handlers::background_next))
        .route("/api/background/previous", post(handlers::background_previous))
        .route("/api/background/pause", post(handlers::background_pause))
        .route("/api/background/waiting-list", post(handlers::background_waiting_list))
        .route("/api/background/status", get(handlers::background_status))
        .route("/api/ws", get(ws::ws_handler))
        .route("/api/config", get(handlers::get_config).post(handlers::save_config))
        .route(
            "/api/backgrounds",
            get(handlers::list_backgrounds)
                .post(handlers::upload_backgrounds)
                .delete(handlers::delete_background),
        )
        .route("/api/backgrounds/folders", get(handlers::list_folders).put(handlers::rename_folder))
        .route("/api/export-backgrounds", get(handlers::export_backgrounds))
        .route("/api/system-info", get(handlers::system_info))
        .route("/backgrounds/*path", get(handlers::serve_background))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}
