//! HTTP/WebSocket front end and daemon bootstrap.
//!
//! Endpoints:
//! - `WS /ws`: streaming session (control messages in, frames out)
//! - `GET /api/status`: uptime and latest artifact, for health checks
//!
//! `run` is the whole daemon: clear stale artifacts, sweep the raw backlog,
//! spawn the capture pipeline, then serve connections until the process is
//! killed.

mod ws;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::artifacts::ArtifactStore;
use crate::capture::{process_backlog, source::open_source, CapturePipeline};
use crate::config::VeilcamConfig;
use crate::detect;
use crate::redact::Redactor;
use crate::vault;

struct WebState {
    store: ArtifactStore,
    start_time: Instant,
    push_interval: Duration,
}

/// Bring up the full daemon and serve until the process exits.
pub async fn run(cfg: VeilcamConfig) -> Result<()> {
    let store = ArtifactStore::open(&cfg.dirs)?;
    if cfg.clear_on_start {
        store.clear_all().context("failed to clear artifact dirs")?;
        log::info!("artifact directories cleared");
    }

    let key = vault::derive_key(&cfg.passphrase);
    let mut redactor = Redactor::new(
        detect::default_stack(cfg.camera.width, cfg.camera.height),
        cfg.capture.mosaic_scale,
    );
    process_backlog(&store, &mut redactor, &key)?;

    let source = open_source(&cfg.camera.url, cfg.camera.width, cfg.camera.height)?;
    let pipeline = CapturePipeline::new(
        source,
        redactor,
        store.clone(),
        key,
        cfg.capture.interval,
    );
    tokio::spawn(pipeline.run());

    let state = Arc::new(WebState {
        store,
        start_time: Instant::now(),
        push_interval: cfg.capture.interval,
    });
    let app = Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/status", get(api_status))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    log::info!("listening on http://{}", cfg.bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        ws::handle_ws(socket, state.store.clone(), state.push_interval)
    })
}

async fn api_status(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let latest = state
        .store
        .latest_mosaic()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
    Json(serde_json::json!({
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "latest_frame": latest,
    }))
}
