pub mod api;
pub mod pack;
pub mod seasonality;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::engine::Engine;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

pub fn router(state: AppState) -> Router {
    // Research tooling runs on localhost; keep the browser clients working
    // without per-host configuration.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _request_parts: &_| {
                origin
                    .to_str()
                    .map(|o| o.starts_with("http://localhost:") || o.starts_with("http://127.0.0.1:"))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(api::health_handler))
        .route("/expr/series", post(api::series_handler))
        .route("/expr/chart", post(api::chart_handler))
        .route("/expr/ma", post(api::ma_handler))
        .route("/expr/bollinger", post(api::bollinger_handler))
        .route("/expr/rsi", post(api::rsi_handler))
        .route("/expr/drawdown", post(api::drawdown_handler))
        .route("/expr/sharpe", post(api::sharpe_handler))
        .route("/expr/vol", post(api::vol_handler))
        .route("/expr/zscore", post(api::zscore_handler))
        .route("/expr/corr", post(api::corr_handler))
        .route("/expr/seasonality/years", post(seasonality::years_handler))
        .route("/expr/seasonality/heatmap", post(seasonality::heatmap_handler))
        .route("/expr/pack", post(pack::pack_handler))
        .route("/data/ohlcv", post(api::ohlcv_handler))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process is stopped. The engine is started
/// before the listener opens and drained on ctrl-c.
pub async fn serve(engine: Arc<Engine>, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    engine.start().await?;

    let state = AppState { engine: Arc::clone(&engine) };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            engine.shutdown().await;
        })
        .await?;

    Ok(())
}
