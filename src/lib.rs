pub mod api;
pub mod app_state;
pub mod catalog;
pub mod claim;
pub mod config;
pub mod delivery;
pub mod error;
pub mod gate;
pub mod locator;
pub mod range;
pub mod session;
pub mod token_bucket;

use anyhow::Context;
use axum::Router;
use axum::extract::Extension;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

//
// Re-export
//
pub use api::{list_albums, list_songs, log_request_errors, stream_song};
pub use app_state::AppState;
pub use catalog::{Catalog, JsonCatalog};
pub use claim::{ClaimManager, StreamClaim};
pub use config::Config;
pub use error::StreamError;
pub use gate::{AccessGate, Authorization};
pub use locator::{AssetLocator, ResolvedAsset};
pub use session::{CallerId, Session, SessionVerifier, StaticSessions};
pub use token_bucket::TokenBucket;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/stream/{id}", get(stream_song))
        .route("/api/songs/stream/{id}", get(stream_song))
        .route("/api/songs", get(list_songs))
        .route("/api/albums", get(list_albums))
        .layer(axum::middleware::from_fn_with_state(
            state.sessions.clone(),
            session::session_middleware,
        ))
        .layer(axum::middleware::from_fn(api::log_request_errors))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(&config).await?;
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.listen_on_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
