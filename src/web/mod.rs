//! Settings UI: an HTML form at `/settings` and its JSON twin under `/api/v1`.

use axum::{middleware as axum_middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::agent::EventSender;
use crate::config::AppConfig;
use crate::store::ConfigStore;

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use handlers::{get_settings, health_check, save_settings, settings_page, update_settings};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub store: ConfigStore,
    pub config: AppConfig,
    /// Queue of an agent running in this process, told to reload after saves.
    pub agent_events: Option<EventSender>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(settings_page))
        .route("/settings", get(settings_page).post(save_settings))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(axum_middleware::from_fn(middleware::security_headers)),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).put(update_settings))
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Settings UI listening on {}", state.config.server.base_url);

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
