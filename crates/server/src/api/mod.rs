//! API module providing HTTP endpoints for the outreach pipeline.
//!
//! This module is organized into submodules:
//! - `campaigns` - Campaign creation and discovery (/api/campaigns/*)
//! - `sweeps` - Batch send and reply-tracking triggers (/api/pipeline/*)
//! - `tracking` - Open-tracking pixel (/track/*)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod campaigns;
pub mod health;
pub mod openapi;
pub mod sweeps;
pub mod tracking;

pub use campaigns::CAMPAIGNS_TAG;
pub use health::MISC_TAG;
pub use sweeps::PIPELINE_TAG;
pub use tracking::TRACKING_TAG;

use crate::AppResources;
use crate::pipeline::Pipeline;
use crate::reply_tracker::ReplyTracker;
use axum::Router;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Shared state for all pipeline endpoints.
#[derive(Clone)]
pub struct ApiState {
    pub resources: Arc<AppResources>,
    pub pipeline: Arc<Pipeline>,
    pub tracker: Arc<ReplyTracker>,
}

/// Builds the full application router. Split out of [`start_webserver`] so
/// tests can drive the handlers without binding a socket.
pub fn build_router(state: ApiState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/campaigns", campaigns::router(state.clone()))
        .nest("/api/pipeline", sweeps::router(state.clone()))
        .routes(routes!(tracking::pixel))
        .routes(routes!(health::health))
        .layer(axum::Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip_all)]
pub async fn start_webserver(state: ApiState) -> color_eyre::Result<()> {
    let bind_addr = state.resources.config.bind_addr.clone();
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server running");
    axum::serve(listener, router)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;
    Ok(())
}
