//! Manual triggers for the two background sweeps.
//!
//! The same sweeps run on timers in `main`; these endpoints exist so
//! operators (and tests) can drive a pass on demand.

use crate::api::ApiState;
use crate::api::campaigns::error_response;
use crate::pipeline::BatchSummary;
use crate::reply_tracker::SweepSummary;
use axum::http::StatusCode;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const PIPELINE_TAG: &str = "Pipeline API";

/// Creates the pipeline sweeps router.
pub fn router(state: ApiState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(send_batch))
        .routes(routes!(reply_sweep))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SendBatchRequest {
    /// Maximum records to claim this pass; defaults to the configured batch size.
    #[serde(default)]
    pub batch_size: Option<u64>,
    /// Restrict the pass to one campaign's pending records.
    #[serde(default)]
    pub campaign_id: Option<i32>,
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/send-batch",
    operation_id = "Run Send Batch",
    tag = PIPELINE_TAG,
    summary = "Claim pending contact records and send their emails",
    request_body(content = SendBatchRequest, description = "Batch options"),
    responses(
        (status = 200, description = "Batch summary", body = BatchSummary, content_type = "application/json"),
        (status = 500, description = "Internal server error", content_type = "application/json")
    )
)]
async fn send_batch(
    State(state): State<ApiState>,
    payload: Option<Json<SendBatchRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let batch_size = request
        .batch_size
        .unwrap_or(state.resources.config.pipeline.batch_size);
    match state
        .pipeline
        .run_send_batch(batch_size, request.campaign_id)
        .await
    {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(e) => error_response(&e),
    }
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/reply-sweep",
    operation_id = "Run Reply Sweep",
    tag = PIPELINE_TAG,
    summary = "Check sent emails for replies via their mail threads",
    responses(
        (status = 200, description = "Sweep summary", body = SweepSummary, content_type = "application/json"),
        (status = 500, description = "Internal server error", content_type = "application/json")
    )
)]
async fn reply_sweep(State(state): State<ApiState>) -> impl IntoResponse {
    match state.tracker.run_sweep(state.resources.db.as_ref()).await {
        Ok(summary) => (StatusCode::OK, Json(json!(summary))),
        Err(e) => error_response(&e),
    }
}
