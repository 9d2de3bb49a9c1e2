//! Campaign management API endpoints.
//!
//! - `POST /` - Create a campaign in `pending_processing`
//! - `POST /{id}/discover` - Run discovery + dedup and enqueue contacts
//! - `GET /{id}` - Campaign detail including per-contact outcomes

use crate::api::ApiState;
use crate::entity::{campaign, contact};
use crate::error::PipelineError;
use crate::pipeline::NewCampaign;
use axum::http::StatusCode;
use axum::{Json, extract::Path, extract::State, response::IntoResponse};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::json;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const CAMPAIGNS_TAG: &str = "Campaigns API";

/// Creates the campaigns API router.
pub fn router(state: ApiState) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(create_campaign))
        .routes(routes!(discover))
        .routes(routes!(campaign_detail))
        .with_state(state)
}

/// Map pipeline errors to HTTP responses. Failed campaigns expose their
/// error message verbatim.
pub(crate) fn error_response(error: &PipelineError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match error {
        PipelineError::CampaignNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::InvalidCampaign(_) | PipelineError::Transition(_) => StatusCode::BAD_REQUEST,
        PipelineError::Discovery(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() })))
}

#[tracing::instrument(skip(state, payload), fields(owner_id = %payload.owner_id))]
#[utoipa::path(
    post,
    path = "/",
    operation_id = "Create Campaign",
    tag = CAMPAIGNS_TAG,
    summary = "Create a new outreach campaign",
    request_body(content = NewCampaign, description = "Campaign intent"),
    responses(
        (status = 201, description = "Campaign created", content_type = "application/json"),
        (status = 400, description = "Invalid campaign (e.g. custom kind without custom_prompt)", content_type = "application/json"),
        (status = 500, description = "Internal server error", content_type = "application/json")
    )
)]
async fn create_campaign(
    State(state): State<ApiState>,
    Json(payload): Json<NewCampaign>,
) -> impl IntoResponse {
    match state.pipeline.create_campaign(payload).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(json!({ "campaign_id": created.id, "status": created.status })),
        ),
        Err(e) => error_response(&e),
    }
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/{id}/discover",
    operation_id = "Run Discovery",
    tag = CAMPAIGNS_TAG,
    summary = "Discover contacts and enqueue pending records",
    description = "Runs contact discovery (directory first, generative fallback second), \
                   removes contacts this owner has already reached in any campaign, inserts \
                   the pending records and moves the campaign to `queued`. With zero contacts \
                   left after dedup the campaign fails instead.",
    params(("id" = i32, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Contacts enqueued", content_type = "application/json"),
        (status = 404, description = "Campaign not found", content_type = "application/json"),
        (status = 422, description = "No contacts found; campaign marked failed", content_type = "application/json")
    )
)]
async fn discover(State(state): State<ApiState>, Path(id): Path<i32>) -> impl IntoResponse {
    match state.pipeline.run_discovery_and_enqueue(id).await {
        Ok(enqueued) => (
            StatusCode::OK,
            Json(json!({ "campaign_id": id, "enqueued": enqueued })),
        ),
        Err(e) => error_response(&e),
    }
}

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/{id}",
    operation_id = "Campaign Detail",
    tag = CAMPAIGNS_TAG,
    summary = "Campaign status plus per-contact outcomes",
    params(("id" = i32, Path, description = "Campaign id")),
    responses(
        (status = 200, description = "Campaign detail", content_type = "application/json"),
        (status = 404, description = "Campaign not found", content_type = "application/json")
    )
)]
async fn campaign_detail(State(state): State<ApiState>, Path(id): Path<i32>) -> impl IntoResponse {
    let db = state.resources.db.as_ref();
    let found = match campaign::Entity::find_by_id(id).one(db).await {
        Ok(found) => found,
        Err(e) => return error_response(&PipelineError::Db(e)),
    };
    let Some(found) = found else {
        return error_response(&PipelineError::CampaignNotFound(id));
    };
    let contacts = match contact::Entity::find()
        .filter(contact::Column::CampaignId.eq(id))
        .order_by_asc(contact::Column::Id)
        .all(db)
        .await
    {
        Ok(contacts) => contacts,
        Err(e) => return error_response(&PipelineError::Db(e)),
    };
    (
        StatusCode::OK,
        Json(json!({ "campaign": found, "contacts": contacts })),
    )
}
