//! OpenAPI/Utoipa configuration.

use crate::api::{
    campaigns::CAMPAIGNS_TAG, health::MISC_TAG, sweeps::PIPELINE_TAG, tracking::TRACKING_TAG,
};
use utoipa::OpenApi;

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Outreach Pipeline API",
        version = "1.0.0",
        description = "API for running cold-outreach email campaigns: contact discovery, \
                       content generation, rate-limited dispatch and reply tracking."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = CAMPAIGNS_TAG, description = "Campaign creation, discovery and inspection"),
        (name = PIPELINE_TAG, description = "Manual triggers for the send and reply sweeps"),
        (name = TRACKING_TAG, description = "Email open tracking")
    )
)]
pub struct ApiDoc;
