//! Open-tracking pixel endpoint.
//!
//! Every outgoing email embeds a 1x1 GIF pointing here. A fetch increments
//! the matching delivery log's open counter; unknown ids still get the
//! pixel so broken links never render as errors in a mail client.

use crate::api::ApiState;
use crate::dispatch;
use axum::extract::Path;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::{Extension, response::IntoResponse};
use tracing::warn;

/// Tag for OpenAPI documentation.
pub const TRACKING_TAG: &str = "Tracking";

/// Smallest valid transparent GIF89a.
const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, // GIF89a
    0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, // 1x1, global color table
    0x00, 0x00, 0x00, 0xff, 0xff, 0xff, // palette: black, white
    0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, // graphic control, transparent
    0x2c, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, // image descriptor
    0x02, 0x02, 0x44, 0x01, 0x00, // image data
    0x3b, // trailer
];

#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/track/{tracking_id}",
    operation_id = "Tracking Pixel",
    tag = TRACKING_TAG,
    summary = "Record an email open and serve a transparent pixel",
    params(("tracking_id" = String, Path, description = "Tracking id, with or without a .gif suffix")),
    responses(
        (status = 200, description = "Transparent 1x1 GIF", content_type = "image/gif")
    )
)]
pub async fn pixel(
    Extension(state): Extension<ApiState>,
    Path(tracking_id): Path<String>,
) -> impl IntoResponse {
    let tracking_id = tracking_id
        .strip_suffix(".gif")
        .unwrap_or(&tracking_id)
        .to_string();
    if let Err(e) = dispatch::record_pixel_open(state.resources.db.as_ref(), &tracking_id).await {
        warn!(tracking_id = %tracking_id, error = %e, "failed to record pixel open");
    }

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/gif"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    (StatusCode::OK, headers, TRANSPARENT_GIF)
}
