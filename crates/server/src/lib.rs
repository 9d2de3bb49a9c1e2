//! A cold-outreach email fulfillment pipeline.
//!
//! Campaigns go through contact discovery, cross-campaign dedup, generative
//! content production with model fallback, rate-limited dispatch through the
//! owner's mail account, and thread-based reply tracking.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod generation;
pub mod pipeline;
pub mod ratelimit;
pub mod reply_tracker;
pub mod status;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub http: reqwest::Client,
    pub config: Arc<AppConfig>,
}
