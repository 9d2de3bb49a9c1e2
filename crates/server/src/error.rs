use reqwest::StatusCode;
use thiserror::Error;

/// Failures while producing email content from a generative backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model {model} throttled the request")]
    Throttled { model: String },
    #[error("generation HTTP {status}: {context}")]
    Http { status: StatusCode, context: String },
    #[error("generation returned no usable text")]
    EmptyResponse,
    #[error("no generation models configured")]
    NoModels,
    #[error("network error calling generation backend: {0}")]
    Network(String),
    #[error("resume attachment error: {0}")]
    Attachment(String),
}

impl GenerationError {
    /// Throttling advances the model fallback chain; everything else fails
    /// the contact record immediately.
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }
}

/// Failures while discovering candidate contacts for a campaign.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no professors/contacts found for this campaign")]
    NoContacts,
    #[error("directory API error: {0}")]
    Directory(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Failures around the mail provider's OAuth access token.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("no mail credential on file for user {0}")]
    Missing(String),
    #[error("token refresh rejected: {0}")]
    RefreshRejected(String),
    #[error("network error refreshing token: {0}")]
    Network(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

/// Failures while dispatching one message through the mail provider.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("{0}")]
    Provider(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("network error sending mail: {0}")]
    Network(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

/// Per-row failures during a reply-tracking sweep, classified so a sweep can
/// skip work it already knows will fail (e.g. the rest of a user's rows
/// after an auth failure).
#[derive(Debug, Error)]
pub enum ReplyCheckError {
    #[error("mail credential unusable: {0}")]
    Auth(String),
    #[error("thread {0} not found at provider")]
    ThreadNotFound(String),
    #[error("provider error checking thread: {0}")]
    Provider(String),
    #[error("network error checking thread: {0}")]
    Network(String),
}

impl ReplyCheckError {
    /// Auth failures are per-user, not per-row: the sweep stops touching
    /// that user's remaining rows for this pass.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Top-level pipeline failures surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("campaign {0} not found")]
    CampaignNotFound(i32),
    #[error("invalid campaign: {0}")]
    InvalidCampaign(String),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Transition(#[from] crate::status::IllegalTransition),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}
