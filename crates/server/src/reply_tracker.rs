//! Reply detection sweep.
//!
//! Runs outside the send path, on a schedule: for every user with a mail
//! credential, each delivery log still in `sent` is resolved to its mail
//! thread; a thread holding more than one message means the contact
//! replied. Rows whose tracking id predates thread-based tracking are
//! marked `legacy` and never queried. Per-row errors are recorded without
//! aborting the sweep, and an auth failure skips the rest of that user's
//! rows for the pass.

use crate::config::MailConfig;
use crate::dispatch::ensure_fresh_token;
use crate::entity::{delivery_log, mail_credential};
use crate::error::{PipelineError, ReplyCheckError};
use crate::status::DeliveryStatus;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use utoipa::ToSchema;

/// Outcome counts for one reply-tracking sweep.
#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct SweepSummary {
    pub users: usize,
    pub checked: usize,
    pub replied: usize,
    pub legacy: usize,
    pub errors: usize,
}

#[derive(Deserialize)]
struct ThreadResponse {
    #[serde(default)]
    messages: Vec<serde_json::Value>,
}

pub struct ReplyTracker {
    http: reqwest::Client,
    mail: MailConfig,
}

impl ReplyTracker {
    pub fn new(http: reqwest::Client, mail: MailConfig) -> Self {
        Self { http, mail }
    }

    /// Sweep all users' sent delivery logs for replies.
    ///
    /// Only infrastructure failures (the database being unreachable) abort
    /// the sweep; everything else is recorded per row.
    #[tracing::instrument(skip_all)]
    pub async fn run_sweep(&self, db: &DatabaseConnection) -> Result<SweepSummary, PipelineError> {
        let mut summary = SweepSummary::default();
        let credentials = mail_credential::Entity::find().all(db).await?;
        for credential in credentials {
            summary.users += 1;
            let user_id = credential.user_id.clone();
            let credential =
                match ensure_fresh_token(&self.http, &self.mail, db, credential).await {
                    Ok(credential) => credential,
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "skipping user, token refresh failed");
                        summary.errors += 1;
                        continue;
                    }
                };

            let logs = delivery_log::Entity::find()
                .filter(delivery_log::Column::UserId.eq(&user_id))
                .filter(delivery_log::Column::Status.eq(DeliveryStatus::Sent))
                .all(db)
                .await?;
            for log in logs {
                if log.is_legacy_tracking_id() || log.thread_id.is_none() {
                    summary.legacy += 1;
                    set_status(db, log, DeliveryStatus::Legacy).await?;
                    continue;
                }
                // Checked above.
                let thread_id = log.thread_id.clone().unwrap_or_default();
                summary.checked += 1;
                match self
                    .thread_message_count(&credential.access_token, &thread_id)
                    .await
                {
                    Ok(count) if count > 1 => {
                        summary.replied += 1;
                        set_status(db, log, DeliveryStatus::Replied).await?;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        summary.errors += 1;
                        warn!(user_id = %user_id, thread_id = %thread_id, error = %e, "reply check failed");
                        match e {
                            // The rest of this user's rows would fail the
                            // same way; come back next sweep.
                            ReplyCheckError::Auth(_) => break,
                            // A vanished thread will never resolve; stop
                            // re-querying it.
                            ReplyCheckError::ThreadNotFound(_) => {
                                set_status(db, log, DeliveryStatus::Error).await?;
                            }
                            ReplyCheckError::Provider(_) | ReplyCheckError::Network(_) => {}
                        }
                    }
                }
            }
        }
        info!(?summary, "reply sweep finished");
        Ok(summary)
    }

    async fn thread_message_count(
        &self,
        access_token: &str,
        thread_id: &str,
    ) -> Result<usize, ReplyCheckError> {
        let url = format!(
            "{}/users/me/threads/{thread_id}",
            self.mail.api_base.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ReplyCheckError::Network(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ReplyCheckError::Auth(format!("HTTP {status}")));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ReplyCheckError::ThreadNotFound(thread_id.to_string()));
        }
        if !status.is_success() {
            let context = response.text().await.unwrap_or_default();
            return Err(ReplyCheckError::Provider(format!("HTTP {status}: {context}")));
        }
        let thread: ThreadResponse = response
            .json()
            .await
            .map_err(|e| ReplyCheckError::Network(e.to_string()))?;
        Ok(thread.messages.len())
    }
}

async fn set_status(
    db: &DatabaseConnection,
    log: delivery_log::Model,
    status: DeliveryStatus,
) -> Result<(), sea_orm::DbErr> {
    let mut active: delivery_log::ActiveModel = log.into();
    active.status = Set(status);
    active.updated_at = Set(OffsetDateTime::now_utc());
    active.update(db).await?;
    Ok(())
}
