//! Message dispatch through the mail provider's HTTP API.
//!
//! Builds the multipart/alternative MIME message (plain text plus an HTML
//! part carrying the invisible tracking pixel), refreshes the sender's
//! OAuth access token when it is about to expire, submits the raw message
//! and records the outcome in the delivery log.

use crate::config::MailConfig;
use crate::entity::{contact, delivery_log, mail_credential, profile};
use crate::error::{SendError, TokenError};
use crate::status::DeliveryStatus;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE as BASE64_URL;
use lettre::Message;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

/// Successful dispatch of one message.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
    pub thread_id: String,
    pub tracking_id: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
}

/// Refresh the access token if it is expired or inside the safety margin,
/// persisting the new token before returning. This runs synchronously in
/// the send path; a send never goes out on a token about to lapse.
#[tracing::instrument(skip_all, fields(user_id = %credential.user_id))]
pub async fn ensure_fresh_token(
    http: &reqwest::Client,
    mail: &MailConfig,
    db: &DatabaseConnection,
    credential: mail_credential::Model,
) -> Result<mail_credential::Model, TokenError> {
    let now = OffsetDateTime::now_utc();
    if !credential.needs_refresh(now) {
        return Ok(credential);
    }

    let response = http
        .post(&mail.token_url)
        .form(&[
            ("client_id", mail.client_id.as_str()),
            ("client_secret", mail.client_secret.as_str()),
            ("refresh_token", credential.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .map_err(|e| TokenError::Network(e.to_string()))?;
    if !response.status().is_success() {
        let context = response.text().await.unwrap_or_default();
        return Err(TokenError::RefreshRejected(context));
    }
    let refreshed: RefreshResponse = response
        .json()
        .await
        .map_err(|e| TokenError::Network(e.to_string()))?;

    let expires_at = now + time::Duration::seconds(refreshed.expires_in);
    let mut active: mail_credential::ActiveModel = credential.into();
    active.access_token = Set(refreshed.access_token);
    active.expires_at = Set(expires_at);
    let updated = active.update(db).await?;
    info!(user_id = %updated.user_id, "refreshed mail access token");
    Ok(updated)
}

pub struct Dispatcher {
    http: reqwest::Client,
    mail: MailConfig,
    tracking_base_url: String,
}

impl Dispatcher {
    pub fn new(http: reqwest::Client, mail: MailConfig, tracking_base_url: String) -> Self {
        Self {
            http,
            mail,
            tracking_base_url: tracking_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Send one generated email to one contact and persist the delivery log
    /// row linking the tracking id and thread id back to the record.
    #[tracing::instrument(skip_all, fields(contact_id = record.id, to = %record.email))]
    pub async fn send_campaign_email(
        &self,
        db: &DatabaseConnection,
        record: &contact::Model,
        profile: &profile::Model,
        subject: &str,
        body: &str,
    ) -> Result<SendOutcome, SendError> {
        let credential = mail_credential::Entity::find_by_id(profile.user_id.clone())
            .one(db)
            .await
            .map_err(TokenError::from)?
            .ok_or_else(|| TokenError::Missing(profile.user_id.clone()))?;
        let credential = ensure_fresh_token(&self.http, &self.mail, db, credential).await?;

        let tracking_id = Uuid::new_v4().to_string();
        let raw = self.build_mime(
            &profile.name,
            &credential.email_address,
            &record.name,
            &record.email,
            subject,
            body,
            &tracking_id,
        )?;

        let url = format!(
            "{}/users/me/messages/send",
            self.mail.api_base.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.access_token)
            .json(&serde_json::json!({ "raw": BASE64_URL.encode(&raw) }))
            .send()
            .await
            .map_err(|e| SendError::Network(e.to_string()))?;
        if !response.status().is_success() {
            let context = response.text().await.unwrap_or_default();
            return Err(SendError::Provider(context));
        }
        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| SendError::Network(e.to_string()))?;

        let now = OffsetDateTime::now_utc();
        delivery_log::ActiveModel {
            campaign_id: Set(record.campaign_id),
            user_id: Set(profile.user_id.clone()),
            contact_id: Set(record.id),
            sent_at: Set(now),
            status: Set(DeliveryStatus::Sent),
            open_count: Set(0),
            thread_id: Set(Some(sent.thread_id.clone())),
            tracking_id: Set(tracking_id.clone()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await?;

        info!(thread_id = %sent.thread_id, "message dispatched");
        Ok(SendOutcome {
            message_id: sent.id,
            thread_id: sent.thread_id,
            tracking_id,
        })
    }

    /// Render the raw MIME message: multipart/alternative with a text/plain
    /// part and an HTML part wrapping the body in preserved-whitespace
    /// formatting plus exactly one invisible tracking pixel.
    #[allow(clippy::too_many_arguments)]
    pub fn build_mime(
        &self,
        from_name: &str,
        from_email: &str,
        to_name: &str,
        to_email: &str,
        subject: &str,
        body: &str,
        tracking_id: &str,
    ) -> Result<Vec<u8>, SendError> {
        let from = Mailbox::new(
            Some(from_name.to_string()),
            from_email
                .parse()
                .map_err(|e| SendError::InvalidMessage(format!("from address: {e}")))?,
        );
        let to = Mailbox::new(
            Some(to_name.to_string()),
            to_email
                .parse()
                .map_err(|e| SendError::InvalidMessage(format!("to address: {e}")))?,
        );

        let html = format!(
            "<html><body><div style=\"white-space: pre-wrap; font-family: inherit;\">{}</div>\
             <img src=\"{}/track/{}.gif\" width=\"1\" height=\"1\" alt=\"\" \
             style=\"display:none;\"/></body></html>",
            escape_html(body),
            self.tracking_base_url,
            tracking_id,
        );

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(SinglePart::plain(body.to_string()))
                    .singlepart(SinglePart::html(html)),
            )
            .map_err(|e| SendError::InvalidMessage(e.to_string()))?;
        Ok(message.formatted())
    }
}

/// Increment the open counter for a tracking id. Returns false when the id
/// is unknown (stale pixel fetches are not an error).
pub async fn record_pixel_open(
    db: &DatabaseConnection,
    tracking_id: &str,
) -> Result<bool, sea_orm::DbErr> {
    let result = delivery_log::Entity::update_many()
        .col_expr(
            delivery_log::Column::OpenCount,
            Expr::col(delivery_log::Column::OpenCount).add(1),
        )
        .col_expr(
            delivery_log::Column::UpdatedAt,
            Expr::value(OffsetDateTime::now_utc()),
        )
        .filter(delivery_log::Column::TrackingId.eq(tracking_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
