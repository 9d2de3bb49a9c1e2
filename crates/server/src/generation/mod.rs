//! Campaign-type-specific email generation with model fallback.
//!
//! The [`ContentGenerator`] builds the prompt for one contact, resolves any
//! resume material, runs the request through the ordered model chain (every
//! throttled call transparently advances to the next model with the exact
//! same payload) and post-processes placeholder tokens.

pub mod client;
pub mod intent;
pub mod resume;

use crate::config::{GenerationConfig, StorageConfig};
use crate::entity::{contact, profile};
use crate::error::GenerationError;
use crate::generation::client::{Attachment, GenerateRequest, GenerationClient};
use crate::generation::intent::CampaignIntent;
use crate::ratelimit::CredentialLimiter;
use tracing::warn;

pub struct ContentGenerator {
    client: GenerationClient,
    models: Vec<String>,
    storage: StorageConfig,
    inline_limit: usize,
}

impl ContentGenerator {
    pub fn new(http: reqwest::Client, generation: &GenerationConfig, storage: StorageConfig) -> Self {
        Self {
            client: GenerationClient::new(http, generation.api_base.clone()),
            models: generation.models.clone(),
            storage,
            inline_limit: generation.inline_attachment_limit,
        }
    }

    /// Produce `(subject, body)` for one contact.
    ///
    /// Non-throttling errors (and throttling with the chain exhausted) fail
    /// only this contact; the caller records them per-record.
    #[tracing::instrument(skip_all, fields(contact_id = contact.id, email = %contact.email))]
    pub async fn generate_email(
        &self,
        limiter: &CredentialLimiter,
        intent: &CampaignIntent,
        contact: &contact::Model,
        profile: &profile::Model,
    ) -> Result<(String, String), GenerationError> {
        let resume = resume::load_resume(
            &self.storage,
            &self.client,
            limiter.key(),
            profile,
            self.inline_limit,
        )
        .await?;
        let request = GenerateRequest {
            prompt: intent.prompt(contact, profile, &resume),
            attachment: resume.attachment(),
        };
        let raw = self.generate_with_fallback(limiter, &request).await?;
        let body = substitute_placeholders(raw.trim(), profile);
        Ok((intent.subject(&profile.name), body))
    }

    /// Plain text generation without attachments (discovery fallback).
    pub async fn generate_text(
        &self,
        limiter: &CredentialLimiter,
        prompt: String,
    ) -> Result<String, GenerationError> {
        let request = GenerateRequest {
            prompt,
            attachment: Attachment::None,
        };
        self.generate_with_fallback(limiter, &request).await
    }

    /// Iterate the ordered model chain with one immutable payload. A
    /// throttled model hands the identical request to the next one; the last
    /// model's throttling error propagates unchanged.
    pub async fn generate_with_fallback(
        &self,
        limiter: &CredentialLimiter,
        request: &GenerateRequest,
    ) -> Result<String, GenerationError> {
        let Some((last, earlier)) = self.models.split_last() else {
            return Err(GenerationError::NoModels);
        };
        for model in earlier {
            let _permit = limiter.acquire().await;
            match self.client.generate(model, limiter.key(), request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_throttled() => {
                    warn!(model = %model, "model throttled, advancing fallback chain");
                }
                Err(e) => return Err(e),
            }
        }
        let _permit = limiter.acquire().await;
        self.client.generate(last, limiter.key(), request).await
    }
}

/// Deterministically fill placeholder tokens that survived generation. The
/// prompt asks the backend to write real values; this is the safety net
/// guaranteeing no literal placeholder reaches a recipient.
pub fn substitute_placeholders(body: &str, profile: &profile::Model) -> String {
    let phone = profile.phone.as_deref().unwrap_or("");
    let mut out = body.to_string();
    for token in ["[Your Name]", "[Your Full Name]", "[Name]", "[STUDENT_NAME]"] {
        out = out.replace(token, &profile.name);
    }
    for token in ["[Your Email]", "[Email]", "[STUDENT_EMAIL]"] {
        out = out.replace(token, &profile.email);
    }
    for token in ["[Your Phone]", "[Your Phone Number]", "[Phone]", "[STUDENT_PHONE]"] {
        out = out.replace(token, phone);
    }
    out
}
