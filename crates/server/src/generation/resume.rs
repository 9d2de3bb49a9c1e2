//! Resume material resolution for attachment-aware prompting.
//!
//! A stored resume path is resolved to a signed URL, fetched, and routed by
//! content type: plain UTF-8 text rides along as inline base64 data, other
//! text is concatenated into the prompt itself, and binary documents (PDFs)
//! are embedded inline up to a size ceiling, beyond which they go through
//! the backend's file store and are referenced by handle.

use crate::config::StorageConfig;
use crate::entity::profile;
use crate::error::GenerationError;
use crate::generation::client::{Attachment, GenerationClient};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeMaterial {
    None,
    /// Text concatenated into the prompt body.
    PromptText(String),
    /// Base64 payload embedded in the generation request.
    Inline { mime_type: String, data: String },
    /// Opaque file-store handle for documents over the inline ceiling.
    Uploaded { uri: String, mime_type: String },
}

impl ResumeMaterial {
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn prompt_text(&self) -> Option<&str> {
        match self {
            Self::PromptText(text) => Some(text),
            _ => None,
        }
    }

    pub fn attachment(&self) -> Attachment {
        match self {
            Self::None | Self::PromptText(_) => Attachment::None,
            Self::Inline { mime_type, data } => Attachment::InlineData {
                mime_type: mime_type.clone(),
                data: data.clone(),
            },
            Self::Uploaded { uri, mime_type } => Attachment::FileRef {
                uri: uri.clone(),
                mime_type: mime_type.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct ResolveResponse {
    url: String,
}

/// Fetch and classify the student's resume, if any.
#[tracing::instrument(skip_all, fields(user_id = %profile.user_id))]
pub async fn load_resume(
    storage: &StorageConfig,
    client: &GenerationClient,
    api_key: &str,
    profile: &profile::Model,
    inline_limit: usize,
) -> Result<ResumeMaterial, GenerationError> {
    let Some(path) = profile.resume_path.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(ResumeMaterial::None);
    };
    let http = client.http();

    // Stored paths need a signed, time-limited URL first; absolute URLs are
    // already fetchable.
    let url = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        let resolve_url = format!("{}/resolve", storage.api_base.trim_end_matches('/'));
        let response = http
            .get(&resolve_url)
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| GenerationError::Attachment(format!("resolve failed: {e}")))?;
        if !response.status().is_success() {
            return Err(GenerationError::Attachment(format!(
                "resolve returned HTTP {}",
                response.status()
            )));
        }
        let resolved: ResolveResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Attachment(format!("resolve body: {e}")))?;
        resolved.url
    };

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|e| GenerationError::Attachment(format!("fetch failed: {e}")))?;
    if !response.status().is_success() {
        return Err(GenerationError::Attachment(format!(
            "fetch returned HTTP {}",
            response.status()
        )));
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| GenerationError::Attachment(format!("fetch body: {e}")))?;

    if content_type.starts_with("text/plain") {
        return Ok(ResumeMaterial::Inline {
            mime_type: "text/plain".to_string(),
            data: BASE64.encode(&bytes),
        });
    }
    if content_type.starts_with("text/") {
        return Ok(ResumeMaterial::PromptText(
            String::from_utf8_lossy(&bytes).into_owned(),
        ));
    }

    // Anything else is treated as a PDF document.
    if bytes.len() <= inline_limit {
        Ok(ResumeMaterial::Inline {
            mime_type: "application/pdf".to_string(),
            data: BASE64.encode(&bytes),
        })
    } else {
        let uri = client
            .upload_file(api_key, bytes.to_vec(), "resume.pdf", "application/pdf")
            .await?;
        Ok(ResumeMaterial::Uploaded {
            uri,
            mime_type: "application/pdf".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_material_yields_no_attachment() {
        assert_eq!(ResumeMaterial::None.attachment(), Attachment::None);
        assert!(!ResumeMaterial::None.is_present());
    }

    #[test]
    fn prompt_text_stays_out_of_the_attachment() {
        let material = ResumeMaterial::PromptText("markdown resume".into());
        assert_eq!(material.attachment(), Attachment::None);
        assert_eq!(material.prompt_text(), Some("markdown resume"));
        assert!(material.is_present());
    }

    #[test]
    fn inline_material_maps_to_inline_data() {
        let material = ResumeMaterial::Inline {
            mime_type: "application/pdf".into(),
            data: "aGk=".into(),
        };
        assert_eq!(
            material.attachment(),
            Attachment::InlineData {
                mime_type: "application/pdf".into(),
                data: "aGk=".into(),
            }
        );
    }
}
