//! Thin HTTP client for the generative-text backend.
//!
//! One API surface, many models: the model name is part of the URL and the
//! API key is a query parameter, so a single client serves the whole
//! fallback chain and every credential in the pool.

use crate::error::GenerationError;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

/// Optional resume material accompanying a prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Attachment {
    None,
    /// Base64 bytes embedded directly in the request.
    InlineData { mime_type: String, data: String },
    /// Opaque handle from the backend's file store, for oversized documents.
    FileRef { uri: String, mime_type: String },
}

/// An immutable generation payload. The fallback chain re-sends the exact
/// same request to each model, including any attachment.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub attachment: Attachment,
}

#[derive(Clone)]
pub struct GenerationClient {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct UploadedFile {
    uri: String,
}

impl GenerationClient {
    pub fn new(http: reqwest::Client, api_base: String) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// One generation call against one model. HTTP 429 maps to
    /// [`GenerationError::Throttled`] so the caller can advance the chain.
    #[tracing::instrument(skip(self, request), fields(prompt_len = request.prompt.len()))]
    pub async fn generate(
        &self,
        model: &str,
        api_key: &str,
        request: &GenerateRequest,
    ) -> Result<String, GenerationError> {
        let mut parts = vec![json!({ "text": request.prompt })];
        match &request.attachment {
            Attachment::None => {}
            Attachment::InlineData { mime_type, data } => {
                parts.push(json!({ "inline_data": { "mime_type": mime_type, "data": data } }));
            }
            Attachment::FileRef { uri, mime_type } => {
                parts.push(json!({ "file_data": { "file_uri": uri, "mime_type": mime_type } }));
            }
        }
        let body = json!({ "contents": [{ "parts": parts }] });

        let url = format!("{}/v1beta/models/{model}:generateContent", self.api_base);
        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::Throttled {
                model: model.to_string(),
            });
        }
        if !status.is_success() {
            let context = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http { status, context });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        let text: String = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }

    /// Upload a binary document to the backend's file store and return its
    /// opaque URI for use in a later generation request.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_file(
        &self,
        api_key: &str,
        bytes: Vec<u8>,
        display_name: &str,
        mime_type: &str,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/upload/v1beta/files", self.api_base);
        let response = self
            .http
            .post(&url)
            .query(&[("key", api_key), ("display_name", display_name)])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::Throttled {
                model: "file-upload".to_string(),
            });
        }
        if !status.is_success() {
            let context = response.text().await.unwrap_or_default();
            return Err(GenerationError::Http { status, context });
        }
        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(parsed.file.uri)
    }
}
