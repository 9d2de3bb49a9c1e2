//! Contact discovery: structured directory search with a generative
//! fallback.
//!
//! The primary path queries the scholarly-works directory, resolving target
//! names to institution ids first, then pulling works filtered by those ids
//! and the campaign's interest keywords. The fallback issues one generative
//! request for a strict JSON array of candidates; its output crosses an
//! explicit parsing boundary ([`extract_json_array`]) and is never trusted
//! to honor the format contract. Neither path ever fabricates an email:
//! candidates without one are dropped.

pub mod dedup;

use crate::config::DirectoryConfig;
use crate::error::DiscoveryError;
use crate::generation::ContentGenerator;
use crate::generation::intent::CampaignIntent;
use crate::ratelimit::CredentialLimiter;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// One discovered contact candidate, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "focusAreas")]
    pub focus_areas: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no top-level JSON array in generated text")]
    NoArray,
    #[error("invalid JSON array: {0}")]
    Invalid(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct InstitutionPage {
    #[serde(default)]
    results: Vec<Institution>,
}

#[derive(Deserialize)]
struct Institution {
    id: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Deserialize)]
struct WorksPage {
    #[serde(default)]
    results: Vec<Work>,
}

#[derive(Deserialize)]
struct Work {
    #[serde(default)]
    authorships: Vec<Authorship>,
    #[serde(default)]
    concepts: Vec<Concept>,
}

#[derive(Deserialize)]
struct Authorship {
    author: Author,
    #[serde(default)]
    institutions: Vec<Institution>,
}

#[derive(Deserialize)]
struct Author {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct Concept {
    #[serde(default)]
    display_name: String,
}

pub struct ContactSource {
    http: reqwest::Client,
    directory: DirectoryConfig,
    generator: Arc<ContentGenerator>,
}

impl ContactSource {
    pub fn new(
        http: reqwest::Client,
        directory: DirectoryConfig,
        generator: Arc<ContentGenerator>,
    ) -> Self {
        Self {
            http,
            directory,
            generator,
        }
    }

    /// Produce up to `desired` unique-email candidates for a campaign.
    ///
    /// The fallback runs when the primary path yields nothing or errors;
    /// both paths coming up empty is a hard campaign failure.
    #[tracing::instrument(skip_all, fields(desired))]
    pub async fn discover(
        &self,
        limiter: &CredentialLimiter,
        intent: &CampaignIntent,
        desired: usize,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        let primary = match self.directory_search(intent, desired).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "directory search failed, falling back to generative search");
                Vec::new()
            }
        };
        if !primary.is_empty() {
            info!(count = primary.len(), "directory search produced candidates");
            return Ok(primary);
        }

        let fallback = self.generative_search(limiter, intent, desired).await?;
        if fallback.is_empty() {
            return Err(DiscoveryError::NoContacts);
        }
        info!(count = fallback.len(), "generative fallback produced candidates");
        Ok(fallback)
    }

    async fn resolve_institution(&self, name: &str) -> Result<Option<String>, DiscoveryError> {
        let url = format!(
            "{}/institutions",
            self.directory.api_base.trim_end_matches('/')
        );
        let mut query = vec![("search", name.to_string()), ("per-page", "1".to_string())];
        if let Some(mailto) = &self.directory.mailto {
            query.push(("mailto", mailto.clone()));
        }
        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| DiscoveryError::Directory(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Directory(format!(
                "institution search returned HTTP {}",
                response.status()
            )));
        }
        let page: InstitutionPage = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Directory(e.to_string()))?;
        Ok(page.results.into_iter().next().map(|i| i.id))
    }

    async fn directory_search(
        &self,
        intent: &CampaignIntent,
        desired: usize,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        let mut institution_ids = Vec::new();
        for target in intent.targets() {
            // A target that cannot be resolved is skipped, not fatal.
            match self.resolve_institution(target).await {
                Ok(Some(id)) => institution_ids.push(id),
                Ok(None) => warn!(target = %target, "target did not resolve to an institution"),
                Err(e) => warn!(target = %target, error = %e, "institution resolution failed"),
            }
        }
        if institution_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/works", self.directory.api_base.trim_end_matches('/'));
        let per_page = (desired * 5).clamp(desired, 200);
        let mut query = vec![
            (
                "filter",
                format!("institutions.id:{}", institution_ids.join("|")),
            ),
            ("search", intent.interests().join(" ")),
            ("per-page", per_page.to_string()),
        ];
        if let Some(mailto) = &self.directory.mailto {
            query.push(("mailto", mailto.clone()));
        }
        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| DiscoveryError::Directory(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Directory(format!(
                "works search returned HTTP {}",
                response.status()
            )));
        }
        let page: WorksPage = response
            .json()
            .await
            .map_err(|e| DiscoveryError::Directory(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        'works: for work in page.results {
            let focus_areas: Vec<String> = work
                .concepts
                .iter()
                .map(|c| c.display_name.clone())
                .filter(|n| !n.is_empty())
                .take(3)
                .collect();
            for authorship in work.authorships {
                let Some(email) = authorship
                    .author
                    .email
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                else {
                    continue;
                };
                if !seen.insert(email.to_lowercase()) {
                    continue;
                }
                candidates.push(Candidate {
                    name: authorship.author.display_name.clone(),
                    email: Some(email.to_string()),
                    organization: authorship
                        .institutions
                        .first()
                        .map(|i| i.display_name.clone())
                        .unwrap_or_default(),
                    role: None,
                    focus_areas: focus_areas.clone(),
                });
                if candidates.len() >= desired {
                    break 'works;
                }
            }
        }
        Ok(candidates)
    }

    async fn generative_search(
        &self,
        limiter: &CredentialLimiter,
        intent: &CampaignIntent,
        desired: usize,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        let prompt = fallback_prompt(intent, desired);
        let text = self.generator.generate_text(limiter, prompt).await?;

        // Parse failure is indistinguishable from "no contacts found" for
        // the caller.
        let parsed = match extract_json_array(&text) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "fallback output was not a parseable candidate array");
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for candidate in parsed {
            let Some(email) = candidate
                .email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
            else {
                // The prompt forbids guessing emails; a candidate without
                // one is unusable.
                continue;
            };
            if !seen.insert(email.to_lowercase()) {
                continue;
            }
            candidates.push(candidate);
            if candidates.len() >= desired {
                break;
            }
        }
        Ok(candidates)
    }
}

fn fallback_prompt(intent: &CampaignIntent, desired: usize) -> String {
    format!(
        "List exactly {desired} real, currently active {audience}. \
         Respond with ONLY a JSON array, no prose, no code fences. Each element must be an \
         object with keys: \"name\", \"email\", \"organization\", \"role\", \
         \"focus_areas\" (array of strings). \
         Only include a contact if you know their real, published email address; \
         never guess or fabricate an email. If you are not certain of an email, \
         omit that contact entirely. Target organizations: {targets}.",
        audience = intent.audience_description(),
        targets = if intent.targets().is_empty() {
            "any".to_string()
        } else {
            intent.targets().join(", ")
        },
    )
}

/// Extract and parse the first top-level `[...]` substring.
///
/// Generative output may wrap the array in prose or code fences despite
/// instructions, so the format contract is never trusted directly. The scan
/// is string-aware: brackets inside JSON strings do not count.
pub fn extract_json_array(text: &str) -> Result<Vec<Candidate>, ParseError> {
    let bytes = text.as_bytes();
    let start = text.find('[').ok_or(ParseError::NoArray)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    let slice = &text[start..start + offset + 1];
                    return Ok(serde_json::from_str(slice)?);
                }
            }
            _ => {}
        }
    }
    Err(ParseError::NoArray)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_array() {
        let text = r#"[{"name":"A","email":"a@x.edu"}]"#;
        let parsed = extract_json_array(text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].email.as_deref(), Some("a@x.edu"));
    }

    #[test]
    fn extracts_array_wrapped_in_prose() {
        let text = "Sure! Here are the contacts:\n```json\n[{\"name\":\"A\",\"email\":\"a@x.edu\"},{\"name\":\"B\"}]\n```\nLet me know if you need more.";
        let parsed = extract_json_array(text).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].email, None);
    }

    #[test]
    fn brackets_inside_strings_do_not_terminate() {
        let text = r#"[{"name":"A [PI]","email":"a@x.edu","focus_areas":["robotics"]}]"#;
        let parsed = extract_json_array(text).unwrap();
        assert_eq!(parsed[0].name, "A [PI]");
        assert_eq!(parsed[0].focus_areas, vec!["robotics".to_string()]);
    }

    #[test]
    fn missing_array_is_an_error() {
        assert!(matches!(
            extract_json_array("no array here"),
            Err(ParseError::NoArray)
        ));
    }

    #[test]
    fn malformed_array_is_an_error() {
        assert!(matches!(
            extract_json_array(r#"[{"name": unquoted}]"#),
            Err(ParseError::Invalid(_))
        ));
    }

    #[test]
    fn accepts_camel_case_focus_areas() {
        let text = r#"[{"name":"A","email":"a@x.edu","focusAreas":["ml"]}]"#;
        let parsed = extract_json_array(text).unwrap();
        assert_eq!(parsed[0].focus_areas, vec!["ml".to_string()]);
    }
}
