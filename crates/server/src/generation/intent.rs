//! Typed view over a campaign's intent.
//!
//! The `interests` and `targets` columns mean different things per campaign
//! kind. `CampaignIntent` makes that explicit as a tagged variant, with one
//! prompt template and one subject template per variant instead of
//! string-keyed branching at runtime.

use crate::entity::{campaign, contact, profile};
use crate::error::PipelineError;
use crate::generation::resume::ResumeMaterial;
use crate::status::CampaignKind;

#[derive(Debug, Clone, PartialEq)]
pub enum CampaignIntent {
    Research {
        topics: Vec<String>,
        universities: Vec<String>,
    },
    Internship {
        roles: Vec<String>,
        companies: Vec<String>,
    },
    Job {
        roles: Vec<String>,
        companies: Vec<String>,
    },
    Custom {
        audience: Vec<String>,
        organizations: Vec<String>,
        purpose: String,
    },
}

impl CampaignIntent {
    pub fn from_campaign(model: &campaign::Model) -> Result<Self, PipelineError> {
        let interests = model.interest_list();
        let targets = model.target_list();
        match model.kind {
            CampaignKind::Research => Ok(Self::Research {
                topics: interests,
                universities: targets,
            }),
            CampaignKind::Internship => Ok(Self::Internship {
                roles: interests,
                companies: targets,
            }),
            CampaignKind::Job => Ok(Self::Job {
                roles: interests,
                companies: targets,
            }),
            CampaignKind::Custom => {
                let purpose = model
                    .custom_prompt
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        PipelineError::InvalidCampaign(
                            "custom campaigns require a non-empty custom_prompt".into(),
                        )
                    })?;
                Ok(Self::Custom {
                    audience: interests,
                    organizations: targets,
                    purpose: purpose.to_string(),
                })
            }
        }
    }

    /// Interest strings regardless of variant (topics, roles or audience).
    pub fn interests(&self) -> &[String] {
        match self {
            Self::Research { topics, .. } => topics,
            Self::Internship { roles, .. } | Self::Job { roles, .. } => roles,
            Self::Custom { audience, .. } => audience,
        }
    }

    /// Target strings regardless of variant (universities, companies or
    /// organizations).
    pub fn targets(&self) -> &[String] {
        match self {
            Self::Research { universities, .. } => universities,
            Self::Internship { companies, .. } | Self::Job { companies, .. } => companies,
            Self::Custom { organizations, .. } => organizations,
        }
    }

    /// Short phrase describing who this campaign reaches, used by the
    /// discovery fallback prompt.
    pub fn audience_description(&self) -> String {
        match self {
            Self::Research { topics, .. } => format!(
                "professors and researchers working on {}",
                join_or(topics, "their field")
            ),
            Self::Internship { roles, .. } => format!(
                "recruiters and hiring managers for {} internships",
                join_or(roles, "relevant")
            ),
            Self::Job { roles, .. } => format!(
                "recruiters and hiring managers for {} roles",
                join_or(roles, "relevant")
            ),
            Self::Custom { audience, .. } => join_or(audience, "relevant contacts"),
        }
    }

    /// Subject line for the outgoing email. Deterministic per variant; the
    /// generated body never carries its own subject.
    pub fn subject(&self, student_name: &str) -> String {
        match self {
            Self::Research { topics, .. } => format!(
                "Prospective research student interested in {}",
                join_or(topics, "your research")
            ),
            Self::Internship { roles, .. } => format!(
                "Internship inquiry from {student_name} ({})",
                join_or(roles, "multiple roles")
            ),
            Self::Job { roles, .. } => format!(
                "Application interest from {student_name}: {}",
                join_or(roles, "open roles")
            ),
            Self::Custom { .. } => format!("A note from {student_name}"),
        }
    }

    /// Build the full generation prompt for one contact.
    pub fn prompt(
        &self,
        contact: &contact::Model,
        profile: &profile::Model,
        resume: &ResumeMaterial,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(&self.intro(contact, profile));
        prompt.push_str("\n\n");
        prompt.push_str(&contact_block(contact));
        prompt.push_str("\n\n");
        prompt.push_str(&resume_block(resume));
        prompt.push_str("\n\n");
        prompt.push_str(OUTPUT_CONTRACT);
        if let Some(text) = resume.prompt_text() {
            prompt.push_str("\n\n----- RESUME (verbatim) -----\n");
            prompt.push_str(text);
        }
        prompt
    }

    fn intro(&self, contact: &contact::Model, profile: &profile::Model) -> String {
        match self {
            Self::Research { topics, .. } => format!(
                "Write a personalized cold email from the student {name} ({email}) to \
                 {recipient}, a researcher at {org}. The student wants to join their group \
                 or contribute to their research. The student's interests: {topics}. \
                 Connect those interests to the recipient's own work areas where they overlap.",
                name = profile.name,
                email = profile.email,
                recipient = contact.name,
                org = contact.organization,
                topics = join_or(topics, "not specified"),
            ),
            Self::Internship { roles, .. } => format!(
                "Write a personalized cold email from the student {name} ({email}) to \
                 {recipient} at {org} expressing interest in an internship as {roles}. \
                 Be specific about why this company and this team.",
                name = profile.name,
                email = profile.email,
                recipient = contact.name,
                org = contact.organization,
                roles = join_or(roles, "a relevant role"),
            ),
            Self::Job { roles, .. } => format!(
                "Write a personalized cold email from {name} ({email}) to {recipient} at \
                 {org} expressing interest in full-time {roles} positions. Emphasize fit \
                 and concrete qualifications.",
                name = profile.name,
                email = profile.email,
                recipient = contact.name,
                org = contact.organization,
                roles = join_or(roles, "relevant"),
            ),
            Self::Custom { purpose, .. } => format!(
                "Write a personalized cold email from {name} ({email}) to {recipient} at \
                 {org}. Purpose of the outreach, in the student's own words: {purpose}",
                name = profile.name,
                email = profile.email,
                recipient = contact.name,
                org = contact.organization,
            ),
        }
    }
}

/// Shared structural contract appended to every kind-specific prompt.
const OUTPUT_CONTRACT: &str = "Rules for the output:\n\
    - Output the email body only. Do not include a subject line.\n\
    - Never leave placeholders such as [Your Name] in the text; write the real values.\n\
    - If resume material is provided, reference at least one concrete item from it. \
      If none is provided, do not invent accomplishments.\n\
    - Keep the body under 180 words.\n\
    - Use only characters from the basic and extended Latin ranges. No emoji, \
      no smart quotes, no characters outside Latin-1.";

fn contact_block(contact: &contact::Model) -> String {
    let focus = contact.focus_area_list();
    let mut block = format!(
        "Recipient details:\n- Name: {}\n- Organization: {}",
        contact.name, contact.organization
    );
    if let Some(role) = &contact.role {
        block.push_str(&format!("\n- Role: {role}"));
    }
    if !focus.is_empty() {
        block.push_str(&format!("\n- Known focus areas: {}", focus.join(", ")));
    }
    block
}

fn resume_block(resume: &ResumeMaterial) -> &'static str {
    if resume.is_present() {
        "The student's resume accompanies this request. Ground the email in its actual content."
    } else {
        "No resume is available for this student."
    }
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}
