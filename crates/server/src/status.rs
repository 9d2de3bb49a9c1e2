//! Status enums for campaigns, pending contact records and delivery logs,
//! with an explicit transition table.
//!
//! Statuses are stored as strings but only mutated through
//! [`CampaignStatus::transition`] / [`ContactStatus::transition`], which
//! reject transitions the pipeline never performs (e.g. `sent -> pending`).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal {entity} status transition: {from} -> {to}")]
pub struct IllegalTransition {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

/// What kind of outreach a campaign performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    #[sea_orm(string_value = "research")]
    Research,
    #[sea_orm(string_value = "internship")]
    Internship,
    #[sea_orm(string_value = "job")]
    Job,
    #[sea_orm(string_value = "custom")]
    Custom,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    #[sea_orm(string_value = "pending_processing")]
    PendingProcessing,
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl CampaignStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingProcessing => "pending_processing",
            Self::Queued => "queued",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::PendingProcessing, Self::Queued)
                | (Self::PendingProcessing, Self::Failed)
                | (Self::Queued, Self::Completed)
                | (Self::Queued, Self::Failed)
        )
    }

    pub fn transition(self, to: Self) -> Result<Self, IllegalTransition> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(IllegalTransition {
                entity: "campaign",
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl ContactStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Sent)
                | (Self::Processing, Self::Failed)
        )
    }

    pub fn transition(self, to: Self) -> Result<Self, IllegalTransition> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(IllegalTransition {
                entity: "contact",
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "sent")]
    Sent,
    #[sea_orm(string_value = "replied")]
    Replied,
    #[sea_orm(string_value = "bounced")]
    Bounced,
    #[sea_orm(string_value = "legacy")]
    Legacy,
    #[sea_orm(string_value = "error")]
    Error,
}
