//! Campaign entity - one bounded outreach request.
//!
//! The `interests` and `targets` columns hold JSON string arrays whose
//! semantics depend on `kind`; [`crate::generation::intent::CampaignIntent`]
//! is the typed view over them.

use crate::status::{CampaignKind, CampaignStatus};
use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "campaign")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub owner_id: String,
    pub kind: CampaignKind,
    pub interests: Json,
    pub targets: Json,
    pub custom_prompt: Option<String>,
    pub max_contacts: i32,
    pub status: CampaignStatus,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::contact::Entity")]
    Contact,
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `interests` as a plain string list; non-string elements are ignored.
    pub fn interest_list(&self) -> Vec<String> {
        json_string_list(&self.interests)
    }

    /// `targets` as a plain string list; non-string elements are ignored.
    pub fn target_list(&self) -> Vec<String> {
        json_string_list(&self.targets)
    }
}

fn json_string_list(value: &Json) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
