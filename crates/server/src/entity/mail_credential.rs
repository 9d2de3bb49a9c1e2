//! Mail provider OAuth credential for one user.

use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

/// Safety margin before the nominal expiry at which the access token is
/// refreshed rather than used.
pub const EXPIRY_SAFETY_MARGIN: time::Duration = time::Duration::seconds(120);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "mail_credential")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub email_address: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when the access token is expired or within the safety margin of
    /// expiring, i.e. it must be refreshed before use.
    pub fn needs_refresh(&self, now: OffsetDateTime) -> bool {
        self.expires_at - EXPIRY_SAFETY_MARGIN <= now
    }
}
