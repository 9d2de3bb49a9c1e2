//! Delivery log entity - the record of one actually-sent message and its
//! engagement state.
//!
//! Created at send time, never deleted. `open_count` is bumped by the
//! tracking-pixel endpoint; `status` moves to `replied` by the reply sweep.

use crate::status::DeliveryStatus;
use sea_orm::entity::prelude::*;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "delivery_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub campaign_id: i32,
    pub user_id: String,
    pub contact_id: i32,
    pub sent_at: OffsetDateTime,
    pub status: DeliveryStatus,
    pub open_count: i32,
    pub thread_id: Option<String>,
    #[sea_orm(unique)]
    pub tracking_id: String,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Rows created before thread-based reply tracking carry an opaque
    /// tracking id with no hyphen; those cannot be resolved to a thread.
    // TODO: replace the hyphen heuristic with an explicit schema version column.
    pub fn is_legacy_tracking_id(&self) -> bool {
        !self.tracking_id.contains('-')
    }
}
