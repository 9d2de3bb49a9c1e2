use sea_orm_migration::prelude::*;

use crate::m20250601_000001_create_pipeline_tables::Contact;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Enforce at most one pending contact record per (campaign, email) at the
/// storage level. The in-memory dedup filter already prevents duplicates on
/// the normal path; this index closes the race if discovery ever runs twice
/// concurrently for the same campaign.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("uq_contact_campaign_email")
                    .table(Contact::Table)
                    .col(Contact::CampaignId)
                    .col(Contact::Email)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("uq_contact_campaign_email")
                    .table(Contact::Table)
                    .to_owned(),
            )
            .await
    }
}
