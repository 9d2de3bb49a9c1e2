use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Initial pipeline schema: campaigns, pending contact records, delivery
/// logs, mail credentials and student profiles.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Campaign::Table)
                    .if_not_exists()
                    .col(pk_auto(Campaign::Id))
                    .col(string(Campaign::OwnerId))
                    .col(string(Campaign::Kind))
                    .col(json(Campaign::Interests))
                    .col(json(Campaign::Targets))
                    .col(string_null(Campaign::CustomPrompt))
                    .col(integer(Campaign::MaxContacts))
                    .col(
                        ColumnDef::new(Campaign::Status)
                            .string()
                            .not_null()
                            .comment("pending_processing | queued | completed | failed"),
                    )
                    .col(string_null(Campaign::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(Campaign::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Campaign::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_campaign_owner_id")
                    .table(Campaign::Table)
                    .col(Campaign::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Contact::Table)
                    .if_not_exists()
                    .col(pk_auto(Contact::Id))
                    .col(integer(Contact::CampaignId))
                    .col(string(Contact::Name))
                    .col(string(Contact::Email))
                    .col(string(Contact::Organization))
                    .col(string_null(Contact::Role))
                    .col(json(Contact::FocusAreas))
                    .col(
                        ColumnDef::new(Contact::Status)
                            .string()
                            .not_null()
                            .comment("pending | processing | sent | failed"),
                    )
                    .col(string_null(Contact::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(Contact::CreatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(timestamp_with_time_zone_null(Contact::SentAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_contact_campaign")
                            .from(Contact::Table, Contact::CampaignId)
                            .to(Campaign::Table, Campaign::Id),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_contact_campaign_id")
                    .table(Contact::Table)
                    .col(Contact::CampaignId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_contact_status")
                    .table(Contact::Table)
                    .col(Contact::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeliveryLog::Table)
                    .if_not_exists()
                    .col(pk_auto(DeliveryLog::Id))
                    .col(integer(DeliveryLog::CampaignId))
                    .col(string(DeliveryLog::UserId))
                    .col(integer(DeliveryLog::ContactId))
                    .col(
                        timestamp_with_time_zone(DeliveryLog::SentAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DeliveryLog::Status)
                            .string()
                            .not_null()
                            .comment("sent | replied | bounced | legacy | error"),
                    )
                    .col(integer(DeliveryLog::OpenCount).default(0))
                    .col(string_null(DeliveryLog::ThreadId))
                    .col(
                        ColumnDef::new(DeliveryLog::TrackingId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        timestamp_with_time_zone(DeliveryLog::UpdatedAt)
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_log_user_id")
                    .table(DeliveryLog::Table)
                    .col(DeliveryLog::UserId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_log_status")
                    .table(DeliveryLog::Table)
                    .col(DeliveryLog::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MailCredential::Table)
                    .if_not_exists()
                    .col(string(MailCredential::UserId).primary_key())
                    .col(string(MailCredential::EmailAddress))
                    .col(string(MailCredential::AccessToken))
                    .col(string(MailCredential::RefreshToken))
                    .col(timestamp_with_time_zone(MailCredential::ExpiresAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Profile::Table)
                    .if_not_exists()
                    .col(string(Profile::UserId).primary_key())
                    .col(string(Profile::Name))
                    .col(string(Profile::Email))
                    .col(string_null(Profile::Phone))
                    .col(string_null(Profile::ResumePath))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Profile::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MailCredential::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeliveryLog::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Contact::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Campaign::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Campaign {
    Table,
    Id,
    OwnerId,
    Kind,
    Interests,
    Targets,
    CustomPrompt,
    MaxContacts,
    Status,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Contact {
    Table,
    Id,
    CampaignId,
    Name,
    Email,
    Organization,
    Role,
    FocusAreas,
    Status,
    ErrorMessage,
    CreatedAt,
    SentAt,
}

#[derive(Iden)]
pub enum DeliveryLog {
    Table,
    Id,
    CampaignId,
    UserId,
    ContactId,
    SentAt,
    Status,
    OpenCount,
    ThreadId,
    TrackingId,
    UpdatedAt,
}

#[derive(Iden)]
pub enum MailCredential {
    Table,
    UserId,
    EmailAddress,
    AccessToken,
    RefreshToken,
    ExpiresAt,
}

#[derive(Iden)]
pub enum Profile {
    Table,
    UserId,
    Name,
    Email,
    Phone,
    ResumePath,
}
