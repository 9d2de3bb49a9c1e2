//! End-to-end pipeline tests: campaign lifecycle, discovery + dedup,
//! claim semantics, batch sending and finalization, against an in-memory
//! database and one mocked upstream serving the directory, generation and
//! mail APIs.

use migration::MigratorTrait;
use outreach_pipeline::AppResources;
use outreach_pipeline::config::{
    AppConfig, DirectoryConfig, GenerationConfig, MailConfig, PipelineConfig, StorageConfig,
};
use outreach_pipeline::entity::{campaign, contact, delivery_log, mail_credential, profile};
use outreach_pipeline::error::PipelineError;
use outreach_pipeline::pipeline::{NewCampaign, Pipeline, claim_contact};
use outreach_pipeline::status::{CampaignKind, CampaignStatus, ContactStatus};
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base: &str) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        tracking_base_url: "https://outreach.example.com".to_string(),
        generation: GenerationConfig {
            api_base: base.to_string(),
            api_keys: vec!["key-a".to_string()],
            models: vec!["model-flash".to_string()],
            requests_per_minute: 1000,
            max_in_flight: 4,
            inline_attachment_limit: 15 * 1024 * 1024,
        },
        directory: DirectoryConfig {
            api_base: base.to_string(),
            mailto: None,
        },
        mail: MailConfig {
            api_base: base.to_string(),
            token_url: format!("{base}/token"),
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
        },
        storage: StorageConfig {
            api_base: base.to_string(),
        },
        pipeline: PipelineConfig::default(),
    }
}

async fn setup(server: &MockServer) -> (Arc<AppResources>, Pipeline) {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    migration::Migrator::up(&db, None).await.expect("migrate");
    let resources = Arc::new(AppResources {
        db: Arc::new(db),
        http: reqwest::Client::new(),
        config: Arc::new(test_config(&server.uri())),
    });
    let pipeline = Pipeline::new(resources.clone());
    (resources, pipeline)
}

async fn insert_profile_and_credential(db: &DatabaseConnection, user_id: &str) {
    profile::ActiveModel {
        user_id: Set(user_id.to_string()),
        name: Set("Jordan Doe".to_string()),
        email: Set("jordan@student.edu".to_string()),
        phone: Set(None),
        resume_path: Set(None),
    }
    .insert(db)
    .await
    .expect("insert profile");
    mail_credential::ActiveModel {
        user_id: Set(user_id.to_string()),
        email_address: Set("jordan@student.edu".to_string()),
        access_token: Set("valid-token".to_string()),
        refresh_token: Set("refresh-token".to_string()),
        expires_at: Set(OffsetDateTime::now_utc() + Duration::hours(1)),
    }
    .insert(db)
    .await
    .expect("insert credential");
}

async fn insert_queued_campaign(db: &DatabaseConnection, owner_id: &str) -> campaign::Model {
    campaign::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        kind: Set(CampaignKind::Research),
        interests: Set(json!(["robotics"])),
        targets: Set(json!(["Test University"])),
        custom_prompt: Set(None),
        max_contacts: Set(10),
        status: Set(CampaignStatus::Queued),
        error_message: Set(None),
        created_at: Set(OffsetDateTime::now_utc()),
        updated_at: Set(OffsetDateTime::now_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert campaign")
}

async fn insert_pending_contact(
    db: &DatabaseConnection,
    campaign_id: i32,
    email: &str,
) -> contact::Model {
    contact::ActiveModel {
        campaign_id: Set(campaign_id),
        name: Set(format!("Contact {email}")),
        email: Set(email.to_string()),
        organization: Set("Test University".to_string()),
        role: Set(Some("Professor".to_string())),
        focus_areas: Set(json!(["robotics"])),
        status: Set(ContactStatus::Pending),
        error_message: Set(None),
        created_at: Set(OffsetDateTime::now_utc()),
        sent_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert contact")
}

async fn mount_generation(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1beta/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{
                "text": "Dear Professor,\n\nI would love to join your group.\n\nBest,\nJordan Doe"
            }] } }]
        })))
        .mount(server)
        .await;
}

async fn mount_send(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/users/me/messages/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg-1",
            "threadId": "thread-1"
        })))
        .mount(server)
        .await;
}

async fn mount_directory(server: &MockServer, emails: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/institutions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "id": "I999", "display_name": "Test University" }]
        })))
        .mount(server)
        .await;
    let authorships: Vec<_> = emails
        .iter()
        .map(|email| {
            json!({
                "author": { "display_name": format!("Contact {email}"), "email": email },
                "institutions": [{ "id": "I999", "display_name": "Test University" }]
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "authorships": authorships, "concepts": [] }]
        })))
        .mount(server)
        .await;
}

// =============================================================================
// Campaign creation
// =============================================================================

#[tokio::test]
async fn created_campaign_starts_pending_processing() {
    let server = MockServer::start().await;
    let (_resources, pipeline) = setup(&server).await;
    let created = pipeline
        .create_campaign(NewCampaign {
            owner_id: "user-1".to_string(),
            kind: CampaignKind::Research,
            interests: vec!["robotics".to_string()],
            targets: vec!["Test University".to_string()],
            custom_prompt: None,
            max_contacts: 5,
        })
        .await
        .expect("create campaign");
    assert_eq!(created.status, CampaignStatus::PendingProcessing);
    assert_eq!(created.interest_list(), vec!["robotics".to_string()]);
}

#[tokio::test]
async fn custom_campaign_requires_a_prompt_and_others_forbid_it() {
    let server = MockServer::start().await;
    let (_resources, pipeline) = setup(&server).await;

    let missing = pipeline
        .create_campaign(NewCampaign {
            owner_id: "user-1".to_string(),
            kind: CampaignKind::Custom,
            interests: vec![],
            targets: vec![],
            custom_prompt: Some("   ".to_string()),
            max_contacts: 5,
        })
        .await
        .unwrap_err();
    assert!(matches!(missing, PipelineError::InvalidCampaign(_)));

    let stray = pipeline
        .create_campaign(NewCampaign {
            owner_id: "user-1".to_string(),
            kind: CampaignKind::Job,
            interests: vec![],
            targets: vec![],
            custom_prompt: Some("say hello".to_string()),
            max_contacts: 5,
        })
        .await
        .unwrap_err();
    assert!(matches!(stray, PipelineError::InvalidCampaign(_)));

    let zero = pipeline
        .create_campaign(NewCampaign {
            owner_id: "user-1".to_string(),
            kind: CampaignKind::Research,
            interests: vec![],
            targets: vec![],
            custom_prompt: None,
            max_contacts: 0,
        })
        .await
        .unwrap_err();
    assert!(matches!(zero, PipelineError::InvalidCampaign(_)));
}

// =============================================================================
// Discovery and enqueue
// =============================================================================

#[tokio::test]
async fn discovery_enqueues_contacts_and_queues_the_campaign() {
    let server = MockServer::start().await;
    mount_directory(&server, &["a@test.edu", "b@test.edu"]).await;
    let (resources, pipeline) = setup(&server).await;

    let created = pipeline
        .create_campaign(NewCampaign {
            owner_id: "user-1".to_string(),
            kind: CampaignKind::Research,
            interests: vec!["robotics".to_string()],
            targets: vec!["Test University".to_string()],
            custom_prompt: None,
            max_contacts: 5,
        })
        .await
        .expect("create campaign");

    let enqueued = pipeline
        .run_discovery_and_enqueue(created.id)
        .await
        .expect("discovery");
    assert_eq!(enqueued, 2);

    let db = resources.db.as_ref();
    let reloaded = campaign::Entity::find_by_id(created.id)
        .one(db)
        .await
        .expect("query")
        .expect("campaign exists");
    assert_eq!(reloaded.status, CampaignStatus::Queued);

    let contacts = contact::Entity::find()
        .filter(contact::Column::CampaignId.eq(created.id))
        .all(db)
        .await
        .expect("query");
    assert_eq!(contacts.len(), 2);
    assert!(contacts.iter().all(|c| c.status == ContactStatus::Pending));
}

#[tokio::test]
async fn discovery_skips_contacts_from_the_owners_earlier_campaigns() {
    let server = MockServer::start().await;
    mount_directory(&server, &["a@test.edu", "b@test.edu"]).await;
    let (resources, pipeline) = setup(&server).await;
    let db = resources.db.as_ref();

    // The owner already reached a@test.edu in an earlier campaign.
    let earlier = insert_queued_campaign(db, "user-1").await;
    insert_pending_contact(db, earlier.id, "a@test.edu").await;

    let created = pipeline
        .create_campaign(NewCampaign {
            owner_id: "user-1".to_string(),
            kind: CampaignKind::Research,
            interests: vec!["robotics".to_string()],
            targets: vec!["Test University".to_string()],
            custom_prompt: None,
            max_contacts: 5,
        })
        .await
        .expect("create campaign");
    let enqueued = pipeline
        .run_discovery_and_enqueue(created.id)
        .await
        .expect("discovery");
    assert_eq!(enqueued, 1);

    let contacts = contact::Entity::find()
        .filter(contact::Column::CampaignId.eq(created.id))
        .all(db)
        .await
        .expect("query");
    assert_eq!(contacts[0].email, "b@test.edu");
}

#[tokio::test]
async fn discovery_with_no_contacts_fails_the_campaign() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/institutions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1beta/models/.*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "[]" }] } }]
        })))
        .mount(&server)
        .await;
    let (resources, pipeline) = setup(&server).await;

    let created = pipeline
        .create_campaign(NewCampaign {
            owner_id: "user-1".to_string(),
            kind: CampaignKind::Research,
            interests: vec!["robotics".to_string()],
            targets: vec!["Test University".to_string()],
            custom_prompt: None,
            max_contacts: 5,
        })
        .await
        .expect("create campaign");
    let err = pipeline.run_discovery_and_enqueue(created.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Discovery(_)));

    let reloaded = campaign::Entity::find_by_id(created.id)
        .one(resources.db.as_ref())
        .await
        .expect("query")
        .expect("campaign exists");
    assert_eq!(reloaded.status, CampaignStatus::Failed);
    assert_eq!(
        reloaded.error_message.as_deref(),
        Some("no professors/contacts found for this campaign")
    );
}

#[tokio::test]
async fn discovery_requires_a_pending_processing_campaign() {
    let server = MockServer::start().await;
    let (resources, pipeline) = setup(&server).await;
    let queued = insert_queued_campaign(resources.db.as_ref(), "user-1").await;

    let err = pipeline.run_discovery_and_enqueue(queued.id).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidCampaign(_)));
    let err = pipeline.run_discovery_and_enqueue(9999).await.unwrap_err();
    assert!(matches!(err, PipelineError::CampaignNotFound(9999)));
}

// =============================================================================
// Claim semantics
// =============================================================================

#[tokio::test]
async fn a_record_can_only_be_claimed_once() {
    let server = MockServer::start().await;
    let (resources, _pipeline) = setup(&server).await;
    let db = resources.db.as_ref();
    let campaign = insert_queued_campaign(db, "user-1").await;
    let record = insert_pending_contact(db, campaign.id, "a@test.edu").await;

    assert!(claim_contact(db, record.id).await.expect("first claim"));
    assert!(!claim_contact(db, record.id).await.expect("second claim"));

    let reloaded = contact::Entity::find_by_id(record.id)
        .one(db)
        .await
        .expect("query")
        .expect("record exists");
    assert_eq!(reloaded.status, ContactStatus::Processing);
}

// =============================================================================
// Batch sending and finalization
// =============================================================================

#[tokio::test]
async fn send_batch_resolves_every_record_and_completes_the_campaign() {
    let server = MockServer::start().await;
    mount_generation(&server).await;
    mount_send(&server).await;
    let (resources, pipeline) = setup(&server).await;
    let db = resources.db.as_ref();

    insert_profile_and_credential(db, "user-1").await;
    let campaign_row = insert_queued_campaign(db, "user-1").await;
    insert_pending_contact(db, campaign_row.id, "a@test.edu").await;
    insert_pending_contact(db, campaign_row.id, "b@test.edu").await;

    let summary = pipeline.run_send_batch(10, None).await.expect("send batch");
    assert_eq!(summary.claimed, 2);
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.campaigns_completed, 1);

    let contacts = contact::Entity::find()
        .filter(contact::Column::CampaignId.eq(campaign_row.id))
        .all(db)
        .await
        .expect("query");
    assert!(contacts.iter().all(|c| c.status == ContactStatus::Sent));
    assert!(contacts.iter().all(|c| c.sent_at.is_some()));

    let logs = delivery_log::Entity::find().all(db).await.expect("query");
    assert_eq!(logs.len(), 2);

    let reloaded = campaign::Entity::find_by_id(campaign_row.id)
        .one(db)
        .await
        .expect("query")
        .expect("campaign exists");
    assert_eq!(reloaded.status, CampaignStatus::Completed);
}

#[tokio::test]
async fn a_rejected_recipient_fails_only_its_record() {
    let server = MockServer::start().await;
    mount_generation(&server).await;
    Mock::given(method("POST"))
        .and(path("/users/me/messages/send"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid recipient"))
        .mount(&server)
        .await;
    let (resources, pipeline) = setup(&server).await;
    let db = resources.db.as_ref();

    insert_profile_and_credential(db, "user-1").await;
    let campaign_row = insert_queued_campaign(db, "user-1").await;
    let record = insert_pending_contact(db, campaign_row.id, "broken@test.edu").await;

    let summary = pipeline.run_send_batch(10, None).await.expect("send batch");
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.sent, 0);
    assert_eq!(summary.failed, 1);
    // Failed records do not block finalization.
    assert_eq!(summary.campaigns_completed, 1);

    let reloaded = contact::Entity::find_by_id(record.id)
        .one(db)
        .await
        .expect("query")
        .expect("record exists");
    assert_eq!(reloaded.status, ContactStatus::Failed);
    assert!(
        reloaded
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("invalid recipient")
    );

    let campaign_reloaded = campaign::Entity::find_by_id(campaign_row.id)
        .one(db)
        .await
        .expect("query")
        .expect("campaign exists");
    assert_eq!(campaign_reloaded.status, CampaignStatus::Completed);
}

#[tokio::test]
async fn missing_owner_profile_fails_the_claimed_records() {
    let server = MockServer::start().await;
    let (resources, pipeline) = setup(&server).await;
    let db = resources.db.as_ref();

    // No profile row for this owner.
    let campaign_row = insert_queued_campaign(db, "ghost-user").await;
    let record = insert_pending_contact(db, campaign_row.id, "a@test.edu").await;

    let summary = pipeline.run_send_batch(10, None).await.expect("send batch");
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.failed, 1);
    // A campaign whose records all fail before reaching a worker still
    // finalizes; nothing is left behind in `processing`.
    assert_eq!(summary.campaigns_completed, 1);

    let reloaded = contact::Entity::find_by_id(record.id)
        .one(db)
        .await
        .expect("query")
        .expect("record exists");
    assert_eq!(reloaded.status, ContactStatus::Failed);
    assert!(
        reloaded
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("no student profile")
    );

    let campaign_reloaded = campaign::Entity::find_by_id(campaign_row.id)
        .one(db)
        .await
        .expect("query")
        .expect("campaign exists");
    assert_eq!(campaign_reloaded.status, CampaignStatus::Completed);
}

#[tokio::test]
async fn unloadable_campaign_context_resolves_the_records_instead_of_aborting() {
    let server = MockServer::start().await;
    let (resources, pipeline) = setup(&server).await;
    let db = resources.db.as_ref();

    insert_profile_and_credential(db, "user-1").await;
    // A custom campaign whose prompt was lost is unloadable context, the
    // same class of failure as a campaign row the sweep cannot read.
    let broken = campaign::ActiveModel {
        owner_id: Set("user-1".to_string()),
        kind: Set(CampaignKind::Custom),
        interests: Set(json!([])),
        targets: Set(json!([])),
        custom_prompt: Set(None),
        max_contacts: Set(10),
        status: Set(CampaignStatus::Queued),
        error_message: Set(None),
        created_at: Set(OffsetDateTime::now_utc()),
        updated_at: Set(OffsetDateTime::now_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert campaign");
    let record = insert_pending_contact(db, broken.id, "a@test.edu").await;

    let summary = pipeline.run_send_batch(10, None).await.expect("send batch");
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.campaigns_completed, 1);

    let reloaded = contact::Entity::find_by_id(record.id)
        .one(db)
        .await
        .expect("query")
        .expect("record exists");
    assert_eq!(reloaded.status, ContactStatus::Failed);
}

#[tokio::test]
async fn batch_size_bounds_one_pass_and_the_campaign_finishes_on_the_next() {
    let server = MockServer::start().await;
    mount_generation(&server).await;
    mount_send(&server).await;
    let (resources, pipeline) = setup(&server).await;
    let db = resources.db.as_ref();

    insert_profile_and_credential(db, "user-1").await;
    let campaign_row = insert_queued_campaign(db, "user-1").await;
    for email in ["a@test.edu", "b@test.edu", "c@test.edu"] {
        insert_pending_contact(db, campaign_row.id, email).await;
    }

    let first = pipeline.run_send_batch(2, None).await.expect("first pass");
    assert_eq!(first.claimed, 2);
    assert_eq!(first.sent, 2);
    assert_eq!(first.campaigns_completed, 0);

    let second = pipeline.run_send_batch(2, None).await.expect("second pass");
    assert_eq!(second.claimed, 1);
    assert_eq!(second.sent, 1);
    assert_eq!(second.campaigns_completed, 1);

    // Record conservation: every inserted record ended in exactly one
    // terminal state.
    let contacts = contact::Entity::find()
        .filter(contact::Column::CampaignId.eq(campaign_row.id))
        .all(db)
        .await
        .expect("query");
    assert_eq!(contacts.len(), 3);
    assert!(contacts.iter().all(|c| c.status == ContactStatus::Sent));
}

#[tokio::test]
async fn campaign_filter_leaves_other_campaigns_untouched() {
    let server = MockServer::start().await;
    mount_generation(&server).await;
    mount_send(&server).await;
    let (resources, pipeline) = setup(&server).await;
    let db = resources.db.as_ref();

    insert_profile_and_credential(db, "user-1").await;
    let target = insert_queued_campaign(db, "user-1").await;
    let other = insert_queued_campaign(db, "user-1").await;
    insert_pending_contact(db, target.id, "a@test.edu").await;
    insert_pending_contact(db, other.id, "b@test.edu").await;

    let summary = pipeline
        .run_send_batch(10, Some(target.id))
        .await
        .expect("send batch");
    assert_eq!(summary.claimed, 1);

    let untouched = contact::Entity::find()
        .filter(contact::Column::CampaignId.eq(other.id))
        .all(db)
        .await
        .expect("query");
    assert!(untouched.iter().all(|c| c.status == ContactStatus::Pending));
}
