//! Campaign orchestration: the five-stage fulfillment pipeline.
//!
//! A campaign moves `pending_processing -> queued -> completed | failed`.
//! Discovery and dedup populate the pending contact records and flip the
//! campaign to `queued`; batch sweeps claim records (`pending ->
//! processing`, an atomic conditional update so concurrent sweeps never
//! double-pick), fan them out across the credential pool, and resolve each
//! record to `sent` or `failed` independently. After every sweep the
//! finalization check marks campaigns with no remaining pending work as
//! `completed`; failed records do not block finalization.

use crate::AppResources;
use crate::discovery::dedup::{filter_new_candidates, prior_contacted_emails};
use crate::discovery::{Candidate, ContactSource};
use crate::dispatch::Dispatcher;
use crate::entity::{campaign, contact, profile};
use crate::error::{DiscoveryError, PipelineError};
use crate::generation::ContentGenerator;
use crate::generation::intent::CampaignIntent;
use crate::ratelimit::{CredentialLimiter, CredentialPool};
use crate::status::{CampaignKind, CampaignStatus, ContactStatus};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use utoipa::ToSchema;

/// Request payload for campaign creation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCampaign {
    pub owner_id: String,
    pub kind: CampaignKind,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    pub max_contacts: i32,
}

/// Outcome counts for one send-batch sweep.
#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct BatchSummary {
    pub claimed: usize,
    pub sent: usize,
    pub failed: usize,
    pub campaigns_completed: usize,
}

struct Job {
    record: contact::Model,
    intent: Arc<CampaignIntent>,
    profile: Arc<profile::Model>,
}

pub struct Pipeline {
    resources: Arc<AppResources>,
    pool: CredentialPool,
    generator: Arc<ContentGenerator>,
    source: ContactSource,
    dispatcher: Arc<Dispatcher>,
}

impl Pipeline {
    pub fn new(resources: Arc<AppResources>) -> Self {
        let config = &resources.config;
        let pool = CredentialPool::new(
            &config.generation.api_keys,
            config.generation.requests_per_minute,
            config.generation.max_in_flight,
        );
        let generator = Arc::new(ContentGenerator::new(
            resources.http.clone(),
            &config.generation,
            config.storage.clone(),
        ));
        let source = ContactSource::new(
            resources.http.clone(),
            config.directory.clone(),
            generator.clone(),
        );
        let dispatcher = Arc::new(Dispatcher::new(
            resources.http.clone(),
            config.mail.clone(),
            config.tracking_base_url.clone(),
        ));
        Self {
            resources,
            pool,
            generator,
            source,
            dispatcher,
        }
    }

    fn db(&self) -> &DatabaseConnection {
        self.resources.db.as_ref()
    }

    /// Insert a new campaign in `pending_processing`.
    ///
    /// Enforces the intent invariant up front: `custom_prompt` must be
    /// present exactly when the kind is `custom`.
    #[tracing::instrument(skip_all, fields(owner_id = %request.owner_id, kind = ?request.kind))]
    pub async fn create_campaign(
        &self,
        request: NewCampaign,
    ) -> Result<campaign::Model, PipelineError> {
        let has_prompt = request
            .custom_prompt
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        if request.kind == CampaignKind::Custom && !has_prompt {
            return Err(PipelineError::InvalidCampaign(
                "custom campaigns require a non-empty custom_prompt".into(),
            ));
        }
        if request.kind != CampaignKind::Custom && has_prompt {
            return Err(PipelineError::InvalidCampaign(
                "custom_prompt is only valid for custom campaigns".into(),
            ));
        }
        if request.max_contacts < 1 {
            return Err(PipelineError::InvalidCampaign(
                "max_contacts must be at least 1".into(),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let created = campaign::ActiveModel {
            owner_id: Set(request.owner_id),
            kind: Set(request.kind),
            interests: Set(serde_json::json!(request.interests)),
            targets: Set(serde_json::json!(request.targets)),
            custom_prompt: Set(request.custom_prompt),
            max_contacts: Set(request.max_contacts),
            status: Set(CampaignStatus::PendingProcessing),
            error_message: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db())
        .await?;
        info!(campaign_id = created.id, "campaign created");
        Ok(created)
    }

    /// Discover contacts, dedup against the owner's full history, insert
    /// pending records and move the campaign to `queued`. Zero contacts
    /// after discovery + dedup fails the campaign with no records inserted.
    #[tracing::instrument(skip(self))]
    pub async fn run_discovery_and_enqueue(&self, campaign_id: i32) -> Result<usize, PipelineError> {
        let campaign = campaign::Entity::find_by_id(campaign_id)
            .one(self.db())
            .await?
            .ok_or(PipelineError::CampaignNotFound(campaign_id))?;
        if campaign.status != CampaignStatus::PendingProcessing {
            return Err(PipelineError::InvalidCampaign(format!(
                "discovery requires status pending_processing, found {}",
                campaign.status.as_str()
            )));
        }
        let intent = CampaignIntent::from_campaign(&campaign)?;
        let Some(limiter) = self.pool.any() else {
            return Err(PipelineError::InvalidCampaign(
                "no generation credentials configured".into(),
            ));
        };

        let desired = campaign.max_contacts.max(1) as usize;
        let discovered = match self.source.discover(&limiter, &intent, desired).await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.fail_campaign(campaign, &e.to_string()).await?;
                return Err(e.into());
            }
        };

        let prior = prior_contacted_emails(self.db(), &campaign.owner_id).await?;
        let fresh = filter_new_candidates(&prior, discovered);
        if fresh.is_empty() {
            let err = DiscoveryError::NoContacts;
            self.fail_campaign(campaign, &err.to_string()).await?;
            return Err(err.into());
        }

        let now = OffsetDateTime::now_utc();
        let records: Vec<contact::ActiveModel> = fresh
            .into_iter()
            .take(desired)
            .filter_map(|candidate| contact_record(campaign.id, candidate, now))
            .collect();
        let inserted = records.len();
        contact::Entity::insert_many(records).exec(self.db()).await?;

        let next = campaign.status.transition(CampaignStatus::Queued)?;
        let mut active: campaign::ActiveModel = campaign.into();
        active.status = Set(next);
        active.updated_at = Set(now);
        active.update(self.db()).await?;

        info!(campaign_id, inserted, "campaign queued");
        Ok(inserted)
    }

    async fn fail_campaign(
        &self,
        campaign: campaign::Model,
        message: &str,
    ) -> Result<(), PipelineError> {
        warn!(campaign_id = campaign.id, error = %message, "campaign failed");
        let next = campaign.status.transition(CampaignStatus::Failed)?;
        let mut active: campaign::ActiveModel = campaign.into();
        active.status = Set(next);
        active.error_message = Set(Some(message.to_string()));
        active.updated_at = Set(OffsetDateTime::now_utc());
        active.update(self.db()).await?;
        Ok(())
    }

    /// Claim up to `batch_size` pending records (optionally scoped to one
    /// campaign) and fan them out across the credential pool. Every claimed
    /// record resolves to `sent` or `failed`; failures never abort
    /// siblings. Touched campaigns are finalized afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn run_send_batch(
        &self,
        batch_size: u64,
        campaign_filter: Option<i32>,
    ) -> Result<BatchSummary, PipelineError> {
        let mut query = contact::Entity::find()
            .filter(contact::Column::Status.eq(ContactStatus::Pending))
            .order_by_asc(contact::Column::Id)
            .limit(batch_size);
        if let Some(campaign_id) = campaign_filter {
            query = query.filter(contact::Column::CampaignId.eq(campaign_id));
        }
        let pending = query.all(self.db()).await?;

        // Claim before any generation starts; a concurrent sweep that got
        // there first simply wins the record. A claim that errors stops the
        // loop but the records already claimed still get processed, so
        // nothing is left stuck in `processing`.
        let mut claimed = Vec::new();
        for mut record in pending {
            match claim_contact(self.db(), record.id).await {
                Ok(true) => {
                    record.status = ContactStatus::Processing;
                    claimed.push(record);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(contact_id = record.id, error = %e, "claim failed, stopping the claim loop");
                    break;
                }
            }
        }
        let mut summary = BatchSummary {
            claimed: claimed.len(),
            ..BatchSummary::default()
        };
        if claimed.is_empty() {
            return Ok(summary);
        }

        // Finalization must cover every claimed record's campaign, so the
        // list is taken from the claimed records themselves: a campaign
        // whose records all prefail still has to reach the completion check.
        let touched: Vec<i32> = {
            let mut ids: Vec<i32> = claimed.iter().map(|r| r.campaign_id).collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        let (jobs, mut prefailed) = self.assemble_jobs(claimed).await;
        summary.failed += prefailed.len();
        for (record, reason) in prefailed.drain(..) {
            mark_failed(self.db(), &record, &reason).await;
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
        let mut workers = JoinSet::new();
        for limiter in self.pool.shuffled() {
            for _ in 0..self.resources.config.generation.max_in_flight {
                workers.spawn(worker_loop(
                    self.resources.db.clone(),
                    self.generator.clone(),
                    self.dispatcher.clone(),
                    limiter.clone(),
                    queue.clone(),
                ));
            }
        }
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((sent, failed)) => {
                    summary.sent += sent;
                    summary.failed += failed;
                }
                Err(e) => error!(error = %e, "send worker panicked"),
            }
        }

        for campaign_id in touched {
            if self.finalize_if_complete(campaign_id).await? {
                summary.campaigns_completed += 1;
            }
        }
        info!(?summary, "send batch finished");
        Ok(summary)
    }

    /// Resolve each claimed record's campaign intent and owner profile.
    /// Records whose context cannot be loaded fail individually, database
    /// errors included; once a record is claimed it always resolves.
    async fn assemble_jobs(
        &self,
        claimed: Vec<contact::Model>,
    ) -> (Vec<Job>, Vec<(contact::Model, String)>) {
        let mut campaign_ids: Vec<i32> = claimed.iter().map(|r| r.campaign_id).collect();
        campaign_ids.sort_unstable();
        campaign_ids.dedup();

        let mut contexts: HashMap<i32, (Arc<CampaignIntent>, Arc<profile::Model>)> = HashMap::new();
        let mut failures: HashMap<i32, String> = HashMap::new();
        for campaign_id in campaign_ids {
            let campaign = match campaign::Entity::find_by_id(campaign_id).one(self.db()).await {
                Ok(Some(campaign)) => campaign,
                Ok(None) => {
                    failures.insert(campaign_id, format!("campaign {campaign_id} not found"));
                    continue;
                }
                Err(e) => {
                    failures.insert(campaign_id, format!("failed to load campaign: {e}"));
                    continue;
                }
            };
            let intent = match CampaignIntent::from_campaign(&campaign) {
                Ok(intent) => intent,
                Err(e) => {
                    failures.insert(campaign_id, e.to_string());
                    continue;
                }
            };
            match profile::Entity::find_by_id(campaign.owner_id.clone())
                .one(self.db())
                .await
            {
                Ok(Some(profile)) => {
                    contexts.insert(campaign_id, (Arc::new(intent), Arc::new(profile)));
                }
                Ok(None) => {
                    failures.insert(
                        campaign_id,
                        format!("no student profile for owner {}", campaign.owner_id),
                    );
                }
                Err(e) => {
                    failures.insert(campaign_id, format!("failed to load owner profile: {e}"));
                }
            }
        }

        let mut jobs = Vec::new();
        let mut prefailed = Vec::new();
        for record in claimed {
            match contexts.get(&record.campaign_id) {
                Some((intent, profile)) => jobs.push(Job {
                    record,
                    intent: intent.clone(),
                    profile: profile.clone(),
                }),
                None => {
                    let reason = failures
                        .get(&record.campaign_id)
                        .cloned()
                        .unwrap_or_else(|| "campaign context unavailable".into());
                    prefailed.push((record, reason));
                }
            }
        }
        (jobs, prefailed)
    }

    /// Mark the campaign `completed` once it has no `pending` records left.
    /// Failed records do not block completion.
    pub async fn finalize_if_complete(&self, campaign_id: i32) -> Result<bool, PipelineError> {
        let remaining = contact::Entity::find()
            .filter(contact::Column::CampaignId.eq(campaign_id))
            .filter(
                contact::Column::Status
                    .is_in([ContactStatus::Pending, ContactStatus::Processing]),
            )
            .count(self.db())
            .await?;
        if remaining > 0 {
            return Ok(false);
        }
        let Some(campaign) = campaign::Entity::find_by_id(campaign_id).one(self.db()).await?
        else {
            return Err(PipelineError::CampaignNotFound(campaign_id));
        };
        if campaign.status != CampaignStatus::Queued {
            return Ok(false);
        }
        let next = campaign.status.transition(CampaignStatus::Completed)?;
        let mut active: campaign::ActiveModel = campaign.into();
        active.status = Set(next);
        active.updated_at = Set(OffsetDateTime::now_utc());
        active.update(self.db()).await?;
        info!(campaign_id, "campaign completed");
        Ok(true)
    }
}

/// Atomically claim one pending record (`pending -> processing`). Returns
/// false when another sweep already claimed it.
pub async fn claim_contact(
    db: &DatabaseConnection,
    contact_id: i32,
) -> Result<bool, sea_orm::DbErr> {
    let result = contact::Entity::update_many()
        .set(contact::ActiveModel {
            status: Set(ContactStatus::Processing),
            ..Default::default()
        })
        .filter(contact::Column::Id.eq(contact_id))
        .filter(contact::Column::Status.eq(ContactStatus::Pending))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

async fn worker_loop(
    db: Arc<DatabaseConnection>,
    generator: Arc<ContentGenerator>,
    dispatcher: Arc<Dispatcher>,
    limiter: Arc<CredentialLimiter>,
    queue: Arc<Mutex<VecDeque<Job>>>,
) -> (usize, usize) {
    let mut sent = 0;
    let mut failed = 0;
    loop {
        let job = { queue.lock().await.pop_front() };
        let Some(job) = job else { break };
        if process_record(&db, &generator, &dispatcher, &limiter, &job).await {
            sent += 1;
        } else {
            failed += 1;
        }
    }
    (sent, failed)
}

/// Run generation + dispatch for one claimed record. Always resolves the
/// record to `sent` or `failed`; returns true on `sent`.
async fn process_record(
    db: &DatabaseConnection,
    generator: &ContentGenerator,
    dispatcher: &Dispatcher,
    limiter: &CredentialLimiter,
    job: &Job,
) -> bool {
    let outcome = match generator
        .generate_email(limiter, &job.intent, &job.record, &job.profile)
        .await
    {
        Ok((subject, body)) => dispatcher
            .send_campaign_email(db, &job.record, &job.profile, &subject, &body)
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match outcome {
        Ok(_) => {
            mark_sent(db, &job.record).await;
            true
        }
        Err(reason) => {
            warn!(contact_id = job.record.id, error = %reason, "contact failed");
            mark_failed(db, &job.record, &reason).await;
            false
        }
    }
}

async fn mark_sent(db: &DatabaseConnection, record: &contact::Model) {
    let next = match record.status.transition(ContactStatus::Sent) {
        Ok(next) => next,
        Err(e) => {
            error!(contact_id = record.id, error = %e, "refusing illegal transition");
            return;
        }
    };
    let active = contact::ActiveModel {
        id: Set(record.id),
        status: Set(next),
        sent_at: Set(Some(OffsetDateTime::now_utc())),
        ..Default::default()
    };
    if let Err(e) = active.update(db).await {
        error!(contact_id = record.id, error = %e, "failed to persist sent status");
    }
}

async fn mark_failed(db: &DatabaseConnection, record: &contact::Model, reason: &str) {
    let next = match record.status.transition(ContactStatus::Failed) {
        Ok(next) => next,
        Err(e) => {
            error!(contact_id = record.id, error = %e, "refusing illegal transition");
            return;
        }
    };
    let active = contact::ActiveModel {
        id: Set(record.id),
        status: Set(next),
        error_message: Set(Some(reason.to_string())),
        ..Default::default()
    };
    if let Err(e) = active.update(db).await {
        error!(contact_id = record.id, error = %e, "failed to persist failed status");
    }
}

fn contact_record(
    campaign_id: i32,
    candidate: Candidate,
    now: OffsetDateTime,
) -> Option<contact::ActiveModel> {
    let email = candidate.email?;
    Some(contact::ActiveModel {
        campaign_id: Set(campaign_id),
        name: Set(candidate.name),
        email: Set(email),
        organization: Set(candidate.organization),
        role: Set(candidate.role),
        focus_areas: Set(serde_json::json!(candidate.focus_areas)),
        status: Set(ContactStatus::Pending),
        error_message: Set(None),
        created_at: Set(now),
        sent_at: Set(None),
        ..Default::default()
    })
}
