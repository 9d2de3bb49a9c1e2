//! Cross-campaign deduplication.
//!
//! A requester never emails the same contact twice, regardless of which
//! campaign first reached them. The filter itself is a pure function over a
//! snapshot of the requester's contact history; loading that snapshot is
//! the only database touch.

use crate::discovery::Candidate;
use crate::entity::{campaign, contact};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect};
use std::collections::HashSet;

/// All emails this owner has ever had a pending contact record for, across
/// every campaign, lowercase-normalized.
pub async fn prior_contacted_emails(
    db: &DatabaseConnection,
    owner_id: &str,
) -> Result<HashSet<String>, sea_orm::DbErr> {
    let emails: Vec<String> = contact::Entity::find()
        .select_only()
        .column(contact::Column::Email)
        .inner_join(campaign::Entity)
        .filter(campaign::Column::OwnerId.eq(owner_id))
        .into_tuple()
        .all(db)
        .await?;
    Ok(emails.into_iter().map(|e| e.to_lowercase()).collect())
}

/// Drop candidates whose email has already been contacted. Comparison is
/// case-insensitive; candidates without an email are dropped too.
pub fn filter_new_candidates(
    prior: &HashSet<String>,
    candidates: Vec<Candidate>,
) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|candidate| match candidate.email.as_deref() {
            Some(email) => !prior.contains(&email.to_lowercase()),
            None => false,
        })
        .collect()
}
