//! Exactly-once completion ledger.
//!
//! A submission races on the store's unique `(user_id, challenge_id)` insert. The
//! winner folds the completion into the user's statistics; losers return the winning
//! record. Statistics are applied through a per-challenge idempotent increment, so a
//! loser re-applying the winner's delta is a no-op unless the winner crashed between
//! its insert and its increment, in which case the loser completes the work.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::GameStore,
        models::{CompletionEntity, StatsApplication, StatsDelta, UserStatsEntity},
        storage::StorageError,
    },
    error::ServiceError,
    services::trophy,
    state::SharedState,
};

/// A single completion submission from an authenticated user.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: String,
    pub challenge_id: Uuid,
    pub moves: u8,
    pub connections: serde_json::Value,
}

/// Outcome of [`record_completion`].
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// `true` only for the call whose insert created the record.
    pub created: bool,
    pub record: CompletionEntity,
    pub stats: UserStatsEntity,
}

const REBUILD_ATTEMPTS: u32 = 5;

/// Summary of an administrative dedup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    /// Records removed because an earlier one exists for the same key.
    pub removed: Vec<Uuid>,
    /// Users whose statistics were rebuilt from their surviving records.
    pub rebuilt_users: Vec<String>,
}

/// Record a completion at most once per `(user, challenge)`.
pub async fn record_completion(
    state: &SharedState,
    submission: Submission,
) -> Result<CompletionOutcome, ServiceError> {
    let allowed = state.config().moves();
    if !allowed.contains(&submission.moves) {
        return Err(ServiceError::InvalidInput(format!(
            "moves must be between {} and {} (got {})",
            allowed.start(),
            allowed.end(),
            submission.moves
        )));
    }
    if submission.user_id.trim().is_empty() {
        return Err(ServiceError::Unauthorized("missing user id".into()));
    }

    let store = state.require_game_store().await?;
    let Some(challenge) = store.find_challenge(submission.challenge_id).await? else {
        return Err(ServiceError::InvalidInput(format!(
            "unknown challenge `{}`",
            submission.challenge_id
        )));
    };

    let par = trophy::par_for(&challenge);
    let record = CompletionEntity {
        id: Uuid::new_v4(),
        user_id: submission.user_id,
        challenge_id: challenge.id,
        moves: submission.moves,
        connections: submission.connections,
        completed_at: Utc::now(),
        trophy_tier: trophy::evaluate(submission.moves, par),
    };

    match store.insert_completion(record.clone()).await {
        Ok(()) => {
            let stats = apply_stats(store.as_ref(), &record).await?;
            info!(
                user_id = %record.user_id,
                challenge_id = %record.challenge_id,
                moves = record.moves,
                par,
                tier = record.trophy_tier.as_str(),
                "completion recorded"
            );
            Ok(CompletionOutcome {
                created: true,
                record,
                stats,
            })
        }
        Err(StorageError::Conflict { .. }) => {
            let existing = store
                .find_completion(record.user_id.clone(), record.challenge_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidState(format!(
                        "completion for challenge `{}` vanished after conflict",
                        record.challenge_id
                    ))
                })?;
            let stats = apply_stats(store.as_ref(), &existing).await?;
            debug!(
                user_id = %existing.user_id,
                challenge_id = %existing.challenge_id,
                "duplicate completion submission ignored"
            );
            Ok(CompletionOutcome {
                created: false,
                record: existing,
                stats,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Fold `record` into its owner's statistics; idempotent per challenge.
async fn apply_stats(
    store: &dyn GameStore,
    record: &CompletionEntity,
) -> Result<UserStatsEntity, ServiceError> {
    let application = store
        .apply_completion(record.user_id.clone(), StatsDelta::from(record))
        .await?;
    if let StatsApplication::Applied(_) = &application {
        debug!(
            user_id = %record.user_id,
            challenge_id = %record.challenge_id,
            "stats increment applied"
        );
    }
    Ok(application.into_stats())
}

/// Statistics for a user, created empty on first read.
pub async fn get_stats(state: &SharedState, user_id: &str) -> Result<UserStatsEntity, ServiceError> {
    let store = state.require_game_store().await?;
    Ok(store.ensure_stats(user_id.to_owned()).await?)
}

/// The caller's completion for a challenge.
pub async fn get_completion(
    state: &SharedState,
    user_id: &str,
    challenge_id: Uuid,
) -> Result<CompletionEntity, ServiceError> {
    let store = state.require_game_store().await?;
    store
        .find_completion(user_id.to_owned(), challenge_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no completion for challenge `{challenge_id}`"))
        })
}

/// Pick the records to delete so that each `(user, challenge)` keeps only its
/// earliest completion.
pub fn plan_dedup(records: &[CompletionEntity]) -> Vec<Uuid> {
    let mut earliest: HashMap<(&str, Uuid), &CompletionEntity> = HashMap::new();
    let mut doomed = Vec::new();

    for record in records {
        let key = (record.user_id.as_str(), record.challenge_id);
        match earliest.get(&key) {
            Some(kept) if (kept.completed_at, kept.id) <= (record.completed_at, record.id) => {
                doomed.push(record.id);
            }
            Some(kept) => {
                doomed.push(kept.id);
                earliest.insert(key, record);
            }
            None => {
                earliest.insert(key, record);
            }
        }
    }

    doomed
}

/// One-time repair for completions written before the uniqueness rule existed.
///
/// Keeps the earliest record per `(user, challenge)`, deletes the rest, then rebuilds
/// the statistics of every affected user from the surviving records.
pub async fn dedup_completions(state: &SharedState) -> Result<DedupReport, ServiceError> {
    let store = state.require_game_store().await?;
    let records = store.list_completions().await?;
    let doomed = plan_dedup(&records);

    if doomed.is_empty() {
        info!(records = records.len(), "no duplicate completions found");
        return Ok(DedupReport::default());
    }

    let mut affected = BTreeSet::new();
    let mut removed = Vec::with_capacity(doomed.len());
    for id in &doomed {
        if store.delete_completion(*id).await? {
            removed.push(*id);
        } else {
            warn!(completion_id = %id, "duplicate completion already gone");
        }
        if let Some(record) = records.iter().find(|record| record.id == *id) {
            affected.insert(record.user_id.clone());
        }
    }

    for user_id in &affected {
        rebuild_stats(store.as_ref(), user_id).await?;
    }

    info!(
        removed = removed.len(),
        users = affected.len(),
        "duplicate completions removed and stats rebuilt"
    );

    Ok(DedupReport {
        removed,
        rebuilt_users: affected.into_iter().collect(),
    })
}

/// Recompute a user's statistics from their records with a compare-and-set write.
///
/// The row is read before the records, so an increment landing in between changes
/// it and the write is retried against fresh data.
async fn rebuild_stats(store: &dyn GameStore, user_id: &str) -> Result<UserStatsEntity, ServiceError> {
    for attempt in 1..=REBUILD_ATTEMPTS {
        let current = store.ensure_stats(user_id.to_owned()).await?;
        let records = store.list_completions().await?;
        let rebuilt = UserStatsEntity::from_records(user_id, &records);
        if store
            .replace_stats_if_unchanged(current, rebuilt.clone())
            .await?
        {
            return Ok(rebuilt);
        }
        debug!(user_id, attempt, "stats changed during rebuild; retrying");
    }
    Err(ServiceError::InvalidState(format!(
        "stats for `{user_id}` kept changing during rebuild"
    )))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::dao::models::TrophyTier;

    fn record(user: &str, challenge_id: Uuid, offset_secs: i64) -> CompletionEntity {
        CompletionEntity {
            id: Uuid::new_v4(),
            user_id: user.into(),
            challenge_id,
            moves: 4,
            connections: serde_json::Value::Null,
            completed_at: Utc::now() + Duration::seconds(offset_secs),
            trophy_tier: TrophyTier::Emmy,
        }
    }

    #[test]
    fn dedup_keeps_earliest_per_key() {
        let challenge = Uuid::new_v4();
        let late = record("u1", challenge, 30);
        let early = record("u1", challenge, 0);
        let middle = record("u1", challenge, 10);
        let other_user = record("u2", challenge, 50);

        let doomed = plan_dedup(&[late.clone(), early.clone(), middle.clone(), other_user]);

        assert_eq!(doomed.len(), 2);
        assert!(doomed.contains(&late.id));
        assert!(doomed.contains(&middle.id));
        assert!(!doomed.contains(&early.id));
    }

    #[test]
    fn dedup_of_unique_records_is_empty() {
        let records = vec![
            record("u1", Uuid::new_v4(), 0),
            record("u1", Uuid::new_v4(), 0),
            record("u2", Uuid::new_v4(), 0),
        ];
        assert!(plan_dedup(&records).is_empty());
    }
}
