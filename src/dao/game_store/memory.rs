//! In-process store backed by [`DashMap`], used for local development and tests.
//!
//! Uniqueness rules mirror the MongoDB indexes: one completion per
//! `(user_id, challenge_id)` and at most one `next` and one `active` challenge.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};

use chrono::{NaiveDate, Utc};
use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::{self, BoxFuture};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::{
    game_store::GameStore,
    models::{
        ChallengeEntity, ChallengeStatus, CompletionEntity, EntitlementEntity, StatsApplication,
        StatsDelta, UserStatsEntity,
    },
    storage::{StorageError, StorageResult},
};

#[derive(Debug, Error)]
enum MemoryStoreError {
    #[error("simulated outage ({remaining} failure(s) left)")]
    SimulatedOutage { remaining: u32 },
}

type CompletionKey = (String, Uuid);

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    challenges: Mutex<HashMap<Uuid, ChallengeEntity>>,
    completions: DashMap<Uuid, CompletionEntity>,
    completion_keys: DashMap<CompletionKey, Uuid>,
    stats: DashMap<String, UserStatsEntity>,
    entitlements: DashMap<String, EntitlementEntity>,
    outage: AtomicU32,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `failures` store calls fail with [`StorageError::Unavailable`].
    pub fn simulate_outage(&self, failures: u32) {
        self.inner.outage.store(failures, Ordering::SeqCst);
    }

    /// Load completion rows written before the uniqueness rule existed.
    ///
    /// Duplicates for the same `(user_id, challenge_id)` are kept as-is; the key index
    /// points at whichever row was seeded first.
    pub fn seed_legacy_completions(&self, records: impl IntoIterator<Item = CompletionEntity>) {
        for record in records {
            let key = (record.user_id.clone(), record.challenge_id);
            self.inner.completion_keys.entry(key).or_insert(record.id);
            self.inner.completions.insert(record.id, record);
        }
    }

    /// Every stored challenge regardless of status.
    pub fn challenges(&self) -> Vec<ChallengeEntity> {
        self.inner.lock_challenges().values().cloned().collect()
    }

    fn guard(&self) -> StorageResult<()> {
        let consumed = self
            .inner
            .outage
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        match consumed {
            Ok(before) => Err(StorageError::unavailable(
                "memory store outage".into(),
                MemoryStoreError::SimulatedOutage {
                    remaining: before - 1,
                },
            )),
            Err(_) => Ok(()),
        }
    }

    fn run<T, F>(&self, op: F) -> BoxFuture<'static, StorageResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryInner) -> StorageResult<T>,
    {
        let result = self.guard().and_then(|()| op(self.inner.as_ref()));
        Box::pin(future::ready(result))
    }
}

impl MemoryInner {
    fn lock_challenges(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ChallengeEntity>> {
        self.challenges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn status_taken(
        rows: &HashMap<Uuid, ChallengeEntity>,
        status: ChallengeStatus,
        except: Uuid,
    ) -> bool {
        status != ChallengeStatus::Archived
            && rows
                .values()
                .any(|row| row.status == status && row.id != except)
    }

    fn insert_challenge(&self, challenge: ChallengeEntity) -> StorageResult<()> {
        let mut rows = self.lock_challenges();
        if rows.contains_key(&challenge.id)
            || Self::status_taken(&rows, challenge.status, challenge.id)
        {
            return Err(StorageError::conflict(format!(
                "challenge status {}",
                challenge.status
            )));
        }
        rows.insert(challenge.id, challenge);
        Ok(())
    }

    fn transition_challenge(
        &self,
        id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
        date: Option<NaiveDate>,
    ) -> StorageResult<bool> {
        let mut rows = self.lock_challenges();
        if Self::status_taken(&rows, to, id) {
            return Err(StorageError::conflict(format!("challenge status {to}")));
        }
        match rows.get_mut(&id) {
            Some(row) if row.status == from => {
                row.status = to;
                if let Some(date) = date {
                    row.date = date;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn insert_completion(&self, record: CompletionEntity) -> StorageResult<()> {
        let key = (record.user_id.clone(), record.challenge_id);
        match self.completion_keys.entry(key) {
            Entry::Occupied(_) => Err(StorageError::conflict(format!(
                "completion ({}, {})",
                record.user_id, record.challenge_id
            ))),
            Entry::Vacant(slot) => {
                let id = record.id;
                self.completions.insert(id, record);
                slot.insert(id);
                Ok(())
            }
        }
    }

    fn find_completion(&self, key: &CompletionKey) -> Option<CompletionEntity> {
        let id = *self.completion_keys.get(key)?;
        self.completions.get(&id).map(|row| row.clone())
    }

    fn delete_completion(&self, id: Uuid) -> bool {
        let Some((_, removed)) = self.completions.remove(&id) else {
            return false;
        };
        let key = (removed.user_id, removed.challenge_id);
        if self.completion_keys.remove_if(&key, |_, indexed| *indexed == id).is_some() {
            let survivor = self
                .completions
                .iter()
                .filter(|row| row.user_id == key.0 && row.challenge_id == key.1)
                .min_by_key(|row| row.completed_at)
                .map(|row| row.id);
            if let Some(survivor) = survivor {
                self.completion_keys.insert(key, survivor);
            }
        }
        true
    }

    fn apply_completion(&self, user_id: String, delta: StatsDelta) -> StatsApplication {
        let mut row = self
            .stats
            .entry(user_id.clone())
            .or_insert_with(|| UserStatsEntity::empty(user_id));
        if row.apply(&delta) {
            StatsApplication::Applied(row.clone())
        } else {
            StatsApplication::AlreadyApplied(row.clone())
        }
    }

    fn save_entitlement_if_newer(&self, entitlement: EntitlementEntity) -> bool {
        let mut entitlement = entitlement;
        entitlement.updated_at = Utc::now();
        match self.entitlements.entry(entitlement.subscriber_id.clone()) {
            Entry::Occupied(mut stored) => {
                if entitlement.supersedes(stored.get()) {
                    stored.insert(entitlement);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(entitlement);
                true
            }
        }
    }
}

impl GameStore for MemoryGameStore {
    fn insert_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(|inner| inner.insert_challenge(challenge))
    }

    fn find_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        self.run(|inner| Ok(inner.lock_challenges().get(&id).cloned()))
    }

    fn find_challenge_by_status(
        &self,
        status: ChallengeStatus,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        self.run(|inner| {
            Ok(inner
                .lock_challenges()
                .values()
                .filter(|row| row.status == status)
                .max_by_key(|row| row.date)
                .cloned())
        })
    }

    fn transition_challenge(
        &self,
        id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
        date: Option<NaiveDate>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(|inner| inner.transition_challenge(id, from, to, date))
    }

    fn increment_hints(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>> {
        self.run(|inner| {
            let mut rows = inner.lock_challenges();
            Ok(rows.get_mut(&id).map(|row| {
                row.hints_used += 1;
                row.clone()
            }))
        })
    }

    fn insert_completion(&self, record: CompletionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.run(|inner| inner.insert_completion(record))
    }

    fn find_completion(
        &self,
        user_id: String,
        challenge_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<CompletionEntity>>> {
        self.run(|inner| Ok(inner.find_completion(&(user_id, challenge_id))))
    }

    fn list_completions(&self) -> BoxFuture<'static, StorageResult<Vec<CompletionEntity>>> {
        self.run(|inner| Ok(inner.completions.iter().map(|row| row.clone()).collect()))
    }

    fn delete_completion(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(|inner| Ok(inner.delete_completion(id)))
    }

    fn ensure_stats(&self, user_id: String) -> BoxFuture<'static, StorageResult<UserStatsEntity>> {
        self.run(|inner| {
            Ok(inner
                .stats
                .entry(user_id.clone())
                .or_insert_with(|| UserStatsEntity::empty(user_id))
                .clone())
        })
    }

    fn apply_completion(
        &self,
        user_id: String,
        delta: StatsDelta,
    ) -> BoxFuture<'static, StorageResult<StatsApplication>> {
        self.run(|inner| Ok(inner.apply_completion(user_id, delta)))
    }

    fn replace_stats_if_unchanged(
        &self,
        expected: UserStatsEntity,
        stats: UserStatsEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(|inner| {
            let Some(mut row) = inner.stats.get_mut(&stats.user_id) else {
                return Ok(false);
            };
            if row.total_completions != expected.total_completions
                || row.updated_at != expected.updated_at
            {
                return Ok(false);
            }
            *row = stats;
            Ok(true)
        })
    }

    fn find_entitlement(
        &self,
        subscriber_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<EntitlementEntity>>> {
        self.run(|inner| Ok(inner.entitlements.get(&subscriber_id).map(|row| row.clone())))
    }

    fn save_entitlement_if_newer(
        &self,
        entitlement: EntitlementEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.run(|inner| Ok(inner.save_entitlement_if_newer(entitlement)))
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(future::ready(Ok(())))
    }
}
