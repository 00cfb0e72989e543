pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use chrono::NaiveDate;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    ChallengeEntity, ChallengeStatus, CompletionEntity, EntitlementEntity, StatsApplication,
    StatsDelta, UserStatsEntity,
};
use crate::dao::storage::StorageResult;

/// Abstraction over the persistence layer.
///
/// Every write that guards an invariant is a single-row conditional operation: callers
/// rely on [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict) and
/// boolean outcomes rather than reading first and writing after.
pub trait GameStore: Send + Sync {
    /// Insert a challenge. Fails with `Conflict` when another challenge already holds
    /// the `next` or `active` status being inserted.
    fn insert_challenge(&self, challenge: ChallengeEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_challenge(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;
    fn find_challenge_by_status(
        &self,
        status: ChallengeStatus,
    ) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;
    /// Compare-and-set the status of a challenge, optionally re-keying its date.
    ///
    /// Returns `false` when the challenge is not currently in `from`.
    fn transition_challenge(
        &self,
        id: Uuid,
        from: ChallengeStatus,
        to: ChallengeStatus,
        date: Option<NaiveDate>,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Atomically bump the hint counter, returning the updated challenge.
    fn increment_hints(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<ChallengeEntity>>>;

    /// Insert a completion. Fails with `Conflict` when `(user_id, challenge_id)` exists.
    fn insert_completion(&self, record: CompletionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_completion(
        &self,
        user_id: String,
        challenge_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<CompletionEntity>>>;
    fn list_completions(&self) -> BoxFuture<'static, StorageResult<Vec<CompletionEntity>>>;
    fn delete_completion(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Return the statistics row for a user, creating an empty one if needed.
    fn ensure_stats(&self, user_id: String) -> BoxFuture<'static, StorageResult<UserStatsEntity>>;
    /// Fold a completion into the user's statistics at most once per challenge.
    fn apply_completion(
        &self,
        user_id: String,
        delta: StatsDelta,
    ) -> BoxFuture<'static, StorageResult<StatsApplication>>;
    /// Overwrite a statistics row only if it still matches `expected`.
    ///
    /// Rows are compared on `total_completions` and `updated_at`, which every applied
    /// increment changes. Returns `false` when the row moved on or no longer exists.
    fn replace_stats_if_unchanged(
        &self,
        expected: UserStatsEntity,
        stats: UserStatsEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    fn find_entitlement(
        &self,
        subscriber_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<EntitlementEntity>>>;
    /// Upsert an entitlement unless the stored period end is newer.
    ///
    /// Returns `false` when the stored row won.
    fn save_entitlement_if_newer(
        &self,
        entitlement: EntitlementEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
