use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle position of a daily challenge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    /// Pre-generated for the next civil day.
    Next,
    /// The challenge currently being played.
    Active,
    /// Retired challenge kept for history.
    Archived,
}

impl ChallengeStatus {
    /// Persisted representation of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeStatus::Next => "next",
            ChallengeStatus::Active => "active",
            ChallengeStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Difficulty assigned to a challenge when it is generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
}

/// Trophy awarded for a completion, from best to worst.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrophyTier {
    WalkOfFame,
    Oscar,
    GoldenGlobe,
    Emmy,
    Sag,
    Popcorn,
}

impl TrophyTier {
    /// Every tier, best first.
    pub const ALL: [TrophyTier; 6] = [
        TrophyTier::WalkOfFame,
        TrophyTier::Oscar,
        TrophyTier::GoldenGlobe,
        TrophyTier::Emmy,
        TrophyTier::Sag,
        TrophyTier::Popcorn,
    ];

    /// Persisted representation of the tier, also used as the counter field name.
    pub fn as_str(self) -> &'static str {
        match self {
            TrophyTier::WalkOfFame => "walk_of_fame",
            TrophyTier::Oscar => "oscar",
            TrophyTier::GoldenGlobe => "golden_globe",
            TrophyTier::Emmy => "emmy",
            TrophyTier::Sag => "sag",
            TrophyTier::Popcorn => "popcorn",
        }
    }
}

/// Daily challenge persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeEntity {
    /// Primary key of the challenge.
    pub id: Uuid,
    /// Civil date (in the configured zone) the challenge is played on.
    pub date: NaiveDate,
    pub status: ChallengeStatus,
    pub start_actor_id: u64,
    pub end_actor_id: u64,
    pub start_actor_name: String,
    pub end_actor_name: String,
    /// Explicit par; when absent the difficulty default applies.
    pub estimated_moves: Option<u8>,
    pub difficulty: Difficulty,
    /// Number of hints requested by players for this challenge.
    pub hints_used: u32,
    pub created_at: DateTime<Utc>,
}

impl ChallengeEntity {
    /// Actor ids used by the challenge, for exclusion when generating the following one.
    pub fn actor_ids(&self) -> [u64; 2] {
        [self.start_actor_id, self.end_actor_id]
    }
}

/// Exactly-once record of a user finishing a challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionEntity {
    /// Record identifier, distinct from the `(user_id, challenge_id)` key so legacy
    /// duplicates can be addressed individually.
    pub id: Uuid,
    pub user_id: String,
    pub challenge_id: Uuid,
    pub moves: u8,
    /// Opaque serialized path submitted by the client.
    pub connections: serde_json::Value,
    pub completed_at: DateTime<Utc>,
    pub trophy_tier: TrophyTier,
}

/// Per-tier trophy counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrophyCounts {
    pub walk_of_fame: u64,
    pub oscar: u64,
    pub golden_globe: u64,
    pub emmy: u64,
    pub sag: u64,
    pub popcorn: u64,
}

impl TrophyCounts {
    /// Counter for a single tier.
    pub fn get(&self, tier: TrophyTier) -> u64 {
        match tier {
            TrophyTier::WalkOfFame => self.walk_of_fame,
            TrophyTier::Oscar => self.oscar,
            TrophyTier::GoldenGlobe => self.golden_globe,
            TrophyTier::Emmy => self.emmy,
            TrophyTier::Sag => self.sag,
            TrophyTier::Popcorn => self.popcorn,
        }
    }

    fn increment(&mut self, tier: TrophyTier) {
        let counter = match tier {
            TrophyTier::WalkOfFame => &mut self.walk_of_fame,
            TrophyTier::Oscar => &mut self.oscar,
            TrophyTier::GoldenGlobe => &mut self.golden_globe,
            TrophyTier::Emmy => &mut self.emmy,
            TrophyTier::Sag => &mut self.sag,
            TrophyTier::Popcorn => &mut self.popcorn,
        };
        *counter += 1;
    }
}

/// Aggregate statistics for a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatsEntity {
    pub user_id: String,
    pub total_completions: u64,
    pub total_moves: u64,
    pub trophies: TrophyCounts,
    /// Challenges whose completion has already been folded into the counters.
    pub applied_challenges: Vec<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl UserStatsEntity {
    /// Fresh, zeroed statistics row.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_completions: 0,
            total_moves: 0,
            trophies: TrophyCounts::default(),
            applied_challenges: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Fold a completion into the counters unless that challenge was already applied.
    ///
    /// Returns `false` when the delta was a duplicate and nothing changed.
    pub fn apply(&mut self, delta: &StatsDelta) -> bool {
        if self.applied_challenges.contains(&delta.challenge_id) {
            return false;
        }
        self.total_completions += 1;
        self.total_moves += u64::from(delta.moves);
        self.trophies.increment(delta.tier);
        self.applied_challenges.push(delta.challenge_id);
        self.updated_at = Utc::now();
        true
    }

    /// Recompute statistics from the completion records owned by `user_id`.
    pub fn from_records<'a>(
        user_id: &str,
        records: impl IntoIterator<Item = &'a CompletionEntity>,
    ) -> Self {
        let mut stats = Self::empty(user_id);
        for record in records.into_iter().filter(|r| r.user_id == user_id) {
            stats.apply(&StatsDelta::from(record));
        }
        stats
    }

    /// Mean number of moves across completions, if any.
    pub fn average_moves(&self) -> Option<f64> {
        (self.total_completions > 0).then(|| self.total_moves as f64 / self.total_completions as f64)
    }
}

/// Increment applied to [`UserStatsEntity`] for one completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsDelta {
    pub challenge_id: Uuid,
    pub moves: u8,
    pub tier: TrophyTier,
}

impl From<&CompletionEntity> for StatsDelta {
    fn from(record: &CompletionEntity) -> Self {
        Self {
            challenge_id: record.challenge_id,
            moves: record.moves,
            tier: record.trophy_tier,
        }
    }
}

/// Result of folding a completion into user statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsApplication {
    /// The increment was applied by this call.
    Applied(UserStatsEntity),
    /// The challenge had already been applied; the row is returned unchanged.
    AlreadyApplied(UserStatsEntity),
}

impl StatsApplication {
    /// Statistics row after the call, whichever way it went.
    pub fn into_stats(self) -> UserStatsEntity {
        match self {
            StatsApplication::Applied(stats) | StatsApplication::AlreadyApplied(stats) => stats,
        }
    }
}

/// Subscription status derived from provider events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    Active,
    Expired,
    Revoked,
    BillingRetry,
    GracePeriod,
}

impl EntitlementStatus {
    /// Whether the subscriber should currently get premium features.
    pub fn grants_access(self) -> bool {
        matches!(self, EntitlementStatus::Active | EntitlementStatus::GracePeriod)
    }
}

/// Billing cadence of a subscription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPlan {
    Monthly,
    Annual,
}

impl SubscriptionPlan {
    /// Infer the plan from a store product identifier.
    pub fn from_product_id(product_id: &str) -> Self {
        let lowered = product_id.to_ascii_lowercase();
        if lowered.contains("annual") || lowered.contains("yearly") {
            SubscriptionPlan::Annual
        } else {
            SubscriptionPlan::Monthly
        }
    }
}

/// Persisted entitlement for one subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntitlementEntity {
    pub subscriber_id: String,
    pub original_transaction_id: String,
    pub status: EntitlementStatus,
    /// Never moves backwards across applied updates.
    pub current_period_ends_at: Option<DateTime<Utc>>,
    pub auto_renew_enabled: bool,
    pub plan: SubscriptionPlan,
    pub updated_at: DateTime<Utc>,
}

impl EntitlementEntity {
    /// Whether `self` may overwrite `stored` without regressing the period end.
    pub fn supersedes(&self, stored: &EntitlementEntity) -> bool {
        match (stored.current_period_ends_at, self.current_period_ends_at) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(stored_end), Some(incoming_end)) => incoming_end >= stored_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, challenge_id: Uuid, moves: u8, tier: TrophyTier) -> CompletionEntity {
        CompletionEntity {
            id: Uuid::new_v4(),
            user_id: user.into(),
            challenge_id,
            moves,
            connections: serde_json::Value::Null,
            completed_at: Utc::now(),
            trophy_tier: tier,
        }
    }

    #[test]
    fn applying_same_challenge_twice_counts_once() {
        let mut stats = UserStatsEntity::empty("u1");
        let delta = StatsDelta {
            challenge_id: Uuid::new_v4(),
            moves: 3,
            tier: TrophyTier::GoldenGlobe,
        };

        assert!(stats.apply(&delta));
        assert!(!stats.apply(&delta));
        assert_eq!(stats.total_completions, 1);
        assert_eq!(stats.total_moves, 3);
        assert_eq!(stats.trophies.get(TrophyTier::GoldenGlobe), 1);
    }

    #[test]
    fn rebuild_only_counts_matching_user() {
        let records = vec![
            record("u1", Uuid::new_v4(), 2, TrophyTier::Oscar),
            record("u1", Uuid::new_v4(), 5, TrophyTier::Popcorn),
            record("u2", Uuid::new_v4(), 1, TrophyTier::WalkOfFame),
        ];

        let stats = UserStatsEntity::from_records("u1", &records);
        assert_eq!(stats.total_completions, 2);
        assert_eq!(stats.total_moves, 7);
        assert_eq!(stats.trophies.get(TrophyTier::WalkOfFame), 0);
        assert_eq!(stats.average_moves(), Some(3.5));
    }

    #[test]
    fn plan_is_inferred_from_product_id() {
        assert_eq!(
            SubscriptionPlan::from_product_id("com.castchain.premium.annual"),
            SubscriptionPlan::Annual
        );
        assert_eq!(
            SubscriptionPlan::from_product_id("com.castchain.premium.monthly"),
            SubscriptionPlan::Monthly
        );
    }
}
