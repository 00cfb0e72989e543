//! BSON document shapes. Identifiers are stored as hyphenated uuid strings and
//! instants as BSON dates.

use chrono::{NaiveDate, Utc};
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{
    ChallengeEntity, ChallengeStatus, CompletionEntity, Difficulty, EntitlementEntity,
    EntitlementStatus, SubscriptionPlan, TrophyCounts, TrophyTier, UserStatsEntity,
};

pub const CHALLENGE_COLLECTION: &str = "challenges";
pub const COMPLETION_COLLECTION: &str = "completions";
pub const STATS_COLLECTION: &str = "user_stats";
pub const ENTITLEMENT_COLLECTION: &str = "entitlements";

pub fn doc_id(id: impl ToString) -> Document {
    doc! { "_id": id.to_string() }
}

pub fn bson_date(value: chrono::DateTime<Utc>) -> DateTime {
    DateTime::from_millis(value.timestamp_millis())
}

fn chrono_date(
    collection: &'static str,
    value: DateTime,
) -> Result<chrono::DateTime<Utc>, MongoDaoError> {
    chrono::DateTime::from_timestamp_millis(value.timestamp_millis()).ok_or_else(|| {
        MongoDaoError::Decode {
            collection,
            reason: format!("timestamp {} out of range", value.timestamp_millis()),
        }
    })
}

fn parse_uuid(collection: &'static str, raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Decode {
        collection,
        reason: format!("invalid uuid `{raw}`: {err}"),
    })
}

fn narrow<T: TryFrom<i64>>(collection: &'static str, field: &str, raw: i64) -> Result<T, MongoDaoError> {
    T::try_from(raw).map_err(|_| MongoDaoError::Decode {
        collection,
        reason: format!("`{field}` value {raw} out of range"),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChallengeDocument {
    #[serde(rename = "_id")]
    id: String,
    date: NaiveDate,
    status: ChallengeStatus,
    start_actor_id: i64,
    end_actor_id: i64,
    start_actor_name: String,
    end_actor_name: String,
    estimated_moves: Option<i32>,
    difficulty: Difficulty,
    #[serde(default)]
    hints_used: i64,
    created_at: DateTime,
}

impl TryFrom<ChallengeEntity> for MongoChallengeDocument {
    type Error = MongoDaoError;

    fn try_from(value: ChallengeEntity) -> Result<Self, Self::Error> {
        let actor = |raw: u64| {
            i64::try_from(raw).map_err(|_| MongoDaoError::Decode {
                collection: CHALLENGE_COLLECTION,
                reason: format!("actor id {raw} out of range"),
            })
        };
        Ok(Self {
            id: value.id.to_string(),
            date: value.date,
            status: value.status,
            start_actor_id: actor(value.start_actor_id)?,
            end_actor_id: actor(value.end_actor_id)?,
            start_actor_name: value.start_actor_name,
            end_actor_name: value.end_actor_name,
            estimated_moves: value.estimated_moves.map(i32::from),
            difficulty: value.difficulty,
            hints_used: i64::from(value.hints_used),
            created_at: bson_date(value.created_at),
        })
    }
}

impl TryFrom<MongoChallengeDocument> for ChallengeEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoChallengeDocument) -> Result<Self, Self::Error> {
        const C: &str = CHALLENGE_COLLECTION;
        Ok(Self {
            id: parse_uuid(C, &value.id)?,
            date: value.date,
            status: value.status,
            start_actor_id: narrow(C, "start_actor_id", value.start_actor_id)?,
            end_actor_id: narrow(C, "end_actor_id", value.end_actor_id)?,
            start_actor_name: value.start_actor_name,
            end_actor_name: value.end_actor_name,
            estimated_moves: value
                .estimated_moves
                .map(|raw| narrow(C, "estimated_moves", i64::from(raw)))
                .transpose()?,
            difficulty: value.difficulty,
            hints_used: narrow(C, "hints_used", value.hints_used)?,
            created_at: chrono_date(C, value.created_at)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCompletionDocument {
    #[serde(rename = "_id")]
    id: String,
    user_id: String,
    challenge_id: String,
    moves: i32,
    connections: serde_json::Value,
    completed_at: DateTime,
    trophy_tier: TrophyTier,
}

impl From<CompletionEntity> for MongoCompletionDocument {
    fn from(value: CompletionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            user_id: value.user_id,
            challenge_id: value.challenge_id.to_string(),
            moves: i32::from(value.moves),
            connections: value.connections,
            completed_at: bson_date(value.completed_at),
            trophy_tier: value.trophy_tier,
        }
    }
}

impl TryFrom<MongoCompletionDocument> for CompletionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoCompletionDocument) -> Result<Self, Self::Error> {
        const C: &str = COMPLETION_COLLECTION;
        Ok(Self {
            id: parse_uuid(C, &value.id)?,
            user_id: value.user_id,
            challenge_id: parse_uuid(C, &value.challenge_id)?,
            moves: narrow(C, "moves", i64::from(value.moves))?,
            connections: value.connections,
            completed_at: chrono_date(C, value.completed_at)?,
            trophy_tier: value.trophy_tier,
        })
    }
}

/// Counters are absent until the first `$inc` touches them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoStatsDocument {
    #[serde(rename = "_id")]
    user_id: String,
    #[serde(default)]
    total_completions: i64,
    #[serde(default)]
    total_moves: i64,
    #[serde(default)]
    trophies: TrophyCounts,
    #[serde(default)]
    applied_challenges: Vec<String>,
    updated_at: DateTime,
}

impl From<UserStatsEntity> for MongoStatsDocument {
    fn from(value: UserStatsEntity) -> Self {
        Self {
            user_id: value.user_id,
            total_completions: i64::try_from(value.total_completions).unwrap_or(i64::MAX),
            total_moves: i64::try_from(value.total_moves).unwrap_or(i64::MAX),
            trophies: value.trophies,
            applied_challenges: value
                .applied_challenges
                .iter()
                .map(Uuid::to_string)
                .collect(),
            updated_at: bson_date(value.updated_at),
        }
    }
}

impl TryFrom<MongoStatsDocument> for UserStatsEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoStatsDocument) -> Result<Self, Self::Error> {
        const C: &str = STATS_COLLECTION;
        Ok(Self {
            user_id: value.user_id,
            total_completions: narrow(C, "total_completions", value.total_completions)?,
            total_moves: narrow(C, "total_moves", value.total_moves)?,
            trophies: value.trophies,
            applied_challenges: value
                .applied_challenges
                .iter()
                .map(|raw| parse_uuid(C, raw))
                .collect::<Result<_, _>>()?,
            updated_at: chrono_date(C, value.updated_at)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEntitlementDocument {
    #[serde(rename = "_id")]
    subscriber_id: String,
    original_transaction_id: String,
    status: EntitlementStatus,
    current_period_ends_at: Option<DateTime>,
    auto_renew_enabled: bool,
    plan: SubscriptionPlan,
    updated_at: DateTime,
}

impl From<EntitlementEntity> for MongoEntitlementDocument {
    fn from(value: EntitlementEntity) -> Self {
        Self {
            subscriber_id: value.subscriber_id,
            original_transaction_id: value.original_transaction_id,
            status: value.status,
            current_period_ends_at: value.current_period_ends_at.map(bson_date),
            auto_renew_enabled: value.auto_renew_enabled,
            plan: value.plan,
            updated_at: bson_date(value.updated_at),
        }
    }
}

impl TryFrom<MongoEntitlementDocument> for EntitlementEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoEntitlementDocument) -> Result<Self, Self::Error> {
        const C: &str = ENTITLEMENT_COLLECTION;
        Ok(Self {
            subscriber_id: value.subscriber_id,
            original_transaction_id: value.original_transaction_id,
            status: value.status,
            current_period_ends_at: value
                .current_period_ends_at
                .map(|raw| chrono_date(C, raw))
                .transpose()?,
            auto_renew_enabled: value.auto_renew_enabled,
            plan: value.plan,
            updated_at: chrono_date(C, value.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn challenge_document_preserves_fields() {
        let entity = ChallengeEntity {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            status: ChallengeStatus::Next,
            start_actor_id: 287,
            end_actor_id: 1892,
            start_actor_name: "Brad Pitt".into(),
            end_actor_name: "Matt Damon".into(),
            estimated_moves: Some(3),
            difficulty: Difficulty::Hard,
            hints_used: 7,
            created_at: Utc.with_ymd_and_hms(2026, 3, 31, 4, 0, 0).unwrap(),
        };

        let document = MongoChallengeDocument::try_from(entity.clone()).unwrap();
        assert_eq!(document.id, entity.id.to_string());
        assert_eq!(ChallengeEntity::try_from(document).unwrap(), entity);
    }

    #[test]
    fn bson_dates_truncate_to_millis() {
        let instant = Utc
            .with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        let restored = chrono_date(STATS_COLLECTION, bson_date(instant)).unwrap();
        assert_eq!(restored.timestamp_millis(), instant.timestamp_millis());
        assert_eq!(restored.nanosecond(), 123_000_000);
    }

    #[test]
    fn malformed_uuid_is_a_decode_error() {
        let err = parse_uuid(COMPLETION_COLLECTION, "not-a-uuid").unwrap_err();
        assert!(matches!(err, MongoDaoError::Decode { .. }));
    }
}
