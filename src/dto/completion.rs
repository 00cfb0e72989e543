use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{CompletionEntity, TrophyTier, UserStatsEntity},
    dto::validation::validate_connections,
    services::completion_service::CompletionOutcome,
};

/// Completion submitted by the client once a chain is solved.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub challenge_id: Uuid,
    #[validate(range(min = 1, max = 6))]
    pub moves: u8,
    /// Serialized actor/movie path; stored verbatim.
    #[validate(custom(function = "validate_connections"))]
    #[schema(value_type = Object)]
    pub connections: serde_json::Value,
}

/// Stored completion returned to the client.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub id: Uuid,
    pub challenge_id: Uuid,
    pub moves: u8,
    #[schema(value_type = Object)]
    pub connections: serde_json::Value,
    pub completed_at: DateTime<Utc>,
    pub trophy_tier: TrophyTier,
}

impl From<CompletionEntity> for CompletionSummary {
    fn from(record: CompletionEntity) -> Self {
        Self {
            id: record.id,
            challenge_id: record.challenge_id,
            moves: record.moves,
            connections: record.connections,
            completed_at: record.completed_at,
            trophy_tier: record.trophy_tier,
        }
    }
}

/// Subset of the user's statistics echoed after a submission.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsTotals {
    pub total_completions: u64,
    pub total_moves: u64,
}

impl From<&UserStatsEntity> for StatsTotals {
    fn from(stats: &UserStatsEntity) -> Self {
        Self {
            total_completions: stats.total_completions,
            total_moves: stats.total_moves,
        }
    }
}

/// Response for `POST /completions`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    /// `false` when the completion had already been recorded.
    pub created: bool,
    pub completion: CompletionSummary,
    pub stats: StatsTotals,
}

impl From<CompletionOutcome> for CompletionResponse {
    fn from(outcome: CompletionOutcome) -> Self {
        Self {
            created: outcome.created,
            stats: StatsTotals::from(&outcome.stats),
            completion: outcome.record.into(),
        }
    }
}
