use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{ChallengeEntity, ChallengeStatus, Difficulty},
    services::trophy,
};

/// Actor endpoint of a challenge.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActorSummary {
    pub id: u64,
    pub name: String,
}

/// Public projection of a challenge.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSummary {
    pub id: Uuid,
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    pub status: ChallengeStatus,
    pub start_actor: ActorSummary,
    pub end_actor: ActorSummary,
    pub difficulty: Difficulty,
    /// Effective par: the explicit estimate or the difficulty default.
    pub par: u8,
    pub hints_used: u32,
    pub created_at: DateTime<Utc>,
}

impl From<ChallengeEntity> for ChallengeSummary {
    fn from(challenge: ChallengeEntity) -> Self {
        Self {
            id: challenge.id,
            date: challenge.date,
            status: challenge.status,
            par: trophy::par_for(&challenge),
            start_actor: ActorSummary {
                id: challenge.start_actor_id,
                name: challenge.start_actor_name,
            },
            end_actor: ActorSummary {
                id: challenge.end_actor_id,
                name: challenge.end_actor_name,
            },
            difficulty: challenge.difficulty,
            hints_used: challenge.hints_used,
            created_at: challenge.created_at,
        }
    }
}
