use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{TrophyCounts, UserStatsEntity};

/// Trophy counters keyed by tier.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrophyCountsSummary {
    pub walk_of_fame: u64,
    pub oscar: u64,
    pub golden_globe: u64,
    pub emmy: u64,
    pub sag: u64,
    pub popcorn: u64,
}

impl From<TrophyCounts> for TrophyCountsSummary {
    fn from(counts: TrophyCounts) -> Self {
        Self {
            walk_of_fame: counts.walk_of_fame,
            oscar: counts.oscar,
            golden_globe: counts.golden_globe,
            emmy: counts.emmy,
            sag: counts.sag,
            popcorn: counts.popcorn,
        }
    }
}

/// Aggregate statistics for the calling user.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub user_id: String,
    pub total_completions: u64,
    pub total_moves: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_moves: Option<f64>,
    pub trophies: TrophyCountsSummary,
    pub updated_at: DateTime<Utc>,
}

impl From<UserStatsEntity> for StatsSummary {
    fn from(stats: UserStatsEntity) -> Self {
        Self {
            average_moves: stats.average_moves(),
            user_id: stats.user_id,
            total_completions: stats.total_completions,
            total_moves: stats.total_moves,
            trophies: stats.trophies.into(),
            updated_at: stats.updated_at,
        }
    }
}
