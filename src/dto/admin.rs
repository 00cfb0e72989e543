//! DTO definitions used by the admin REST API and documentation layer.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::challenge::ChallengeSummary,
    services::{completion_service::DedupReport, rotation_service::RotationReport},
};

/// Result of a manually triggered rotation.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RotationResponse {
    #[schema(value_type = String, format = Date)]
    pub date: NaiveDate,
    /// `promoted`, `already_rotated` or `fallback`.
    pub source: String,
    pub active: ChallengeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<ChallengeSummary>,
}

impl From<RotationReport> for RotationResponse {
    fn from(report: RotationReport) -> Self {
        Self {
            date: report.date,
            source: report.source.as_str().to_owned(),
            active: report.active.into(),
            next: report.next.map(Into::into),
        }
    }
}

/// Result of the one-time completion dedup.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DedupResponse {
    pub removed: Vec<Uuid>,
    pub rebuilt_users: Vec<String>,
}

impl From<DedupReport> for DedupResponse {
    fn from(report: DedupReport) -> Self {
        Self {
            removed: report.removed,
            rebuilt_users: report.rebuilt_users,
        }
    }
}
