use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dao::models::{EntitlementEntity, EntitlementStatus, SubscriptionPlan};

/// Transaction payload, already verified by the signing collaborator.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedTransaction {
    #[validate(length(min = 1, max = 128))]
    pub original_transaction_id: String,
    #[validate(length(min = 1, max = 256))]
    pub product_id: String,
    pub expires_date: DateTime<Utc>,
    #[serde(default)]
    pub revocation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
}

/// Renewal information attached to some notifications.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedRenewalInfo {
    pub auto_renew_enabled: bool,
    #[serde(default)]
    pub grace_period_expires_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_in_billing_retry_period: bool,
}

/// Inbound provider notification, decoded and verified upstream.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionNotification {
    #[validate(length(min = 1, max = 128))]
    pub subscriber_id: String,
    #[validate(nested)]
    pub transaction: VerifiedTransaction,
    #[serde(default)]
    pub renewal_info: Option<VerifiedRenewalInfo>,
}

/// Public projection of a subscriber's entitlement.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSummary {
    pub status: EntitlementStatus,
    pub has_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_ends_at: Option<DateTime<Utc>>,
    pub auto_renew_enabled: bool,
    pub plan: SubscriptionPlan,
    pub updated_at: DateTime<Utc>,
}

impl From<EntitlementEntity> for EntitlementSummary {
    fn from(entity: EntitlementEntity) -> Self {
        Self {
            has_access: entity.status.grants_access(),
            status: entity.status,
            current_period_ends_at: entity.current_period_ends_at,
            auto_renew_enabled: entity.auto_renew_enabled,
            plan: entity.plan,
            updated_at: entity.updated_at,
        }
    }
}

/// Response for `POST /subscriptions/notifications`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    /// `false` when the event was older than the stored state and ignored.
    pub applied: bool,
    pub entitlement: EntitlementSummary,
}
