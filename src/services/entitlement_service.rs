//! Subscription entitlement reconciliation.
//!
//! Provider notifications arrive late, twice, or out of order. Every event is reduced
//! to a status through [`apply_event`], and a stored period end never moves backwards:
//! the decision rejects older events and the store re-checks the same rule on write.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::{
    dao::models::{EntitlementEntity, EntitlementStatus, SubscriptionPlan},
    dto::subscription::{SubscriptionNotification, VerifiedRenewalInfo, VerifiedTransaction},
    error::ServiceError,
    state::SharedState,
};

/// Outcome of reducing one event against the stored entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitlementDecision {
    pub status: EntitlementStatus,
    /// `false` when the event is stale and the stored state must be kept.
    pub should_update: bool,
    pub current_period_ends_at: Option<DateTime<Utc>>,
    pub auto_renew_enabled: bool,
}

/// Reduce a verified event against the stored state. Pure.
pub fn apply_event(
    transaction: &VerifiedTransaction,
    renewal: Option<&VerifiedRenewalInfo>,
    stored: Option<&EntitlementEntity>,
    now: DateTime<Utc>,
) -> EntitlementDecision {
    let expires = transaction.expires_date;

    if let Some(stored) = stored {
        if stored
            .current_period_ends_at
            .is_some_and(|stored_end| expires < stored_end)
        {
            return EntitlementDecision {
                status: stored.status,
                should_update: false,
                current_period_ends_at: stored.current_period_ends_at,
                auto_renew_enabled: stored.auto_renew_enabled,
            };
        }
    }

    let status = if transaction.revocation_date.is_some() {
        EntitlementStatus::Revoked
    } else if expires <= now {
        let grace_open = renewal
            .and_then(|info| info.grace_period_expires_date)
            .is_some_and(|grace_end| grace_end > now);
        let billing_retry = renewal.is_some_and(|info| info.is_in_billing_retry_period);
        if grace_open {
            EntitlementStatus::GracePeriod
        } else if billing_retry {
            EntitlementStatus::BillingRetry
        } else {
            EntitlementStatus::Expired
        }
    } else {
        EntitlementStatus::Active
    };

    EntitlementDecision {
        status,
        should_update: true,
        current_period_ends_at: Some(expires),
        auto_renew_enabled: renewal.is_none_or(|info| info.auto_renew_enabled),
    }
}

/// Result of handling one provider notification.
#[derive(Debug, Clone)]
pub struct NotificationOutcome {
    pub applied: bool,
    pub entitlement: EntitlementEntity,
}

/// Reconcile one verified notification into the stored entitlement.
pub async fn handle_notification(
    state: &SharedState,
    notification: SubscriptionNotification,
) -> Result<NotificationOutcome, ServiceError> {
    let store = state.require_game_store().await?;
    let subscriber_id = notification.subscriber_id;
    let stored = store.find_entitlement(subscriber_id.clone()).await?;

    let now = Utc::now();
    let decision = apply_event(
        &notification.transaction,
        notification.renewal_info.as_ref(),
        stored.as_ref(),
        now,
    );

    match stored {
        Some(stored) if !decision.should_update => {
            info!(
                %subscriber_id,
                incoming = %notification.transaction.expires_date,
                "stale entitlement event rejected"
            );
            return Ok(NotificationOutcome {
                applied: false,
                entitlement: stored,
            });
        }
        _ => {}
    }

    let candidate = EntitlementEntity {
        subscriber_id: subscriber_id.clone(),
        original_transaction_id: notification.transaction.original_transaction_id,
        status: decision.status,
        current_period_ends_at: decision.current_period_ends_at,
        auto_renew_enabled: decision.auto_renew_enabled,
        plan: SubscriptionPlan::from_product_id(&notification.transaction.product_id),
        updated_at: now,
    };

    if store.save_entitlement_if_newer(candidate.clone()).await? {
        debug!(
            %subscriber_id,
            status = ?candidate.status,
            "entitlement updated"
        );
        return Ok(NotificationOutcome {
            applied: true,
            entitlement: candidate,
        });
    }

    // A newer event landed between our read and our write.
    info!(%subscriber_id, "entitlement write lost to a newer event");
    let current = store
        .find_entitlement(subscriber_id.clone())
        .await?
        .ok_or_else(|| {
            ServiceError::InvalidState(format!(
                "entitlement for `{subscriber_id}` vanished after a rejected write"
            ))
        })?;
    Ok(NotificationOutcome {
        applied: false,
        entitlement: current,
    })
}

/// Stored entitlement for a subscriber.
pub async fn get_entitlement(
    state: &SharedState,
    subscriber_id: &str,
) -> Result<EntitlementEntity, ServiceError> {
    let store = state.require_game_store().await?;
    store
        .find_entitlement(subscriber_id.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no subscription for `{subscriber_id}`")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn transaction(expires: DateTime<Utc>) -> VerifiedTransaction {
        VerifiedTransaction {
            original_transaction_id: "1000000123".into(),
            product_id: "com.castchain.premium.monthly".into(),
            expires_date: expires,
            revocation_date: None,
            purchase_date: None,
        }
    }

    fn stored(decision: EntitlementDecision) -> EntitlementEntity {
        EntitlementEntity {
            subscriber_id: "sub-1".into(),
            original_transaction_id: "1000000123".into(),
            status: decision.status,
            current_period_ends_at: decision.current_period_ends_at,
            auto_renew_enabled: decision.auto_renew_enabled,
            plan: SubscriptionPlan::Monthly,
            updated_at: now(),
        }
    }

    fn renewal(grace: Option<DateTime<Utc>>, retry: bool) -> VerifiedRenewalInfo {
        VerifiedRenewalInfo {
            auto_renew_enabled: false,
            grace_period_expires_date: grace,
            is_in_billing_retry_period: retry,
        }
    }

    #[test]
    fn future_expiry_is_active_and_auto_renews_by_default() {
        let decision = apply_event(&transaction(now() + Duration::days(30)), None, None, now());
        assert!(decision.should_update);
        assert_eq!(decision.status, EntitlementStatus::Active);
        assert!(decision.auto_renew_enabled);
        assert_eq!(decision.current_period_ends_at, Some(now() + Duration::days(30)));
    }

    #[test]
    fn revocation_wins_over_everything() {
        let mut tx = transaction(now() + Duration::days(30));
        tx.revocation_date = Some(now());
        let info = renewal(Some(now() + Duration::days(3)), true);

        let decision = apply_event(&tx, Some(&info), None, now());
        assert_eq!(decision.status, EntitlementStatus::Revoked);
    }

    #[test]
    fn lapsed_subscription_statuses_follow_priority() {
        let tx = transaction(now() - Duration::hours(1));

        let grace = renewal(Some(now() + Duration::days(3)), true);
        assert_eq!(
            apply_event(&tx, Some(&grace), None, now()).status,
            EntitlementStatus::GracePeriod
        );

        let closed_grace = renewal(Some(now() - Duration::minutes(1)), true);
        assert_eq!(
            apply_event(&tx, Some(&closed_grace), None, now()).status,
            EntitlementStatus::BillingRetry
        );

        let nothing = renewal(None, false);
        let decision = apply_event(&tx, Some(&nothing), None, now());
        assert_eq!(decision.status, EntitlementStatus::Expired);
        assert!(!decision.auto_renew_enabled);
    }

    #[test]
    fn older_event_is_rejected_and_stored_state_echoed() {
        let newer = apply_event(&transaction(now() + Duration::days(60)), None, None, now());
        let current = stored(newer);

        let decision = apply_event(
            &transaction(now() + Duration::days(30)),
            Some(&renewal(None, false)),
            Some(&current),
            now(),
        );

        assert!(!decision.should_update);
        assert_eq!(decision.status, current.status);
        assert_eq!(decision.current_period_ends_at, current.current_period_ends_at);
        assert!(decision.auto_renew_enabled);
    }

    #[test]
    fn equal_expiry_is_reapplied() {
        let expires = now() + Duration::days(30);
        let current = stored(apply_event(&transaction(expires), None, None, now()));

        let mut tx = transaction(expires);
        tx.revocation_date = Some(now());
        let decision = apply_event(&tx, None, Some(&current), now());

        assert!(decision.should_update);
        assert_eq!(decision.status, EntitlementStatus::Revoked);
    }

    #[test]
    fn delivery_order_does_not_change_final_period_end() {
        let early = transaction(now() + Duration::days(30));
        let late = transaction(now() + Duration::days(60));

        let fold = |events: [&VerifiedTransaction; 2]| {
            let mut current: Option<EntitlementEntity> = None;
            for event in events {
                let decision = apply_event(event, None, current.as_ref(), now());
                if decision.should_update {
                    current = Some(stored(decision));
                }
            }
            current.and_then(|entity| entity.current_period_ends_at)
        };

        assert_eq!(fold([&early, &late]), Some(late.expires_date));
        assert_eq!(fold([&late, &early]), Some(late.expires_date));
    }
}
