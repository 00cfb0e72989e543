mod common;

use cast_chain_back::{
    dao::models::{EntitlementStatus, SubscriptionPlan},
    dto::subscription::{SubscriptionNotification, VerifiedRenewalInfo, VerifiedTransaction},
    error::ServiceError,
    services::entitlement_service,
};
use chrono::{DateTime, Duration, Utc};
use common::harness;

fn notification(expires: DateTime<Utc>, renewal: Option<VerifiedRenewalInfo>) -> SubscriptionNotification {
    SubscriptionNotification {
        subscriber_id: "sub-1".into(),
        transaction: VerifiedTransaction {
            original_transaction_id: "2000000456".into(),
            product_id: "com.castchain.premium.annual".into(),
            expires_date: expires,
            revocation_date: None,
            purchase_date: None,
        },
        renewal_info: renewal,
    }
}

#[tokio::test]
async fn first_notification_creates_entitlement() {
    let h = harness().await;
    let expires = Utc::now() + Duration::days(365);

    let outcome = entitlement_service::handle_notification(&h.state, notification(expires, None))
        .await
        .unwrap();

    assert!(outcome.applied);
    assert_eq!(outcome.entitlement.status, EntitlementStatus::Active);
    assert_eq!(outcome.entitlement.plan, SubscriptionPlan::Annual);
    assert!(outcome.entitlement.auto_renew_enabled);

    let stored = entitlement_service::get_entitlement(&h.state, "sub-1").await.unwrap();
    assert_eq!(stored.current_period_ends_at, Some(expires));
}

#[tokio::test]
async fn late_older_event_does_not_regress_period_end() {
    let h = harness().await;
    let older = Utc::now() + Duration::days(30);
    let newer = Utc::now() + Duration::days(60);

    entitlement_service::handle_notification(&h.state, notification(newer, None))
        .await
        .unwrap();
    let late = entitlement_service::handle_notification(
        &h.state,
        notification(
            older,
            Some(VerifiedRenewalInfo {
                auto_renew_enabled: false,
                grace_period_expires_date: None,
                is_in_billing_retry_period: false,
            }),
        ),
    )
    .await
    .unwrap();

    assert!(!late.applied);
    assert_eq!(late.entitlement.current_period_ends_at, Some(newer));
    assert!(late.entitlement.auto_renew_enabled);

    let stored = entitlement_service::get_entitlement(&h.state, "sub-1").await.unwrap();
    assert_eq!(stored.current_period_ends_at, Some(newer));
}

#[tokio::test]
async fn delivery_order_converges_on_newest_expiry() {
    let older = Utc::now() + Duration::days(30);
    let newer = Utc::now() + Duration::days(60);

    for order in [[older, newer], [newer, older]] {
        let h = harness().await;
        for expires in order {
            entitlement_service::handle_notification(&h.state, notification(expires, None))
                .await
                .unwrap();
        }
        let stored = entitlement_service::get_entitlement(&h.state, "sub-1").await.unwrap();
        assert_eq!(stored.current_period_ends_at, Some(newer));
    }
}

#[tokio::test]
async fn lapsed_subscription_in_grace_period_keeps_access() {
    let h = harness().await;
    let outcome = entitlement_service::handle_notification(
        &h.state,
        notification(
            Utc::now() - Duration::hours(2),
            Some(VerifiedRenewalInfo {
                auto_renew_enabled: true,
                grace_period_expires_date: Some(Utc::now() + Duration::days(6)),
                is_in_billing_retry_period: true,
            }),
        ),
    )
    .await
    .unwrap();

    assert_eq!(outcome.entitlement.status, EntitlementStatus::GracePeriod);
    assert!(outcome.entitlement.status.grants_access());
}

#[tokio::test]
async fn unknown_subscriber_is_not_found() {
    let h = harness().await;
    let result = entitlement_service::get_entitlement(&h.state, "nobody").await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));
}
