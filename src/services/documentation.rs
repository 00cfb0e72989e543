use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Cast Chain Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::challenges::daily_challenge,
        crate::routes::challenges::record_hint,
        crate::routes::completions::submit_completion,
        crate::routes::completions::get_completion,
        crate::routes::stats::my_stats,
        crate::routes::subscriptions::receive_notification,
        crate::routes::subscriptions::my_entitlement,
        crate::routes::admin::trigger_rotation,
        crate::routes::admin::dedup_completions,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::challenge::ChallengeSummary,
            crate::dto::challenge::ActorSummary,
            crate::dto::completion::CompletionRequest,
            crate::dto::completion::CompletionResponse,
            crate::dto::completion::CompletionSummary,
            crate::dto::completion::StatsTotals,
            crate::dto::stats::StatsSummary,
            crate::dto::stats::TrophyCountsSummary,
            crate::dto::subscription::SubscriptionNotification,
            crate::dto::subscription::VerifiedTransaction,
            crate::dto::subscription::VerifiedRenewalInfo,
            crate::dto::subscription::NotificationResponse,
            crate::dto::subscription::EntitlementSummary,
            crate::dto::admin::RotationResponse,
            crate::dto::admin::DedupResponse,
            crate::dao::models::ChallengeStatus,
            crate::dao::models::Difficulty,
            crate::dao::models::TrophyTier,
            crate::dao::models::EntitlementStatus,
            crate::dao::models::SubscriptionPlan,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "challenges", description = "Daily challenge and hints"),
        (name = "completions", description = "Exactly-once completion ledger"),
        (name = "stats", description = "Per-user statistics"),
        (name = "subscriptions", description = "Subscription entitlement reconciliation"),
        (name = "admin", description = "Operator endpoints"),
    )
)]
pub struct ApiDoc;
