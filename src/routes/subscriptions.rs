use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::subscription::{EntitlementSummary, NotificationResponse, SubscriptionNotification},
    error::AppError,
    routes::identity::UserId,
    services::entitlement_service,
    state::SharedState,
};

/// Subscription notification intake and entitlement lookup.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/subscriptions/notifications", post(receive_notification))
        .route("/subscriptions/me", get(my_entitlement))
}

/// Reconcile a verified provider notification.
#[utoipa::path(
    post,
    path = "/subscriptions/notifications",
    tag = "subscriptions",
    request_body = SubscriptionNotification,
    responses(
        (status = 200, description = "Notification reconciled; `applied` is false for stale events", body = NotificationResponse),
        (status = 400, description = "Malformed notification")
    )
)]
pub async fn receive_notification(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SubscriptionNotification>>,
) -> Result<Json<NotificationResponse>, AppError> {
    let outcome = entitlement_service::handle_notification(&state, payload).await?;
    Ok(Json(NotificationResponse {
        applied: outcome.applied,
        entitlement: outcome.entitlement.into(),
    }))
}

/// The caller's current entitlement.
#[utoipa::path(
    get,
    path = "/subscriptions/me",
    tag = "subscriptions",
    params(("X-User-Id" = String, Header, description = "Authenticated user identifier")),
    responses(
        (status = 200, description = "Current entitlement", body = EntitlementSummary),
        (status = 404, description = "Caller never subscribed")
    )
)]
pub async fn my_entitlement(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
) -> Result<Json<EntitlementSummary>, AppError> {
    let entitlement = entitlement_service::get_entitlement(&state, &user_id).await?;
    Ok(Json(entitlement.into()))
}
