use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::stats::StatsSummary, error::AppError, routes::identity::UserId,
    services::completion_service, state::SharedState,
};

/// Statistics endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route("/stats/me", get(my_stats))
}

/// Aggregate statistics for the caller.
#[utoipa::path(
    get,
    path = "/stats/me",
    tag = "stats",
    params(("X-User-Id" = String, Header, description = "Authenticated user identifier")),
    responses((status = 200, description = "Caller statistics", body = StatsSummary))
)]
pub async fn my_stats(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
) -> Result<Json<StatsSummary>, AppError> {
    let stats = completion_service::get_stats(&state, &user_id).await?;
    Ok(Json(stats.into()))
}
