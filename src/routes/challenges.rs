use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::challenge::ChallengeSummary, error::AppError, services::challenge_service,
    state::SharedState,
};

/// Challenge read and hint endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/challenges/daily", get(daily_challenge))
        .route("/challenges/{id}/hints", post(record_hint))
}

/// Return today's active challenge.
#[utoipa::path(
    get,
    path = "/challenges/daily",
    tag = "challenges",
    responses(
        (status = 200, description = "Active challenge", body = ChallengeSummary),
        (status = 404, description = "No challenge is active yet"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn daily_challenge(
    State(state): State<SharedState>,
) -> Result<Json<ChallengeSummary>, AppError> {
    let challenge = challenge_service::daily_challenge(&state).await?;
    Ok(Json(challenge.into()))
}

/// Count a hint used on the active challenge.
#[utoipa::path(
    post,
    path = "/challenges/{id}/hints",
    tag = "challenges",
    params(("id" = String, Path, description = "Identifier of the challenge")),
    responses(
        (status = 200, description = "Updated challenge", body = ChallengeSummary),
        (status = 404, description = "Unknown challenge"),
        (status = 409, description = "Challenge is not active")
    )
)]
pub async fn record_hint(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChallengeSummary>, AppError> {
    let challenge = challenge_service::record_hint(&state, id).await?;
    Ok(Json(challenge.into()))
}
