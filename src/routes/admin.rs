use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::post,
};
use chrono::Utc;

use crate::{
    dto::admin::{DedupResponse, RotationResponse},
    error::AppError,
    services::{completion_service, rotation_service::RotationScheduler},
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Operator endpoints guarded by the configured admin token.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/rotation", post(trigger_rotation))
        .route("/admin/completions/dedup", post(dedup_completions))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Run the daily rotation now; a no-op when today is already active.
#[utoipa::path(
    post,
    path = "/admin/rotation",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses(
        (status = 200, description = "Rotation report", body = RotationResponse),
        (status = 502, description = "Pair generator failed during fallback")
    )
)]
pub async fn trigger_rotation(
    State(state): State<SharedState>,
) -> Result<Json<RotationResponse>, AppError> {
    let scheduler = RotationScheduler::new(state);
    let today = scheduler.civil_date(Utc::now());
    let report = scheduler.rotate(today).await?;
    Ok(Json(report.into()))
}

/// Remove duplicate completions and rebuild the affected statistics.
#[utoipa::path(
    post,
    path = "/admin/completions/dedup",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    responses((status = 200, description = "Dedup report", body = DedupResponse))
)]
pub async fn dedup_completions(
    State(state): State<SharedState>,
) -> Result<Json<DedupResponse>, AppError> {
    let report = completion_service::dedup_completions(&state).await?;
    Ok(Json(report.into()))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    match state.config().admin_token() {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized("admin endpoints are disabled".into())),
    }
}
