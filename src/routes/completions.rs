use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::completion::{CompletionRequest, CompletionResponse, CompletionSummary},
    error::AppError,
    routes::identity::UserId,
    services::completion_service::{self, Submission},
    state::SharedState,
};

/// Completion submission and lookup endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/completions", post(submit_completion))
        .route("/challenges/{id}/completion", get(get_completion))
}

/// Record a solved chain; repeated submissions return the original record.
#[utoipa::path(
    post,
    path = "/completions",
    tag = "completions",
    params(("X-User-Id" = String, Header, description = "Authenticated user identifier")),
    request_body = CompletionRequest,
    responses(
        (status = 201, description = "Completion recorded", body = CompletionResponse),
        (status = 200, description = "Completion already recorded", body = CompletionResponse),
        (status = 400, description = "Invalid moves or unknown challenge"),
        (status = 401, description = "Missing user identity")
    )
)]
pub async fn submit_completion(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Valid(Json(payload)): Valid<Json<CompletionRequest>>,
) -> Result<(StatusCode, Json<CompletionResponse>), AppError> {
    let outcome = completion_service::record_completion(
        &state,
        Submission {
            user_id,
            challenge_id: payload.challenge_id,
            moves: payload.moves,
            connections: payload.connections,
        },
    )
    .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.into())))
}

/// The caller's completion for a challenge.
#[utoipa::path(
    get,
    path = "/challenges/{id}/completion",
    tag = "completions",
    params(
        ("X-User-Id" = String, Header, description = "Authenticated user identifier"),
        ("id" = String, Path, description = "Identifier of the challenge")
    ),
    responses(
        (status = 200, description = "Stored completion", body = CompletionSummary),
        (status = 404, description = "Challenge not completed by the caller")
    )
)]
pub async fn get_completion(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionSummary>, AppError> {
    let record = completion_service::get_completion(&state, &user_id, id).await?;
    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, Utc};
    use serde_json::json;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::{GameStore, memory::MemoryGameStore},
            models::{ChallengeEntity, ChallengeStatus, Difficulty},
        },
        services::generator::PoolPairGenerator,
        state::AppState,
    };

    async fn state_with_challenge() -> (SharedState, Uuid) {
        let config = AppConfig::default();
        let generator = PoolPairGenerator::new(config.actor_pool().to_vec(), Difficulty::Normal);
        let state = AppState::new(config, Arc::new(generator));
        let store = MemoryGameStore::new();
        let challenge = ChallengeEntity {
            id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            status: ChallengeStatus::Active,
            start_actor_id: 287,
            end_actor_id: 1892,
            start_actor_name: "Brad Pitt".into(),
            end_actor_name: "Matt Damon".into(),
            estimated_moves: Some(4),
            difficulty: Difficulty::Normal,
            hints_used: 0,
            created_at: Utc::now(),
        };
        store.insert_challenge(challenge.clone()).await.unwrap();
        state.install_game_store(Arc::new(store)).await;
        (state, challenge.id)
    }

    async fn submit(state: &SharedState, challenge_id: Uuid) -> (StatusCode, CompletionResponse) {
        let request = CompletionRequest {
            challenge_id,
            moves: 3,
            connections: json!([{ "movieId": 550, "actorId": 819 }]),
        };
        let (status, Json(body)) = submit_completion(
            State(state.clone()),
            UserId("user-42".into()),
            Valid(Json(request)),
        )
        .await
        .unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn first_submission_is_created_then_ok() {
        let (state, challenge_id) = state_with_challenge().await;

        let (status, body) = submit(&state, challenge_id).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.created);
        assert_eq!(body.stats.total_completions, 1);

        let (status, again) = submit(&state, challenge_id).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!again.created);
        assert_eq!(again.completion.id, body.completion.id);
        assert_eq!(again.stats.total_moves, 3);
    }
}
