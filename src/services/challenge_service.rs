use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::models::{ChallengeEntity, ChallengeStatus},
    error::ServiceError,
    state::SharedState,
};

/// The challenge currently being played.
pub async fn daily_challenge(state: &SharedState) -> Result<ChallengeEntity, ServiceError> {
    let store = state.require_game_store().await?;
    store
        .find_challenge_by_status(ChallengeStatus::Active)
        .await?
        .ok_or_else(|| ServiceError::NotFound("no active challenge".into()))
}

/// Count a hint against a challenge that is still playable.
pub async fn record_hint(
    state: &SharedState,
    challenge_id: Uuid,
) -> Result<ChallengeEntity, ServiceError> {
    let store = state.require_game_store().await?;
    let Some(challenge) = store.find_challenge(challenge_id).await? else {
        return Err(ServiceError::NotFound(format!(
            "unknown challenge `{challenge_id}`"
        )));
    };
    if challenge.status != ChallengeStatus::Active {
        return Err(ServiceError::InvalidState(format!(
            "challenge `{challenge_id}` is {}",
            challenge.status
        )));
    }

    let updated = store
        .increment_hints(challenge_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("unknown challenge `{challenge_id}`")))?;
    debug!(%challenge_id, hints_used = updated.hints_used, "hint recorded");
    Ok(updated)
}
