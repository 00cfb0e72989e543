use axum::Router;

use crate::state::SharedState;

pub mod admin;
pub mod challenges;
pub mod completions;
pub mod docs;
pub mod health;
pub mod identity;
pub mod stats;
pub mod subscriptions;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(challenges::router())
        .merge(completions::router())
        .merge(stats::router())
        .merge(subscriptions::router())
        .merge(admin::router(state.clone()));

    api_router.merge(docs::router()).with_state(state)
}
