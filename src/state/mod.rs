pub mod lifecycle;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::{
    config::AppConfig, dao::game_store::GameStore, error::ServiceError,
    services::generator::PairGenerator,
};

pub type SharedState = Arc<AppState>;

/// Process-wide state: storage handle, configuration and the collaborators the
/// scheduler and services need. Built once in `main` and shared by reference.
pub struct AppState {
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    generator: Arc<dyn PairGenerator>,
    rotation_gate: Mutex<()>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, generator: Arc<dyn PairGenerator>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            generator,
            rotation_gate: Mutex::new(()),
        })
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current game store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_game_store(&self) -> Result<Arc<dyn GameStore>, ServiceError> {
        self.game_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Actor-pair generator used for new challenges.
    pub fn generator(&self) -> Arc<dyn PairGenerator> {
        Arc::clone(&self.generator)
    }

    /// Serializes rotation triggers fired within this process.
    pub fn rotation_gate(&self) -> &Mutex<()> {
        &self.rotation_gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::game_store::memory::MemoryGameStore, dao::models::Difficulty,
        services::generator::PoolPairGenerator,
    };

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode() {
        let config = AppConfig::default();
        let generator = PoolPairGenerator::new(config.actor_pool().to_vec(), Difficulty::Normal);
        let state = AppState::new(config, Arc::new(generator));
        let mut watcher = state.degraded_watcher();

        assert!(state.is_degraded());
        assert!(matches!(
            state.require_game_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_game_store(Arc::new(MemoryGameStore::new()))
            .await;

        assert!(!state.is_degraded());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_game_store().await.is_ok());
    }
}
