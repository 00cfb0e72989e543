#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use cast_chain_back::{
    config::{AppConfig, RetryPolicy},
    dao::{
        game_store::memory::MemoryGameStore,
        models::{ChallengeEntity, ChallengeStatus, Difficulty},
    },
    services::generator::{ActorPair, GeneratorError, PairGenerator, PoolPairGenerator},
    state::{AppState, SharedState},
};
use chrono::{NaiveDate, Utc};
use futures::future::{self, BoxFuture};
use uuid::Uuid;

/// Pool generator that records every exclusion set and can be switched off.
pub struct RecordingGenerator {
    inner: PoolPairGenerator,
    failing: AtomicBool,
    calls: Mutex<Vec<HashSet<u64>>>,
}

impl RecordingGenerator {
    pub fn new() -> Arc<Self> {
        let config = AppConfig::default();
        Arc::new(Self {
            inner: PoolPairGenerator::new(config.actor_pool().to_vec(), Difficulty::Normal),
            failing: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HashSet<u64>> {
        self.calls.lock().unwrap().clone()
    }
}

impl PairGenerator for RecordingGenerator {
    fn generate(&self, exclude: HashSet<u64>) -> BoxFuture<'static, Result<ActorPair, GeneratorError>> {
        self.calls.lock().unwrap().push(exclude.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Box::pin(future::ready(Err(GeneratorError::PoolExhausted {
                available: 0,
            })));
        }
        self.inner.generate(exclude)
    }
}

pub struct Harness {
    pub state: SharedState,
    pub store: MemoryGameStore,
    pub generator: Arc<RecordingGenerator>,
}

/// Application state over a fresh memory store with a fast retry policy.
pub async fn harness() -> Harness {
    let config = AppConfig::default()
        .with_rotation_retry(RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
        })
        .with_admin_token(Some("secret".into()));
    let generator = RecordingGenerator::new();
    let state = AppState::new(config, generator.clone());
    let store = MemoryGameStore::new();
    state.install_game_store(Arc::new(store.clone())).await;

    Harness {
        state,
        store,
        generator,
    }
}

pub fn day(year: i32, month: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, d).unwrap()
}

pub fn challenge(status: ChallengeStatus, date: NaiveDate, actors: (u64, u64)) -> ChallengeEntity {
    ChallengeEntity {
        id: Uuid::new_v4(),
        date,
        status,
        start_actor_id: actors.0,
        end_actor_id: actors.1,
        start_actor_name: format!("Actor {}", actors.0),
        end_actor_name: format!("Actor {}", actors.1),
        estimated_moves: Some(4),
        difficulty: Difficulty::Normal,
        hints_used: 0,
        created_at: Utc::now(),
    }
}
