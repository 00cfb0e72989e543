use std::collections::HashSet;

use futures::future::{self, BoxFuture};
use rand::seq::IndexedRandom;

use super::{Actor, ActorPair, GeneratorError, PairGenerator};
use crate::{config::PoolActor, dao::models::Difficulty};

/// Picks two distinct random actors from a fixed pool.
#[derive(Debug, Clone)]
pub struct PoolPairGenerator {
    actors: Vec<PoolActor>,
    difficulty: Difficulty,
}

impl PoolPairGenerator {
    pub fn new(actors: Vec<PoolActor>, difficulty: Difficulty) -> Self {
        Self { actors, difficulty }
    }

    fn pick(&self, exclude: &HashSet<u64>) -> Result<ActorPair, GeneratorError> {
        let candidates: Vec<&PoolActor> = self
            .actors
            .iter()
            .filter(|actor| !exclude.contains(&actor.id))
            .collect();

        let mut rng = rand::rng();
        let chosen: Vec<&&PoolActor> = candidates.choose_multiple(&mut rng, 2).collect();
        let [start, end] = chosen.as_slice() else {
            return Err(GeneratorError::PoolExhausted {
                available: candidates.len(),
            });
        };

        ActorPair {
            start: Actor {
                id: start.id,
                name: start.name.clone(),
            },
            end: Actor {
                id: end.id,
                name: end.name.clone(),
            },
            difficulty: self.difficulty,
            estimated_moves: None,
        }
        .check(exclude)
    }
}

impl PairGenerator for PoolPairGenerator {
    fn generate(&self, exclude: HashSet<u64>) -> BoxFuture<'static, Result<ActorPair, GeneratorError>> {
        Box::pin(future::ready(self.pick(&exclude)))
    }
}
