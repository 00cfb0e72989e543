//! Actor-pair generation used to create new challenges.

#[cfg(feature = "http-generator")]
pub mod http;
pub mod pool;

use std::collections::HashSet;

use futures::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;

use crate::dao::models::Difficulty;

#[cfg(feature = "http-generator")]
pub use http::HttpPairGenerator;
pub use pool::PoolPairGenerator;

/// An actor as returned by a generator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Actor {
    pub id: u64,
    pub name: String,
}

/// A start/end actor pair plus the metadata a challenge needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorPair {
    #[serde(rename = "actor1")]
    pub start: Actor,
    #[serde(rename = "actor2")]
    pub end: Actor,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub estimated_moves: Option<u8>,
}

impl ActorPair {
    /// Reject pairs that reuse an excluded actor or connect an actor to itself.
    pub fn check(self, exclude: &HashSet<u64>) -> Result<Self, GeneratorError> {
        if self.start.id == self.end.id {
            return Err(GeneratorError::InvalidPair(format!(
                "start and end actor are both {}",
                self.start.id
            )));
        }
        if let Some(reused) = [self.start.id, self.end.id]
            .into_iter()
            .find(|id| exclude.contains(id))
        {
            return Err(GeneratorError::InvalidPair(format!(
                "actor {reused} was excluded"
            )));
        }
        Ok(self)
    }
}

/// Failures raised while generating an actor pair.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Not enough actors remain once exclusions are applied.
    #[error("actor pool exhausted ({available} actor(s) available after exclusions)")]
    PoolExhausted { available: usize },
    /// The provider answered with a pair that breaks the generation contract.
    #[error("invalid actor pair: {0}")]
    InvalidPair(String),
    /// The remote provider could not be reached or answered with an error.
    #[cfg(feature = "http-generator")]
    #[error("pair provider request failed")]
    Request(#[source] reqwest::Error),
}

/// Produces fresh actor pairs for challenges.
pub trait PairGenerator: Send + Sync {
    /// Generate a pair that uses none of the `exclude` actor ids.
    fn generate(&self, exclude: HashSet<u64>) -> BoxFuture<'static, Result<ActorPair, GeneratorError>>;
}
