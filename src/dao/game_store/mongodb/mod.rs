//! MongoDB-backed [`GameStore`](crate::dao::game_store::GameStore).
//!
//! Every invariant-guarding write is a single-document conditional operation, and the
//! unique indexes created at connect time turn lost races into duplicate-key errors.

mod config;
mod connection;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoGameStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Duplicate { collection, key } => {
                StorageError::conflict(format!("{collection}:{key}"))
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
