use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("duplicate key `{key}` in collection `{collection}`")]
    Duplicate {
        collection: &'static str,
        key: String,
    },
    #[error("{operation} on collection `{collection}` failed")]
    Query {
        collection: &'static str,
        operation: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("malformed document in collection `{collection}`: {reason}")]
    Decode {
        collection: &'static str,
        reason: String,
    },
}

impl MongoDaoError {
    /// Classify a driver error raised by a write, turning unique-index violations into
    /// [`MongoDaoError::Duplicate`].
    pub fn from_write(
        collection: &'static str,
        operation: &'static str,
        key: impl Into<String>,
        source: MongoError,
    ) -> Self {
        if is_duplicate_key(&source) {
            MongoDaoError::Duplicate {
                collection,
                key: key.into(),
            }
        } else {
            MongoDaoError::Query {
                collection,
                operation,
                source,
            }
        }
    }
}

/// Whether the server rejected a write because of a unique index.
///
/// Single-document writes report it as a write error; `findAndModify` upserts report it
/// as a command error.
pub fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY_CODE,
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}
