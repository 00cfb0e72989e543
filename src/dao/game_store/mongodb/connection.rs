use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};
use crate::config::RetryPolicy;

/// Build a client and wait until the server answers `ping`, backing off between tries.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
    policy: RetryPolicy,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempt = 1;
    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => return Ok((client, database)),
            Err(source) if attempt >= policy.max_attempts => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                debug!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "MongoDB ping failed; retrying");
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
