use std::{collections::HashSet, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Url};

use super::{ActorPair, GeneratorError, PairGenerator};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches actor pairs from a remote generation service (`GET {base}/pairs?exclude=..`).
#[derive(Debug, Clone)]
pub struct HttpPairGenerator {
    client: Client,
    endpoint: Url,
}

impl HttpPairGenerator {
    /// Build a generator targeting `base_url`.
    pub fn new(base_url: &str) -> Result<Self, GeneratorError> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("pairs"))
            .map_err(|err| GeneratorError::InvalidPair(format!("invalid generator url: {err}")))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(GeneratorError::Request)?;
        Ok(Self { client, endpoint })
    }
}

fn exclude_param(exclude: &HashSet<u64>) -> String {
    let mut ids: Vec<u64> = exclude.iter().copied().collect();
    ids.sort_unstable();
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl PairGenerator for HttpPairGenerator {
    fn generate(&self, exclude: HashSet<u64>) -> BoxFuture<'static, Result<ActorPair, GeneratorError>> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        Box::pin(async move {
            let pair = client
                .get(endpoint)
                .query(&[("exclude", exclude_param(&exclude))])
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(GeneratorError::Request)?
                .json::<ActorPair>()
                .await
                .map_err(GeneratorError::Request)?;
            pair.check(&exclude)
        })
    }
}
