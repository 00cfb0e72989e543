//! Application-level configuration loading: civil time zone, rotation retry policy,
//! move bounds and the built-in actor pool.

use std::{env, fs, io::ErrorKind, ops::RangeInclusive, path::PathBuf, time::Duration};

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::Difficulty;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CAST_CHAIN_CONFIG_PATH";
/// Environment variable holding the token required by admin routes.
const ADMIN_TOKEN_ENV: &str = "ADMIN_TOKEN";
/// Zone whose local midnight drives the daily rotation.
const DEFAULT_ZONE: Tz = chrono_tz::America::New_York;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const DEFAULT_MIN_MOVES: u8 = 1;
const DEFAULT_MAX_MOVES: u8 = 6;

/// An actor the built-in pair generator may pick from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolActor {
    /// TMDB person id.
    pub id: u64,
    pub name: String,
}

/// Bounded exponential backoff used around transient store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one.
    pub max_attempts: u32,
    /// Delay before the second try; doubled for each following try.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    zone: Tz,
    rotation_retry: RetryPolicy,
    moves: RangeInclusive<u8>,
    default_difficulty: Difficulty,
    actor_pool: Vec<PoolActor>,
    admin_token: Option<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        zone = %config.zone,
                        actors = config.actor_pool.len(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.with_admin_token(env::var(ADMIN_TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }

    /// Parse a JSON configuration document; missing fields keep their defaults.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Replace the admin token.
    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token;
        self
    }

    /// Replace the rotation retry policy.
    pub fn with_rotation_retry(mut self, policy: RetryPolicy) -> Self {
        self.rotation_retry = policy;
        self
    }

    /// Civil time zone whose local midnight triggers the rotation.
    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn rotation_retry(&self) -> RetryPolicy {
        self.rotation_retry
    }

    /// Inclusive range of moves a completion may report.
    pub fn moves(&self) -> RangeInclusive<u8> {
        self.moves.clone()
    }

    pub fn default_difficulty(&self) -> Difficulty {
        self.default_difficulty
    }

    pub fn actor_pool(&self) -> &[PoolActor] {
        &self.actor_pool
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            zone: DEFAULT_ZONE,
            rotation_retry: RetryPolicy::default(),
            moves: DEFAULT_MIN_MOVES..=DEFAULT_MAX_MOVES,
            default_difficulty: Difficulty::Normal,
            actor_pool: default_actor_pool(),
            admin_token: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    time_zone: Option<String>,
    #[serde(default)]
    rotation: RawRotation,
    min_moves: Option<u8>,
    max_moves: Option<u8>,
    default_difficulty: Option<Difficulty>,
    actors: Option<Vec<PoolActor>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRotation {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let zone = match value.time_zone {
            Some(name) => name.parse::<Tz>().unwrap_or_else(|err| {
                warn!(zone = %name, error = %err, "unknown time zone; using default");
                DEFAULT_ZONE
            }),
            None => defaults.zone,
        };

        let min = value
            .min_moves
            .unwrap_or(DEFAULT_MIN_MOVES)
            .clamp(1, DEFAULT_MAX_MOVES);
        let max = value
            .max_moves
            .unwrap_or(DEFAULT_MAX_MOVES)
            .clamp(min, DEFAULT_MAX_MOVES);

        let actor_pool = match value.actors {
            Some(actors) if actors.len() >= 2 => actors,
            Some(actors) => {
                warn!(
                    count = actors.len(),
                    "actor pool needs at least two actors; using built-in pool"
                );
                defaults.actor_pool
            }
            None => defaults.actor_pool,
        };

        Self {
            zone,
            rotation_retry: RetryPolicy {
                max_attempts: value.rotation.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1),
                base_delay: Duration::from_millis(
                    value.rotation.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS),
                ),
            },
            moves: min..=max,
            default_difficulty: value.default_difficulty.unwrap_or(defaults.default_difficulty),
            actor_pool,
            admin_token: None,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in actor pool shipped with the binary.
fn default_actor_pool() -> Vec<PoolActor> {
    [
        (31, "Tom Hanks"),
        (112, "Cate Blanchett"),
        (192, "Morgan Freeman"),
        (287, "Brad Pitt"),
        (1204, "Julia Roberts"),
        (1245, "Scarlett Johansson"),
        (2231, "Samuel L. Jackson"),
        (4724, "Kevin Bacon"),
        (5064, "Meryl Streep"),
        (5292, "Denzel Washington"),
        (6384, "Keanu Reeves"),
        (19492, "Viola Davis"),
    ]
    .into_iter()
    .map(|(id, name)| PoolActor {
        id,
        name: name.to_owned(),
    })
    .collect()
}
