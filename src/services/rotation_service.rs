//! Daily challenge rotation: `next → active → archived` at local midnight.

use std::{collections::HashSet, future::Future, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    config::RetryPolicy,
    dao::{
        game_store::GameStore,
        models::{ChallengeEntity, ChallengeStatus},
        storage::{StorageError, StorageResult},
    },
    error::ServiceError,
    services::generator::ActorPair,
    state::{
        SharedState,
        lifecycle::{self, RotationPlan},
    },
};

/// How today's active challenge came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveSource {
    /// Yesterday's `next` challenge was promoted.
    Promoted,
    /// An earlier trigger already rotated today.
    AlreadyRotated,
    /// No `next` challenge was usable and one was generated on demand.
    Fallback,
}

impl ActiveSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ActiveSource::Promoted => "promoted",
            ActiveSource::AlreadyRotated => "already_rotated",
            ActiveSource::Fallback => "fallback",
        }
    }
}

/// Result of a rotation trigger.
#[derive(Debug, Clone)]
pub struct RotationReport {
    pub date: NaiveDate,
    pub source: ActiveSource,
    pub active: ChallengeEntity,
    /// Tomorrow's challenge; `None` when generation failed and will be retried next cycle.
    pub next: Option<ChallengeEntity>,
}

enum Promotion {
    Done(ActiveSource, ChallengeEntity),
    NeedsFallback { stale: Option<ChallengeEntity> },
}

/// Rotation component constructed once at startup and driven by a single timer task.
#[derive(Clone)]
pub struct RotationScheduler {
    state: SharedState,
    policy: RetryPolicy,
    zone: Tz,
}

impl RotationScheduler {
    pub fn new(state: SharedState) -> Self {
        let policy = state.config().rotation_retry();
        let zone = state.config().zone();
        Self {
            state,
            policy,
            zone,
        }
    }

    /// Civil date of `now` in the rotation zone.
    pub fn civil_date(&self, now: DateTime<Utc>) -> NaiveDate {
        civil_date(now, self.zone)
    }

    /// Start the timer loop. Aborting the returned handle stops the scheduler.
    pub fn spawn(self, rotate_on_startup: bool) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(rotate_on_startup).await })
    }

    async fn run(self, rotate_on_startup: bool) {
        if rotate_on_startup {
            let mut degraded = self.state.degraded_watcher();
            if degraded.wait_for(|degraded| !*degraded).await.is_ok() {
                let today = self.civil_date(Utc::now());
                self.trigger(today).await;
            }
        }

        loop {
            let (at, date) = next_midnight(Utc::now(), self.zone);
            let wait = (at - Utc::now()).to_std().unwrap_or_default();
            info!(%date, zone = %self.zone, wait_secs = wait.as_secs(), "next rotation scheduled");
            sleep(wait).await;
            self.trigger(date).await;
        }
    }

    async fn trigger(&self, date: NaiveDate) {
        match self.rotate(date).await {
            Ok(report) => info!(
                %date,
                source = ?report.source,
                active = %report.active.id,
                next = ?report.next.as_ref().map(|c| c.id),
                "rotation finished"
            ),
            Err(err) => error!(%date, error = %err, "rotation failed; serving previous challenge"),
        }
    }

    /// Rotate challenges for the civil date `today`.
    ///
    /// Re-running for a date that was already rotated is a no-op.
    pub async fn rotate(&self, today: NaiveDate) -> Result<RotationReport, ServiceError> {
        let _gate = self.state.rotation_gate().lock().await;
        let store = self.state.require_game_store().await?;
        info!(%today, "rotation triggered");

        let promotion = match self
            .with_retry("promote", || promote(store.as_ref(), today))
            .await
        {
            Ok(promotion) => promotion,
            Err(err) => {
                error!(%today, error = %err, "promotion failed after retries; generating fallback");
                let active = self
                    .with_retry("find active", || {
                        store.find_challenge_by_status(ChallengeStatus::Active)
                    })
                    .await?;
                match active {
                    Some(active) if active.date == today => {
                        Promotion::Done(ActiveSource::AlreadyRotated, active)
                    }
                    stale => Promotion::NeedsFallback { stale },
                }
            }
        };

        let (source, active) = match promotion {
            Promotion::Done(source, active) => (source, active),
            Promotion::NeedsFallback { stale } => {
                self.generate_fallback(&store, today, stale).await?
            }
        };

        let next = self.ensure_next(&store, today, &active).await;

        Ok(RotationReport {
            date: today,
            source,
            active,
            next,
        })
    }

    /// Run `op` with bounded exponential backoff on transient store failures.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store failure; retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Create today's active challenge directly when nothing could be promoted.
    ///
    /// The stale active challenge is archived only once a replacement exists, so a
    /// generator outage keeps yesterday's challenge playable.
    async fn generate_fallback(
        &self,
        store: &Arc<dyn GameStore>,
        today: NaiveDate,
        stale: Option<ChallengeEntity>,
    ) -> Result<(ActiveSource, ChallengeEntity), ServiceError> {
        let exclude: HashSet<u64> = stale
            .iter()
            .flat_map(|challenge| challenge.actor_ids())
            .collect();
        warn!(%today, excluded = ?exclude, "no next challenge to promote; invoking fallback generation");

        let pair = self.state.generator().generate(exclude).await.map_err(|err| {
            error!(%today, error = %err, "fallback generation failed");
            ServiceError::from(err)
        })?;
        let fresh = new_challenge(pair, ChallengeStatus::Active, today);

        let mut displaced = stale;
        for _ in 0..self.policy.max_attempts {
            if let Some(stale) = displaced.take() {
                self.with_retry("archive stale", || {
                    transition(store.as_ref(), stale.id, ChallengeStatus::Active, ChallengeStatus::Archived, None)
                })
                .await?;
                info!(challenge_id = %stale.id, date = %stale.date, "archived stale active challenge");
            }

            match self
                .with_retry("insert fallback", || store.insert_challenge(fresh.clone()))
                .await
            {
                Ok(()) => {
                    info!(challenge_id = %fresh.id, %today, "fallback challenge activated");
                    return Ok((ActiveSource::Fallback, fresh));
                }
                Err(StorageError::Conflict { .. }) => {
                    let holder = self
                        .with_retry("find active", || {
                            store.find_challenge_by_status(ChallengeStatus::Active)
                        })
                        .await?;
                    match holder {
                        Some(winner) if winner.date == today => {
                            info!(challenge_id = %winner.id, "concurrent trigger activated a challenge first");
                            return Ok((ActiveSource::AlreadyRotated, winner));
                        }
                        Some(stale) => {
                            warn!(challenge_id = %stale.id, date = %stale.date, "stale challenge still active; archiving before retry");
                            displaced = Some(stale);
                        }
                        None => debug!(%today, "active slot freed; retrying fallback insert"),
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServiceError::InvalidState(format!(
            "could not activate a challenge for {today}"
        )))
    }

    /// Make sure tomorrow's challenge exists. Failures are logged and tolerated: the
    /// following rotation falls back to on-demand generation.
    async fn ensure_next(
        &self,
        store: &Arc<dyn GameStore>,
        today: NaiveDate,
        active: &ChallengeEntity,
    ) -> Option<ChallengeEntity> {
        match store.find_challenge_by_status(ChallengeStatus::Next).await {
            Ok(Some(existing)) => {
                debug!(challenge_id = %existing.id, "next challenge already present");
                return Some(existing);
            }
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "could not look up next challenge; skipping generation");
                return None;
            }
        }

        let exclude: HashSet<u64> = active.actor_ids().into_iter().collect();
        let pair = match self.state.generator().generate(exclude).await {
            Ok(pair) => pair,
            Err(err) => {
                error!(error = %err, "next challenge generation failed; will fall back next cycle");
                return None;
            }
        };

        let tomorrow = today.succ_opt().unwrap_or(today);
        let next = new_challenge(pair, ChallengeStatus::Next, tomorrow);
        match self
            .with_retry("insert next", || store.insert_challenge(next.clone()))
            .await
        {
            Ok(()) => {
                info!(challenge_id = %next.id, date = %tomorrow, "next challenge generated");
                Some(next)
            }
            Err(StorageError::Conflict { .. }) => store
                .find_challenge_by_status(ChallengeStatus::Next)
                .await
                .ok()
                .flatten(),
            Err(err) => {
                error!(error = %err, "failed to persist next challenge");
                None
            }
        }
    }
}

/// Single promotion attempt; safe to repeat after a partial failure.
async fn promote(store: &dyn GameStore, today: NaiveDate) -> StorageResult<Promotion> {
    let active = store.find_challenge_by_status(ChallengeStatus::Active).await?;
    let next = store.find_challenge_by_status(ChallengeStatus::Next).await?;

    match lifecycle::plan_rotation(active.as_ref(), next.as_ref(), today) {
        RotationPlan::AlreadyRotated => {
            let active = active.ok_or_else(|| StorageError::conflict("active challenge"))?;
            debug!(%today, challenge_id = %active.id, "already rotated today");
            Ok(Promotion::Done(ActiveSource::AlreadyRotated, active))
        }
        RotationPlan::Promote { archive, promote } => {
            if let Some(id) = archive {
                if transition(store, id, ChallengeStatus::Active, ChallengeStatus::Archived, None).await? {
                    info!(challenge_id = %id, "archived previous active challenge");
                }
            }

            if transition(store, promote, ChallengeStatus::Next, ChallengeStatus::Active, Some(today)).await? {
                let mut promoted = next.ok_or_else(|| StorageError::conflict("next challenge"))?;
                promoted.status = ChallengeStatus::Active;
                promoted.date = today;
                info!(challenge_id = %promoted.id, %today, "promoted next challenge to active");
                return Ok(Promotion::Done(ActiveSource::Promoted, promoted));
            }

            match store.find_challenge_by_status(ChallengeStatus::Active).await? {
                Some(active) if active.date == today => {
                    Ok(Promotion::Done(ActiveSource::AlreadyRotated, active))
                }
                stale => Ok(Promotion::NeedsFallback { stale }),
            }
        }
        RotationPlan::Fallback { .. } => Ok(Promotion::NeedsFallback { stale: active }),
    }
}

/// Validated compare-and-set of a challenge status.
async fn transition(
    store: &dyn GameStore,
    id: Uuid,
    from: ChallengeStatus,
    to: ChallengeStatus,
    date: Option<NaiveDate>,
) -> StorageResult<bool> {
    if let Err(invalid) = lifecycle::check_transition(from, to) {
        error!(challenge_id = %id, error = %invalid, "refusing lifecycle transition");
        return Ok(false);
    }
    store.transition_challenge(id, from, to, date).await
}

fn new_challenge(pair: ActorPair, status: ChallengeStatus, date: NaiveDate) -> ChallengeEntity {
    ChallengeEntity {
        id: Uuid::new_v4(),
        date,
        status,
        start_actor_id: pair.start.id,
        end_actor_id: pair.end.id,
        start_actor_name: pair.start.name,
        end_actor_name: pair.end.name,
        estimated_moves: pair.estimated_moves,
        difficulty: pair.difficulty,
        hints_used: 0,
        created_at: Utc::now(),
    }
}

/// Civil date of `now` in `zone`.
pub fn civil_date(now: DateTime<Utc>, zone: Tz) -> NaiveDate {
    now.with_timezone(&zone).date_naive()
}

/// Next local midnight in `zone` strictly after `now`, with the civil date it starts.
///
/// When midnight does not exist locally (a DST jump at 00:00), the first valid local
/// instant after it is used.
pub fn next_midnight(now: DateTime<Utc>, zone: Tz) -> (DateTime<Utc>, NaiveDate) {
    let today = civil_date(now, zone);
    let tomorrow = today.succ_opt().unwrap_or(today);
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    let at = (0..=4)
        .map(|half_hours| midnight + TimeDelta::minutes(30 * half_hours))
        .find_map(|local| zone.from_local_datetime(&local).earliest())
        .map(|instant| instant.with_timezone(&Utc))
        .unwrap_or_else(|| now + TimeDelta::days(1));

    (at, tomorrow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn civil_date_follows_zone_not_utc() {
        let zone = chrono_tz::America::New_York;
        // 03:00 UTC is still the previous evening in New York.
        assert_eq!(
            civil_date(utc(2026, 7, 10, 3, 0), zone),
            NaiveDate::from_ymd_opt(2026, 7, 9).unwrap()
        );
    }

    #[test]
    fn midnight_uses_daylight_offset_in_summer() {
        let zone = chrono_tz::America::New_York;
        let (at, date) = next_midnight(utc(2026, 7, 10, 12, 0), zone);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 7, 11).unwrap());
        assert_eq!(at, utc(2026, 7, 11, 4, 0));
    }

    #[test]
    fn midnight_uses_standard_offset_in_winter() {
        let zone = chrono_tz::America::New_York;
        let (at, _) = next_midnight(utc(2026, 1, 10, 12, 0), zone);
        assert_eq!(at, utc(2026, 1, 11, 5, 0));
    }

    #[test]
    fn midnight_after_dst_change_day() {
        let zone = chrono_tz::America::New_York;
        // Clocks go forward on 2026-03-08 at 02:00; the following midnight is EDT.
        let (at, date) = next_midnight(utc(2026, 3, 8, 12, 0), zone);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
        assert_eq!(at, utc(2026, 3, 9, 4, 0));
    }

    #[test]
    fn missing_local_midnight_uses_first_valid_instant() {
        // Santiago springs forward at local midnight in September.
        let zone = chrono_tz::America::Santiago;
        let (at, date) = next_midnight(utc(2026, 9, 5, 12, 0), zone);
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 9, 6).unwrap());
        assert_eq!(civil_date(at, zone), date);
        assert!(at > utc(2026, 9, 5, 12, 0));
    }
}
