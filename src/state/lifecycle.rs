use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{ChallengeEntity, ChallengeStatus};

/// Error returned when a status change is not part of the challenge lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: challenge cannot move from {from} to {to}")]
pub struct InvalidTransition {
    /// Status the challenge is currently in.
    pub from: ChallengeStatus,
    /// Requested status.
    pub to: ChallengeStatus,
}

/// Validate a single lifecycle step: `next → active → archived`.
pub fn check_transition(from: ChallengeStatus, to: ChallengeStatus) -> Result<(), InvalidTransition> {
    match (from, to) {
        (ChallengeStatus::Next, ChallengeStatus::Active)
        | (ChallengeStatus::Active, ChallengeStatus::Archived) => Ok(()),
        (from, to) => Err(InvalidTransition { from, to }),
    }
}

/// What a rotation trigger has to do, computed from the current `active`/`next` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPlan {
    /// The active challenge already belongs to `today`; nothing to promote.
    AlreadyRotated,
    /// Archive the current active challenge (if any) and promote the next one.
    Promote {
        archive: Option<Uuid>,
        promote: Uuid,
    },
    /// No next challenge exists: one must be generated for today, after which the
    /// stale active challenge (if any) is archived.
    Fallback { archive: Option<Uuid> },
}

/// Decide how to rotate for the civil date `today`.
pub fn plan_rotation(
    active: Option<&ChallengeEntity>,
    next: Option<&ChallengeEntity>,
    today: NaiveDate,
) -> RotationPlan {
    if active.is_some_and(|challenge| challenge.date == today) {
        return RotationPlan::AlreadyRotated;
    }

    let archive = active.map(|challenge| challenge.id);
    match next {
        Some(next) => RotationPlan::Promote {
            archive,
            promote: next.id,
        },
        None => RotationPlan::Fallback { archive },
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::dao::models::Difficulty;

    fn challenge(status: ChallengeStatus, date: NaiveDate) -> ChallengeEntity {
        ChallengeEntity {
            id: Uuid::new_v4(),
            date,
            status,
            start_actor_id: 1,
            end_actor_id: 2,
            start_actor_name: "A".into(),
            end_actor_name: "B".into(),
            estimated_moves: None,
            difficulty: Difficulty::Normal,
            hints_used: 0,
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn lifecycle_only_moves_forward() {
        assert!(check_transition(ChallengeStatus::Next, ChallengeStatus::Active).is_ok());
        assert!(check_transition(ChallengeStatus::Active, ChallengeStatus::Archived).is_ok());

        let err = check_transition(ChallengeStatus::Archived, ChallengeStatus::Active).unwrap_err();
        assert_eq!(err.from, ChallengeStatus::Archived);
        assert_eq!(err.to, ChallengeStatus::Active);
        assert!(check_transition(ChallengeStatus::Next, ChallengeStatus::Archived).is_err());
    }

    #[test]
    fn promotes_next_and_archives_stale_active() {
        let active = challenge(ChallengeStatus::Active, day(1));
        let next = challenge(ChallengeStatus::Next, day(2));

        assert_eq!(
            plan_rotation(Some(&active), Some(&next), day(2)),
            RotationPlan::Promote {
                archive: Some(active.id),
                promote: next.id
            }
        );
    }

    #[test]
    fn active_for_today_is_already_rotated() {
        let active = challenge(ChallengeStatus::Active, day(2));
        let next = challenge(ChallengeStatus::Next, day(3));

        assert_eq!(
            plan_rotation(Some(&active), Some(&next), day(2)),
            RotationPlan::AlreadyRotated
        );
    }

    #[test]
    fn missing_next_falls_back() {
        let active = challenge(ChallengeStatus::Active, day(1));

        assert_eq!(
            plan_rotation(Some(&active), None, day(2)),
            RotationPlan::Fallback {
                archive: Some(active.id)
            }
        );
        assert_eq!(
            plan_rotation(None, None, day(2)),
            RotationPlan::Fallback { archive: None }
        );
    }

    #[test]
    fn first_ever_rotation_promotes_without_archiving() {
        let next = challenge(ChallengeStatus::Next, day(2));
        assert_eq!(
            plan_rotation(None, Some(&next), day(2)),
            RotationPlan::Promote {
                archive: None,
                promote: next.id
            }
        );
    }
}
