mod common;

use std::collections::HashSet;

use cast_chain_back::{
    dao::{game_store::GameStore, models::ChallengeStatus},
    error::ServiceError,
    services::rotation_service::{ActiveSource, RotationScheduler},
};
use common::{challenge, day, harness};

fn count(store: &cast_chain_back::dao::game_store::memory::MemoryGameStore, status: ChallengeStatus) -> usize {
    store
        .challenges()
        .iter()
        .filter(|challenge| challenge.status == status)
        .count()
}

#[tokio::test]
async fn first_rotation_generates_fallback_and_tomorrow() {
    let h = harness().await;
    let today = day(2026, 5, 2);

    let report = RotationScheduler::new(h.state.clone())
        .rotate(today)
        .await
        .unwrap();

    assert_eq!(report.source, ActiveSource::Fallback);
    assert_eq!(report.active.date, today);
    assert_eq!(report.active.status, ChallengeStatus::Active);

    let next = report.next.expect("next challenge generated");
    assert_eq!(next.date, day(2026, 5, 3));
    assert_eq!(next.status, ChallengeStatus::Next);
    let active_actors: HashSet<u64> = report.active.actor_ids().into_iter().collect();
    assert!(next.actor_ids().iter().all(|id| !active_actors.contains(id)));

    let calls = h.generator.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].is_empty());
    assert_eq!(calls[1], active_actors);
}

#[tokio::test]
async fn promotes_next_and_archives_previous_active() {
    let h = harness().await;
    let yesterday = challenge(ChallengeStatus::Active, day(2026, 5, 1), (287, 1892));
    let queued = challenge(ChallengeStatus::Next, day(2026, 5, 2), (500, 1245));
    h.store.insert_challenge(yesterday.clone()).await.unwrap();
    h.store.insert_challenge(queued.clone()).await.unwrap();

    let report = RotationScheduler::new(h.state.clone())
        .rotate(day(2026, 5, 2))
        .await
        .unwrap();

    assert_eq!(report.source, ActiveSource::Promoted);
    assert_eq!(report.active.id, queued.id);
    assert_eq!(report.active.date, day(2026, 5, 2));

    let archived = h.store.find_challenge(yesterday.id).await.unwrap().unwrap();
    assert_eq!(archived.status, ChallengeStatus::Archived);

    let next = report.next.unwrap();
    assert_ne!(next.id, queued.id);
    assert_eq!(h.generator.calls(), vec![HashSet::from([500, 1245])]);
    assert_eq!(count(&h.store, ChallengeStatus::Active), 1);
    assert_eq!(count(&h.store, ChallengeStatus::Next), 1);
}

#[tokio::test]
async fn promotion_carries_the_rotation_date() {
    let h = harness().await;
    // Generated two days ago and never promoted because the server was down.
    let queued = challenge(ChallengeStatus::Next, day(2026, 4, 29), (500, 1245));
    h.store.insert_challenge(queued.clone()).await.unwrap();

    let report = RotationScheduler::new(h.state.clone())
        .rotate(day(2026, 5, 2))
        .await
        .unwrap();

    assert_eq!(report.source, ActiveSource::Promoted);
    assert_eq!(report.active.id, queued.id);
    let stored = h.store.find_challenge(queued.id).await.unwrap().unwrap();
    assert_eq!(stored.date, day(2026, 5, 2));
}

#[tokio::test]
async fn second_trigger_on_same_day_is_a_no_op() {
    let h = harness().await;
    let scheduler = RotationScheduler::new(h.state.clone());
    let today = day(2026, 5, 2);

    let first = scheduler.rotate(today).await.unwrap();
    let challenges_before = h.store.challenges().len();
    let calls_before = h.generator.calls().len();

    let second = scheduler.rotate(today).await.unwrap();

    assert_eq!(second.source, ActiveSource::AlreadyRotated);
    assert_eq!(second.active.id, first.active.id);
    assert_eq!(second.next.map(|c| c.id), first.next.map(|c| c.id));
    assert_eq!(h.store.challenges().len(), challenges_before);
    assert_eq!(h.generator.calls().len(), calls_before);
    assert_eq!(count(&h.store, ChallengeStatus::Archived), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_leave_one_active_challenge() {
    let h = harness().await;
    let yesterday = challenge(ChallengeStatus::Active, day(2026, 5, 1), (287, 1892));
    let queued = challenge(ChallengeStatus::Next, day(2026, 5, 2), (500, 1245));
    h.store.insert_challenge(yesterday).await.unwrap();
    h.store.insert_challenge(queued.clone()).await.unwrap();

    let today = day(2026, 5, 2);
    let a = RotationScheduler::new(h.state.clone());
    let b = RotationScheduler::new(h.state.clone());
    let (left, right) = tokio::join!(a.rotate(today), b.rotate(today));
    let (left, right) = (left.unwrap(), right.unwrap());

    let mut sources = [left.source, right.source];
    sources.sort_by_key(|source| source.as_str());
    assert_eq!(sources, [ActiveSource::AlreadyRotated, ActiveSource::Promoted]);
    assert_eq!(left.active.id, queued.id);
    assert_eq!(right.active.id, queued.id);
    assert_eq!(count(&h.store, ChallengeStatus::Active), 1);
    assert_eq!(count(&h.store, ChallengeStatus::Next), 1);
    assert_eq!(count(&h.store, ChallengeStatus::Archived), 1);
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let h = harness().await;
    let yesterday = challenge(ChallengeStatus::Active, day(2026, 5, 1), (287, 1892));
    let queued = challenge(ChallengeStatus::Next, day(2026, 5, 2), (500, 1245));
    h.store.insert_challenge(yesterday).await.unwrap();
    h.store.insert_challenge(queued.clone()).await.unwrap();

    h.store.simulate_outage(2);
    let report = RotationScheduler::new(h.state.clone())
        .rotate(day(2026, 5, 2))
        .await
        .unwrap();

    assert_eq!(report.source, ActiveSource::Promoted);
    assert_eq!(report.active.id, queued.id);
}

#[tokio::test]
async fn generator_outage_keeps_yesterday_playable() {
    let h = harness().await;
    let yesterday = challenge(ChallengeStatus::Active, day(2026, 5, 1), (287, 1892));
    h.store.insert_challenge(yesterday.clone()).await.unwrap();
    h.generator.fail(true);

    let result = RotationScheduler::new(h.state.clone())
        .rotate(day(2026, 5, 2))
        .await;

    assert!(matches!(result, Err(ServiceError::Generator(_))));
    let still_active = h
        .store
        .find_challenge_by_status(ChallengeStatus::Active)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(still_active.id, yesterday.id);
    assert_eq!(h.generator.calls(), vec![HashSet::from([287, 1892])]);

    // The next trigger, once the generator recovers, completes the rotation.
    h.generator.fail(false);
    let report = RotationScheduler::new(h.state.clone())
        .rotate(day(2026, 5, 2))
        .await
        .unwrap();
    assert_eq!(report.source, ActiveSource::Fallback);
    assert!(!report.active.actor_ids().iter().any(|id| [287, 1892].contains(id)));
    let archived = h.store.find_challenge(yesterday.id).await.unwrap().unwrap();
    assert_eq!(archived.status, ChallengeStatus::Archived);
}

#[tokio::test]
async fn next_generation_failure_is_tolerated() {
    let h = harness().await;
    let yesterday = challenge(ChallengeStatus::Active, day(2026, 5, 1), (287, 1892));
    let queued = challenge(ChallengeStatus::Next, day(2026, 5, 2), (500, 1245));
    h.store.insert_challenge(yesterday).await.unwrap();
    h.store.insert_challenge(queued.clone()).await.unwrap();
    h.generator.fail(true);

    let report = RotationScheduler::new(h.state.clone())
        .rotate(day(2026, 5, 2))
        .await
        .unwrap();

    assert_eq!(report.source, ActiveSource::Promoted);
    assert!(report.next.is_none());
    assert_eq!(count(&h.store, ChallengeStatus::Next), 0);
}

#[tokio::test]
async fn exhausted_promotion_falls_back_and_archives_yesterday() {
    let h = harness().await;
    let yesterday = challenge(ChallengeStatus::Active, day(2026, 5, 1), (287, 1892));
    let queued = challenge(ChallengeStatus::Next, day(2026, 5, 2), (500, 1245));
    h.store.insert_challenge(yesterday.clone()).await.unwrap();
    h.store.insert_challenge(queued).await.unwrap();

    // Every promotion attempt fails, then the first stale lookup fails too.
    h.store.simulate_outage(5);
    let today = day(2026, 5, 2);
    let report = RotationScheduler::new(h.state.clone())
        .rotate(today)
        .await
        .unwrap();

    assert_eq!(report.source, ActiveSource::Fallback);
    assert_ne!(report.active.id, yesterday.id);
    assert_eq!(report.active.date, today);

    let active = h
        .store
        .find_challenge_by_status(ChallengeStatus::Active)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, report.active.id);
    assert_eq!(active.date, today);
    assert_eq!(count(&h.store, ChallengeStatus::Active), 1);
    let archived = h.store.find_challenge(yesterday.id).await.unwrap().unwrap();
    assert_eq!(archived.status, ChallengeStatus::Archived);
    assert_eq!(h.generator.calls()[0], HashSet::from([287, 1892]));
}

#[tokio::test]
async fn exhausted_promotion_without_active_still_activates_today() {
    let h = harness().await;
    let today = day(2026, 5, 2);

    h.store.simulate_outage(4);
    let report = RotationScheduler::new(h.state.clone())
        .rotate(today)
        .await
        .unwrap();

    assert_eq!(report.source, ActiveSource::Fallback);
    assert_eq!(report.active.date, today);
    assert_eq!(count(&h.store, ChallengeStatus::Active), 1);
    assert_eq!(count(&h.store, ChallengeStatus::Archived), 0);
    assert!(h.generator.calls()[0].is_empty());
}

#[tokio::test]
async fn unreachable_store_fails_rotation_without_generating() {
    let h = harness().await;
    let yesterday = challenge(ChallengeStatus::Active, day(2026, 5, 1), (287, 1892));
    h.store.insert_challenge(yesterday.clone()).await.unwrap();

    // Promotion and the stale lookup both run out of attempts.
    h.store.simulate_outage(8);
    let result = RotationScheduler::new(h.state.clone())
        .rotate(day(2026, 5, 2))
        .await;

    assert!(matches!(result, Err(ServiceError::Unavailable(_))));
    assert!(h.generator.calls().is_empty());
    let still_active = h.store.find_challenge(yesterday.id).await.unwrap().unwrap();
    assert_eq!(still_active.status, ChallengeStatus::Active);
}
