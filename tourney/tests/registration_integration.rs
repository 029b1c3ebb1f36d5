//! Integration tests for registration, waitlist, refunds and check-in.

mod common;

use chrono::Duration;
use common::{Harness, JUDGE, ORGANIZER, epoch, player};
use tourney::registration::{RegistrationManager, RegistrationStatus};
use tourney::tournament::{Actor, TournamentConfig, TournamentFormat, TournamentPolicy};

fn paid(capacity: u32) -> TournamentConfig {
    TournamentConfig::new("Paid", TournamentFormat::Swiss, capacity).with_entry_fee(1_500)
}

#[tokio::test]
async fn test_waitlist_promotion_on_cancel() {
    let h = Harness::new();
    let t = h.open_tournament(paid(2)).await;
    let registrations = &h.engine.registrations;

    let first = registrations.register(t.id, player(1)).await.unwrap();
    let second = registrations.register(t.id, player(2)).await.unwrap();
    let third = registrations.register(t.id, player(3)).await.unwrap();
    assert_eq!(first.status, RegistrationStatus::Pending);
    assert_eq!(second.status, RegistrationStatus::Pending);
    assert_eq!(third.status, RegistrationStatus::WaitingList);

    let cancellation = registrations.cancel(t.id, player(1)).await.unwrap();
    assert_eq!(cancellation.registration.status, RegistrationStatus::Cancelled);
    // Unpaid entries have nothing to refund
    assert_eq!(cancellation.refund_percent, 0);

    let promoted = cancellation.promoted.unwrap();
    assert_eq!(promoted.id, third.id);
    assert_eq!(promoted.status, RegistrationStatus::Pending);

    let confirmed = registrations.confirm_payment(promoted.id).await.unwrap();
    assert_eq!(confirmed.status, RegistrationStatus::Confirmed);
    let err = registrations.confirm_payment(promoted.id).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");
}

#[tokio::test]
async fn test_waitlisted_cancel_does_not_promote() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Free", TournamentFormat::Swiss, 2))
        .await;
    let registrations = &h.engine.registrations;
    for n in 1..=4 {
        registrations.register(t.id, player(n)).await.unwrap();
    }

    let cancellation = registrations.cancel(t.id, player(3)).await.unwrap();
    assert!(cancellation.promoted.is_none());

    let waiting: Vec<_> = registrations
        .list_registrations(t.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.status == RegistrationStatus::WaitingList)
        .collect();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].player_id, player(4));
}

#[tokio::test]
async fn test_refund_follows_policy_tiers() {
    let h = Harness::new();
    let start = epoch() + Duration::hours(72);
    let t = h.open_tournament(paid(8).with_start(start)).await;
    let registrations = &h.engine.registrations;

    for n in 1..=3 {
        let registration = registrations.register(t.id, player(n)).await.unwrap();
        registrations.confirm_payment(registration.id).await.unwrap();
    }

    let early = registrations.cancel(t.id, player(1)).await.unwrap();
    assert_eq!(early.refund_percent, 100);

    h.clock.set(start - Duration::hours(30));
    let late = registrations.cancel(t.id, player(2)).await.unwrap();
    assert_eq!(late.refund_percent, 50);

    h.clock.set(start - Duration::hours(2));
    let last_minute = registrations.cancel(t.id, player(3)).await.unwrap();
    assert_eq!(last_minute.refund_percent, 0);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Free", TournamentFormat::Swiss, 8))
        .await;
    let registrations = &h.engine.registrations;

    let registration = registrations.register(t.id, player(1)).await.unwrap();
    assert_eq!(registration.status, RegistrationStatus::Confirmed);
    assert_eq!(registration.display_name, format!("player-{}", player(1)));

    let err = registrations.register(t.id, player(1)).await.unwrap_err();
    assert_eq!(err.code(), "precondition_failed");

    // A cancelled player may come back
    registrations.cancel(t.id, player(1)).await.unwrap();
    let again = registrations.register(t.id, player(1)).await.unwrap();
    assert_ne!(again.id, registration.id);
}

#[tokio::test]
async fn test_registration_requires_open_window() {
    let h = Harness::new();
    let tournaments = &h.engine.tournaments;
    let t = tournaments
        .create_tournament(
            &ORGANIZER,
            TournamentConfig::new("Draft", TournamentFormat::Swiss, 8),
        )
        .await
        .unwrap();

    let err = h
        .engine
        .registrations
        .register(t.id, player(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_state");

    tournaments.publish(t.id, &ORGANIZER).await.unwrap();
    tournaments.open_registration(t.id, &ORGANIZER).await.unwrap();
    tournaments.close_registration(t.id, &ORGANIZER).await.unwrap();

    let err = h
        .engine
        .registrations
        .register(t.id, player(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_state");
}

#[tokio::test]
async fn test_full_tournament_without_waitlist() {
    let h = Harness::new();
    let policy = TournamentPolicy {
        allow_waitlist: false,
        ..TournamentPolicy::default()
    };
    let t = h
        .open_tournament(
            TournamentConfig::new("Tight", TournamentFormat::Swiss, 2).with_policy(policy),
        )
        .await;
    let registrations = &h.engine.registrations;

    registrations.register(t.id, player(1)).await.unwrap();
    registrations.register(t.id, player(2)).await.unwrap();
    let err = registrations.register(t.id, player(3)).await.unwrap_err();
    assert_eq!(err.code(), "precondition_failed");
}

#[tokio::test]
async fn test_concurrent_registrations_respect_capacity() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Rush", TournamentFormat::Swiss, 4))
        .await;
    let registrations = &h.engine.registrations;

    let results = register_concurrently(registrations, t.id, 8).await;
    let seated = results
        .iter()
        .filter(|status| **status == RegistrationStatus::Confirmed)
        .count();
    let waiting = results
        .iter()
        .filter(|status| **status == RegistrationStatus::WaitingList)
        .count();
    assert_eq!((seated, waiting), (4, 4));
}

async fn register_concurrently(
    registrations: &RegistrationManager,
    tournament_id: i64,
    players: i64,
) -> Vec<RegistrationStatus> {
    let mut handles = Vec::new();
    for n in 1..=players {
        let registrations = registrations.clone();
        handles.push(tokio::spawn(async move {
            registrations.register(tournament_id, player(n)).await
        }));
    }
    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap().unwrap().status);
    }
    statuses
}

#[tokio::test]
async fn test_check_in_requires_payment() {
    let h = Harness::new();
    let t = h.open_tournament(paid(8)).await;
    let registrations = &h.engine.registrations;
    registrations.register(t.id, player(1)).await.unwrap();
    let settled = registrations.register(t.id, player(2)).await.unwrap();
    registrations.confirm_payment(settled.id).await.unwrap();

    let err = registrations.check_in(t.id, player(2)).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");

    h.engine
        .tournaments
        .open_check_in(t.id, &ORGANIZER)
        .await
        .unwrap();
    let err = registrations.check_in(t.id, player(1)).await.unwrap_err();
    assert_eq!(err.code(), "precondition_failed");

    let checked_in = registrations.check_in(t.id, player(2)).await.unwrap();
    assert_eq!(checked_in.status, RegistrationStatus::CheckedIn);
}

#[tokio::test]
async fn test_staff_check_in_needs_staff() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Staff", TournamentFormat::Swiss, 8))
        .await;
    let registrations = &h.engine.registrations;
    registrations.register(t.id, player(1)).await.unwrap();
    registrations.register(t.id, player(2)).await.unwrap();

    let tournaments = &h.engine.tournaments;
    tournaments.open_check_in(t.id, &ORGANIZER).await.unwrap();
    registrations.check_in(t.id, player(1)).await.unwrap();

    let err = registrations
        .staff_check_in(t.id, &Actor::player(player(1)), player(2))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "permission_denied");

    let late = registrations
        .staff_check_in(t.id, &JUDGE, player(2))
        .await
        .unwrap();
    assert_eq!(late.status, RegistrationStatus::CheckedIn);
}

#[tokio::test]
async fn test_dropped_player_leaves_the_pairings() {
    let h = Harness::new();
    let t = h
        .running_tournament(TournamentConfig::new("Drop", TournamentFormat::Swiss, 8), 4)
        .await;
    let registrations = &h.engine.registrations;

    let err = registrations.cancel(t.id, player(4)).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");

    let dropped = registrations.drop(t.id, player(4)).await.unwrap();
    assert_eq!(dropped.status, RegistrationStatus::Dropped);

    h.settle_open(t.id, |_| true).await;
    let round = h.next_round(t.id).await;
    assert_eq!(round.matches.len(), 2);
    assert!(round.matches.iter().all(|m| !m.involves(dropped.id)));
    assert_eq!(round.matches.iter().filter(|m| m.is_bye()).count(), 1);
}
