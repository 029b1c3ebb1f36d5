//! Integration tests for the tournament lifecycle and its time windows.

mod common;

use chrono::Duration;
use common::{Harness, JUDGE, ORGANIZER, epoch, player};
use tourney::collaborators::{CreditRecord, PrizeService};
use tourney::db::MatchRepository;
use tourney::registration::{Registration, RegistrationStatus};
use tourney::tournament::{Actor, TournamentConfig, TournamentFormat, TournamentStatus};

#[tokio::test]
async fn test_windows_follow_the_clock() {
    let h = Harness::new();
    let start = epoch() + Duration::hours(24);
    let mut config = TournamentConfig::new("Scheduled", TournamentFormat::Swiss, 8).with_start(start);
    config.registration_opens_at = Some(epoch() + Duration::hours(1));
    config.registration_closes_at = Some(epoch() + Duration::hours(10));

    let tournaments = &h.engine.tournaments;
    let registrations = &h.engine.registrations;
    let t = tournaments.create_tournament(&ORGANIZER, config).await.unwrap();
    tournaments.publish(t.id, &ORGANIZER).await.unwrap();
    assert_eq!(
        tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::Published
    );

    h.clock.set(epoch() + Duration::hours(2));
    assert_eq!(
        tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::RegOpen
    );
    for n in 1..=3 {
        registrations.register(t.id, player(n)).await.unwrap();
    }

    h.clock.set(epoch() + Duration::hours(11));
    assert_eq!(
        tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::RegClosed
    );

    h.clock.set(start - Duration::minutes(30));
    assert_eq!(
        tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::CheckinOpen
    );
    registrations.check_in(t.id, player(1)).await.unwrap();
    registrations.check_in(t.id, player(2)).await.unwrap();

    h.clock.set(start);
    assert_eq!(
        tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::CheckinClosed
    );
    assert_eq!(h.decklists.locked().await, vec![t.id]);

    let no_show = registrations
        .list_registrations(t.id)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.player_id == player(3))
        .unwrap();
    assert_eq!(no_show.status, RegistrationStatus::NoShow);

    let running = tournaments.start(t.id, &ORGANIZER).await.unwrap();
    assert_eq!(running.status, TournamentStatus::Running);
    assert_eq!(h.decklists.locked().await, vec![t.id, t.id]);
    assert_eq!(h.open_matches(t.id).await.len(), 1);
}

#[tokio::test]
async fn test_failed_check_in_close_can_be_repeated() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Flaky", TournamentFormat::Swiss, 2))
        .await;
    let registrations = &h.engine.registrations;
    for n in 1..=3 {
        registrations.register(t.id, player(n)).await.unwrap();
    }

    let tournaments = &h.engine.tournaments;
    tournaments.open_check_in(t.id, &ORGANIZER).await.unwrap();
    registrations.check_in(t.id, player(1)).await.unwrap();

    h.decklists.fail_next(1).await;
    let err = tournaments.close_check_in(t.id, &ORGANIZER).await.unwrap_err();
    assert_eq!(err.code(), "internal");
    assert_eq!(
        tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::CheckinOpen
    );
    let status_of = |regs: &[Registration], n: i64| {
        regs.iter()
            .find(|r| r.player_id == player(n))
            .map(|r| r.status)
            .unwrap()
    };
    let regs = registrations.list_registrations(t.id).await.unwrap();
    assert_eq!(status_of(&regs, 2), RegistrationStatus::Confirmed);
    assert_eq!(status_of(&regs, 3), RegistrationStatus::WaitingList);

    let closed = tournaments.close_check_in(t.id, &ORGANIZER).await.unwrap();
    assert_eq!(closed.status, TournamentStatus::CheckinClosed);
    let regs = registrations.list_registrations(t.id).await.unwrap();
    assert_eq!(status_of(&regs, 2), RegistrationStatus::NoShow);
    assert_eq!(status_of(&regs, 3), RegistrationStatus::Confirmed);
    assert_eq!(h.decklists.locked().await, vec![t.id]);
}

#[tokio::test]
async fn test_registration_window_skipped_when_already_closed() {
    let h = Harness::new();
    let mut config = TournamentConfig::new("Missed", TournamentFormat::Swiss, 8);
    config.registration_opens_at = Some(epoch() + Duration::hours(1));
    config.registration_closes_at = Some(epoch() + Duration::hours(2));

    let tournaments = &h.engine.tournaments;
    let t = tournaments.create_tournament(&ORGANIZER, config).await.unwrap();
    tournaments.publish(t.id, &ORGANIZER).await.unwrap();

    h.clock.set(epoch() + Duration::hours(3));
    assert_eq!(
        tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::Published
    );
}

#[tokio::test]
async fn test_no_show_seat_goes_to_waitlist() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Small", TournamentFormat::Swiss, 2))
        .await;
    let registrations = &h.engine.registrations;
    for n in 1..=3 {
        registrations.register(t.id, player(n)).await.unwrap();
    }

    let tournaments = &h.engine.tournaments;
    tournaments.open_check_in(t.id, &ORGANIZER).await.unwrap();
    registrations.check_in(t.id, player(1)).await.unwrap();
    tournaments.close_check_in(t.id, &ORGANIZER).await.unwrap();

    let status_of = |regs: &[Registration], n: i64| {
        regs.iter()
            .find(|r| r.player_id == player(n))
            .map(|r| r.status)
            .unwrap()
    };
    let regs = registrations.list_registrations(t.id).await.unwrap();
    assert_eq!(status_of(&regs, 2), RegistrationStatus::NoShow);
    assert_eq!(status_of(&regs, 3), RegistrationStatus::Confirmed);

    // The promoted player missed the window; staff can still admit them
    let err = registrations.check_in(t.id, player(3)).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");
    registrations
        .staff_check_in(t.id, &JUDGE, player(3))
        .await
        .unwrap();

    let running = tournaments.start(t.id, &ORGANIZER).await.unwrap();
    assert_eq!(running.status, TournamentStatus::Running);
}

#[tokio::test]
async fn test_check_in_cannot_open_early() {
    let h = Harness::new();
    let start = epoch() + Duration::hours(24);
    let t = h
        .open_tournament(TournamentConfig::new("Early", TournamentFormat::Swiss, 8).with_start(start))
        .await;

    let err = h
        .engine
        .tournaments
        .open_check_in(t.id, &ORGANIZER)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "precondition_failed");

    // Once the window is due the clock opens it before any organizer call
    h.clock.set(start - Duration::minutes(45));
    let err = h
        .engine
        .tournaments
        .open_check_in(t.id, &ORGANIZER)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_state");
    assert_eq!(
        h.engine.tournaments.get(t.id).await.unwrap().status,
        TournamentStatus::CheckinOpen
    );
}

#[tokio::test]
async fn test_start_needs_two_players() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Lonely", TournamentFormat::Swiss, 8))
        .await;
    let registrations = &h.engine.registrations;
    registrations.register(t.id, player(1)).await.unwrap();
    registrations.register(t.id, player(2)).await.unwrap();

    let tournaments = &h.engine.tournaments;
    tournaments.open_check_in(t.id, &ORGANIZER).await.unwrap();
    registrations.check_in(t.id, player(1)).await.unwrap();

    let err = tournaments.start(t.id, &ORGANIZER).await.unwrap_err();
    assert_eq!(err.code(), "precondition_failed");
}

#[tokio::test]
async fn test_only_organizer_or_admin_manage() {
    let h = Harness::new();
    let tournaments = &h.engine.tournaments;
    let t = tournaments
        .create_tournament(
            &ORGANIZER,
            TournamentConfig::new("Owned", TournamentFormat::Swiss, 8),
        )
        .await
        .unwrap();

    for intruder in [Actor::player(555), JUDGE] {
        let err = tournaments.publish(t.id, &intruder).await.unwrap_err();
        assert_eq!(err.code(), "permission_denied");
    }

    let published = tournaments.publish(t.id, &Actor::admin(2)).await.unwrap();
    assert_eq!(published.status, TournamentStatus::Published);
    assert_eq!(published.config.swiss_rounds, Some(3));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let h = Harness::new();
    let mut config = TournamentConfig::swiss_with_top_cut("Cut", 8, 4);
    config.top_cut_size = Some(6);

    let err = h
        .engine
        .tournaments
        .create_tournament(&ORGANIZER, config)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_input");
}

#[tokio::test]
async fn test_finish_issues_prize_to_champion() {
    let h = Harness::new();
    let config = TournamentConfig::new("Prize", TournamentFormat::Swiss, 8).with_prize_credit(2_500);
    let t = h.running_tournament(config, 4).await;
    for round in 1..=3 {
        if round > 1 {
            h.next_round(t.id).await;
        }
        h.settle_open(t.id, |_| true).await;
    }

    let result = h.engine.tournaments.finish(t.id, &ORGANIZER).await.unwrap();
    assert_eq!(result.tournament.status, TournamentStatus::Finished);
    assert!(result.prize_issued);

    let champion = &result.standings[0];
    assert_eq!(champion.rank, 1);
    assert_eq!(champion.wins, 3);
    assert_eq!(
        h.prizes.credits().await,
        vec![CreditRecord {
            tournament_id: t.id,
            player_id: champion.player_id,
            amount_cents: 2_500,
        }]
    );

    let err = h.engine.tournaments.finish(t.id, &ORGANIZER).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");
    let err = h.engine.tournaments.cancel(t.id, &ORGANIZER).await.unwrap_err();
    assert_eq!(err.code(), "invalid_state");
}

#[tokio::test]
async fn test_grand_final_challenger_takes_the_prize() {
    let h = Harness::new();
    let config =
        TournamentConfig::new("Double", TournamentFormat::DoubleElimination, 8).with_prize_credit(100);
    let t = h.running_tournament(config, 4).await;
    for _ in 0..4 {
        h.next_round(t.id).await;
        h.settle_open(t.id, |m| !m.is_grand_final()).await;
    }

    let grand_final = h
        .repo
        .list_tournament_matches(t.id)
        .await
        .unwrap()
        .into_iter()
        .find(|m| m.is_grand_final())
        .unwrap();
    let challenger = grand_final.player_b.unwrap();
    assert_eq!(grand_final.winner, Some(challenger));

    let result = h.engine.tournaments.finish(t.id, &ORGANIZER).await.unwrap();
    assert!(result.prize_issued);
    let champion = &result.standings[0];
    assert_eq!(champion.registration_id, challenger);
    assert_eq!(champion.rank, 1);
    let ranks: Vec<u32> = result.standings.iter().map(|s| s.rank).collect();
    assert_eq!(ranks, (1..=result.standings.len() as u32).collect::<Vec<_>>());
    assert_eq!(
        h.prizes.credits().await,
        vec![CreditRecord {
            tournament_id: t.id,
            player_id: champion.player_id,
            amount_cents: 100,
        }]
    );
}

#[tokio::test]
async fn test_finish_skips_prize_already_on_the_ledger() {
    let h = Harness::new();
    let config = TournamentConfig::new("Prize", TournamentFormat::Swiss, 8).with_prize_credit(2_500);
    let t = h.running_tournament(config, 2).await;
    h.settle_open(t.id, |_| true).await;
    h.prizes.issue_credit(t.id, player(1), 2_500).await.unwrap();

    let result = h.engine.tournaments.finish(t.id, &ORGANIZER).await.unwrap();
    assert!(!result.prize_issued);
    assert_eq!(h.prizes.credits().await.len(), 1);
}

#[tokio::test]
async fn test_cancel_before_start() {
    let h = Harness::new();
    let t = h
        .open_tournament(TournamentConfig::new("Called off", TournamentFormat::Swiss, 8))
        .await;

    let cancelled = h.engine.tournaments.cancel(t.id, &ORGANIZER).await.unwrap();
    assert_eq!(cancelled.status, TournamentStatus::Cancelled);

    let err = h
        .engine
        .registrations
        .register(t.id, player(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_state");
}
