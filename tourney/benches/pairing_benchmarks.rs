use chrono::Utc;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tourney::matches::{Match, ResultStatus};
use tourney::pairing::{
    PairingContext, PairingStrategy, RoundRobinPairing, SwissPairing, elimination::seeded_first_round,
};
use tourney::registration::{EntryType, Registration, RegistrationStatus};
use tourney::stage::{Stage, StageSettings, StageStatus, StageType};
use tourney::standings::compute_standings;

/// Checked-in field of `n` players seeded by id
fn field(n: i64) -> Vec<Registration> {
    (1..=n)
        .map(|id| Registration {
            id,
            tournament_id: 1,
            player_id: 1000 + id,
            display_name: format!("player{}", id),
            status: RegistrationStatus::CheckedIn,
            entry_type: EntryType::Free,
            seed: Some(id as u32),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .collect()
}

fn stage(stage_type: StageType) -> Stage {
    Stage {
        id: 1,
        tournament_id: 1,
        stage_type,
        sequence: 1,
        settings: StageSettings {
            swiss_rounds: Some(8),
            ..StageSettings::default()
        },
        status: StageStatus::Active,
        created_at: Utc::now(),
    }
}

/// Play `rounds` Swiss rounds where the lower registration id always wins
fn swiss_history(players: &[Registration], rounds: u32) -> Vec<Match> {
    let stage = stage(StageType::Swiss);
    let strategy = SwissPairing { rounds: Some(8) };
    let mut history: Vec<Match> = Vec::new();

    for _ in 0..rounds {
        let standings = compute_standings(1, stage.id, players, &history);
        let ctx = PairingContext {
            stage: &stage,
            players,
            prior_matches: &history,
            standings: &standings,
        };
        let plan = strategy.generate_next_round(&ctx).unwrap();
        for new in plan.matches {
            let id = history.len() as i64 + 1;
            let mut m = new.into_match(id, 1, stage.id, Utc::now());
            if let Some(player_b) = m.player_b {
                let winner = m.player_a.min(player_b);
                m.score_a = Some(if winner == m.player_a { 2 } else { 0 });
                m.score_b = Some(if winner == player_b { 2 } else { 0 });
                m.winner = Some(winner);
                m.result_status = ResultStatus::Confirmed;
            }
            history.push(m);
        }
    }

    history
}

/// Benchmark pairing the fourth Swiss round for growing fields
fn bench_swiss_pairing(c: &mut Criterion) {
    let mut group = c.benchmark_group("swiss_round_4");
    let stage = stage(StageType::Swiss);
    let strategy = SwissPairing { rounds: Some(8) };

    for size in [16i64, 64, 256] {
        let players = field(size);
        let history = swiss_history(&players, 3);
        let standings = compute_standings(1, stage.id, &players, &history);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let ctx = PairingContext {
                    stage: &stage,
                    players: &players,
                    prior_matches: &history,
                    standings: &standings,
                };
                strategy.generate_next_round(black_box(&ctx))
            });
        });
    }

    group.finish();
}

/// Benchmark a full standings recompute after several rounds
fn bench_compute_standings(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_standings");

    for size in [16i64, 64, 256] {
        let players = field(size);
        let history = swiss_history(&players, 6);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| compute_standings(1, 1, black_box(&players), black_box(&history)));
        });
    }

    group.finish();
}

fn bench_round_robin_schedule(c: &mut Criterion) {
    let stage = stage(StageType::RoundRobin);
    let players = field(32);
    let strategy = RoundRobinPairing { legs: 1 };

    c.bench_function("round_robin_32", |b| {
        b.iter(|| {
            let ctx = PairingContext {
                stage: &stage,
                players: &players,
                prior_matches: &[],
                standings: &[],
            };
            strategy.generate_next_round(black_box(&ctx))
        });
    });
}

fn bench_bracket_seeding(c: &mut Criterion) {
    let seeds: Vec<i64> = (1..=100).collect();

    c.bench_function("bracket_seeding_100", |b| {
        b.iter(|| seeded_first_round(1, black_box(&seeds)));
    });
}

criterion_group!(pairing, bench_swiss_pairing, bench_round_robin_schedule, bench_bracket_seeding);

criterion_group!(standings, bench_compute_standings);

criterion_main!(pairing, standings);
