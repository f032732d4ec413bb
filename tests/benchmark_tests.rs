//! Performance benchmarks for critical arena systems

use arena_server::tournament::{Advancement, TournamentEngine};
use arena_shared::physics::{self, GameState, Phase, SCORE_LIMIT};
use arena_shared::{ServerMessage, UserId};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

/// Benchmarks one simulated second of a running match per iteration
#[test]
fn benchmark_physics_step() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut state = GameState::new();
    state.phase = Phase::Running;

    let iterations = 60_000;
    let start = Instant::now();

    for _ in 0..iterations {
        physics::step(&mut state, 1.0 / 60.0, u32::MAX, &mut rng);
    }

    let duration = start.elapsed();
    println!(
        "Physics step: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // 1000 simulated seconds should take well under half a second
    assert!(duration.as_millis() < 500);
    assert!(state.ball.x.is_finite() && state.ball.y.is_finite());
}

/// Benchmarks JSON encoding of the per-tick broadcast
#[test]
fn benchmark_tick_encoding() {
    let message = ServerMessage::Tick {
        room_code: "ABCDEF".to_string(),
        state: GameState::new(),
    };

    let iterations = 10_000;
    let start = Instant::now();
    let mut bytes = 0;

    for _ in 0..iterations {
        bytes += serde_json::to_string(&message).map(|s| s.len()).unwrap_or(0);
    }

    let duration = start.elapsed();
    println!(
        "Tick encoding: {} iterations in {:?} ({:.2} μs/iter, {} bytes/tick)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        bytes / iterations
    );

    assert!(duration.as_millis() < 500);
}

/// Benchmarks a full 64 player bracket decided by scripted results
#[test]
fn benchmark_bracket_resolution() {
    let start = Instant::now();
    let mut engine = TournamentEngine::with_rng(StdRng::seed_from_u64(9));

    let id = engine.create("Bench Cup", 64, UserId(1), "u1").unwrap().id;
    for user in 2..=64 {
        engine.join(id, UserId(user), &format!("u{}", user)).unwrap();
    }

    let mut plan = engine.plan_start(id, UserId(1)).unwrap();
    let mut rounds = 0;
    let champion = loop {
        rounds += 1;
        let codes = (0..plan.rooms_needed()).map(|i| format!("R{}M{}", rounds, i)).collect();
        let assignments = engine.commit_round(&plan, codes).unwrap();

        let mut advancement = Advancement::Pending;
        for assignment in assignments {
            advancement = engine
                .record_result(assignment.match_id, [SCORE_LIMIT, 0], assignment.participants[0])
                .unwrap();
        }
        match advancement {
            Advancement::NextRound(next) => plan = next,
            Advancement::Finished { champion } => break champion,
            Advancement::Pending => panic!("round {} did not complete", rounds),
        }
    };

    let duration = start.elapsed();
    println!("64 player bracket: {} rounds in {:?}", rounds, duration);

    assert_eq!(rounds, 6);
    assert!(champion.is_some());
    assert!(duration.as_millis() < 100);
}
