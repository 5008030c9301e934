//! End-to-end runs of the tournament binary against the bundled random-mover
//! engine.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::str::contains;

const RANDMOVER: &str = env!("CARGO_BIN_EXE_randmover");

fn runner() -> Command {
    Command::cargo_bin("gauntlet").expect("binary should be built")
}

fn scratch(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("gauntlet-e2e-{}-{name}", std::process::id()));
    path
}

/// The engine command goes through backslash-escaped tokenization.
fn engine_cmd() -> String {
    format!("cmd={}", RANDMOVER.replace(' ', "\\ "))
}

#[test]
fn round_robin_alternates_colors() {
    let pgn = scratch("round-robin.pgn");
    runner()
        .args([
            "-engine", &engine_cmd(), "name=alpha", "option.Seed=1",
            "-engine", &engine_cmd(), "name=beta", "option.Seed=2",
            "-rounds", "1", "-games", "2", "-concurrency", "1",
            "-draw", "8", "10",
            "-pgn", pgn.to_str().unwrap(), "1",
        ])
        .assert()
        .success()
        .stdout(contains("Score of alpha vs beta"));

    let text = std::fs::read_to_string(&pgn).unwrap();
    assert_eq!(text.matches("[Round \"").count(), 2);
    // Engine 1 is White in the first game and Black in the second.
    assert!(text.contains("[Round \"1.1\"]"));
    assert!(text.contains("[Round \"1.2\"]"));
    let first = text.find("[White \"alpha\"]").expect("alpha plays White once");
    let second = text.find("[White \"beta\"]").expect("beta plays White once");
    assert!(first < second);
    assert_eq!(
        text.matches("[FEN \"rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1\"]")
            .count(),
        2
    );
    for result in text.lines().filter(|line| line.starts_with("[Result ")) {
        assert!(
            ["[Result \"1-0\"]", "[Result \"0-1\"]", "[Result \"1/2-1/2\"]"]
                .contains(&result),
            "unexpected {result}"
        );
    }
    let _ = std::fs::remove_file(pgn);
}

#[test]
fn identical_seeds_produce_identical_pgn() {
    let (one, two) = (scratch("det-1.pgn"), scratch("det-2.pgn"));
    for pgn in [&one, &two] {
        runner()
            .args([
                "-engine", &engine_cmd(), "name=alpha", "option.Seed=7",
                "-engine", &engine_cmd(), "name=beta", "option.Seed=8",
                "-rounds", "1", "-games", "2", "-concurrency", "1",
                "-draw", "8", "10",
                "-pgn", pgn.to_str().unwrap(), "1",
            ])
            .assert()
            .success();
    }
    assert_eq!(
        std::fs::read_to_string(&one).unwrap(),
        std::fs::read_to_string(&two).unwrap()
    );
    let _ = std::fs::remove_file(one);
    let _ = std::fs::remove_file(two);
}

#[test]
fn slow_engine_forfeits_on_time() {
    let pgn = scratch("forfeit.pgn");
    runner()
        .args([
            "-engine", &engine_cmd(), "name=sleeper", "option.Sleep=500",
            "-engine", &engine_cmd(), "name=fast",
            "-each", "tc=0.1",
            "-concurrency", "1",
            "-pgn", pgn.to_str().unwrap(), "0",
        ])
        .assert()
        .success()
        .stdout(contains("time forfeit"));

    let text = std::fs::read_to_string(&pgn).unwrap();
    // The sleeper is engine 1, so it plays White and loses on time.
    assert!(text.contains("[White \"sleeper\"]"));
    assert!(text.contains("[Result \"0-1\"]"));
    assert!(text.contains("[Termination \"time forfeit\"]"));
    let _ = std::fs::remove_file(pgn);
}

#[test]
fn illegal_bestmove_loses_by_rules_infraction() {
    let pgn = scratch("illegal.pgn");
    runner()
        .args([
            "-engine", &engine_cmd(), "name=cheat", "option.Illegal=true",
            "-engine", &engine_cmd(), "name=honest",
            "-concurrency", "1",
            "-pgn", pgn.to_str().unwrap(), "0",
        ])
        .assert()
        .success()
        .stdout(contains("rules infraction"));

    let text = std::fs::read_to_string(&pgn).unwrap();
    assert!(text.contains("[Result \"0-1\"]"));
    assert!(text.contains("[Termination \"rules infraction\"]"));
    let _ = std::fs::remove_file(pgn);
}

#[test]
fn zero_scores_adjudicate_a_draw() {
    let pgn = scratch("adjudicated.pgn");
    runner()
        .args([
            "-engine", &engine_cmd(), "option.Seed=5",
            "-engine", &engine_cmd(), "option.Seed=6",
            "-draw", "8", "10",
            "-concurrency", "1",
            "-pgn", pgn.to_str().unwrap(), "0",
        ])
        .assert()
        .success();

    let text = std::fs::read_to_string(&pgn).unwrap();
    // Both engines always report cp 0: the 16th zero-score report triggers
    // the adjudication, before its move is recorded.
    assert!(text.contains("[Result \"1/2-1/2\"]"));
    assert!(text.contains("[Termination \"adjudication\"]"));
    assert!(text.contains("[PlyCount \"15\"]"));
    let _ = std::fs::remove_file(pgn);
}

#[test]
fn sampling_writes_training_lines() {
    let csv = scratch("samples.csv");
    runner()
        .args([
            "-engine", &engine_cmd(), "option.Seed=9",
            "-engine", &engine_cmd(), "option.Seed=10",
            "-draw", "8", "10",
            "-concurrency", "1",
            "-sample", &format!("1,n,{}", csv.to_str().unwrap()),
        ])
        .assert()
        .success();

    let text = std::fs::read_to_string(&csv).unwrap();
    assert!(!text.is_empty());
    for line in text.lines() {
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields.len(), 3, "bad sample line: {line}");
        // Adjudicated draw: result is 1 from either side's point of view.
        assert_eq!(fields[2], "1", "bad result in: {line}");
        let _: i32 = fields[1].parse().expect("score is a number");
    }
    let _ = std::fs::remove_file(csv);
}

#[test]
fn bad_options_exit_nonzero() {
    runner().args(["-engine", "cmd=only-one"]).assert().failure();
    runner()
        .args(["-engine", "cmd=a", "-engine", "cmd=b", "-bogus"])
        .assert()
        .failure();
}
