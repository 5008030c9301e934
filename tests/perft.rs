//! Canonical perft counts: the move generator is correct iff every one of
//! these matches exactly.

use gauntlet::chess::position::{perft, Position};
use pretty_assertions::assert_eq;

fn expect_perft(fen: &str, depth: u8, leaves: u64) {
    let position = Position::from_fen(fen, false).expect("valid position: {fen}");
    assert_eq!(perft(&position, depth), leaves, "fen: {fen}");
}

#[test]
fn starting_position() {
    expect_perft(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        5,
        4_865_609,
    );
}

#[test]
fn kiwipete() {
    expect_perft(
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0",
        4,
        4_085_603,
    );
}

#[test]
fn endgame() {
    expect_perft("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0", 5, 674_624);
}

#[test]
fn promotions_and_pins() {
    expect_perft(
        "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0",
        4,
        422_333,
    );
}

#[test]
fn underpromotion_battery() {
    expect_perft(
        "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1",
        4,
        2_103_487,
    );
}

#[test]
fn symmetrical_middlegame() {
    expect_perft(
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0",
        4,
        3_894_594,
    );
}

#[test]
fn chess960_castling() {
    expect_perft("r1k1r2q/p1ppp1pp/8/8/8/8/P1PPP1PP/R1K1R2Q w KQkq - 0", 5, 7_096_972);
}
