//! Position parsing: FEN round-trips over known-good positions and rejection
//! of structurally broken ones.

use gauntlet::chess::position::Position;
use pretty_assertions::assert_eq;

fn setup(fen: &str) -> Position {
    Position::from_fen(fen, false).expect("we are parsing a valid position: {fen}")
}

/// Patches trimmed (EPD-style) input to compare against the always-full FEN
/// the emitter produces.
fn sanitize_fen(fen: &str) -> String {
    match fen.split_ascii_whitespace().count() {
        6 => fen.to_string(),
        5 => fen.to_string() + " 1",
        4 => fen.to_string() + " 0 1",
        _ => unreachable!("FEN should have 4..=6 fields"),
    }
}

fn expect_round_trip(fen: &str) {
    assert_eq!(setup(fen).to_string(), sanitize_fen(fen));
}

#[test]
fn basic_positions() {
    expect_round_trip("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
    expect_round_trip("2r3r1/p3k3/1p3pp1/1B5p/5P2/2P1p1P1/PP4KP/3R4 w - - 0 34");
    expect_round_trip("rnbqk1nr/p3bppp/1p2p3/2ppP3/3P4/P7/1PP1NPPP/R1BQKBNR w KQkq c6 0 7");
    expect_round_trip("r2qkb1r/1pp1pp1p/p1np1np1/1B6/3PP1b1/2N1BN2/PPP2PPP/R2QK2R w KQkq - 0 7");
    expect_round_trip("r3k3/5p2/2p5/p7/P3r3/2N2n2/1PP2P2/2K2B2 w q - 0 24");
    expect_round_trip("8/8/8/8/2P5/3k4/8/KB6 b - c3 0 1");
    expect_round_trip("rnbq1rk1/pp4pp/1b1ppn2/2p2p2/2PP4/1P2PN2/PB2BPPP/RN1Q1RK1 w - c6 0 9");
    // Trimmed FEN, as found in opening books.
    expect_round_trip("rnbqkb1r/pp2pppp/3p1n2/8/3NP3/2N5/PPP2PPP/R1BQKB1R b KQkq -");
    expect_round_trip("4k3/8/8/8/8/8/8/4K3 w - - 42");
}

#[test]
fn shredder_castling_letters() {
    // Standard placement given with file letters parses, and serializes back
    // with K/Q because the geometry is not Chess960.
    let position = setup("r3k2r/8/8/8/8/8/8/R3K2R w AHah - 0 1");
    assert!(!position.is_chess960());
    assert_eq!(
        position.to_string(),
        "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1"
    );
}

#[test]
fn chess960_round_trip() {
    // King on f1, rooks on b1/g1: auto-detected and serialized by file.
    let position = setup("1r3kr1/pppppppp/8/8/8/8/PPPPPPPP/1R3KR1 w BGbg - 0 1");
    assert!(position.is_chess960());
    assert_eq!(
        position.to_string(),
        "1r3kr1/pppppppp/8/8/8/8/PPPPPPPP/1R3KR1 w BGbg - 0 1"
    );
}

#[test]
fn two_same_color_kings_rejected() {
    assert!(Position::from_fen("8/2k5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1", false).is_err());
}

#[test]
fn king_count_rejections() {
    assert!(Position::from_fen("3k4/8/8/8/8/8/8/8 w - - 0 1", false).is_err());
    assert!(Position::from_fen("8/8/8/8/8/8/8/3K4 w - - 0 1", false).is_err());
    assert!(Position::from_fen("1kkk4/8/8/8/8/8/8/1KKK4 w - - 0 1", false).is_err());
}

#[test]
fn pawn_rejections() {
    // Nine pawns.
    assert!(Position::from_fen(
        "rnbqkbnr/pppppppp/8/8/8/P7/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        false
    )
    .is_err());
    // Pawn on its own back rank.
    assert!(Position::from_fen("3kr3/8/8/8/8/5Q2/8/1KP4P w - - 0 1", false).is_err());
}

#[test]
fn rule50_clamp() {
    assert!(Position::from_fen(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 100 1",
        false
    )
    .is_err());
    assert!(Position::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 99 80", false).is_ok());
}

#[test]
fn en_passant_geometry_rejections() {
    // No pawn behind the en passant square.
    assert!(Position::from_fen(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e6 0 1",
        false
    )
    .is_err());
    // En passant square occupied.
    assert!(Position::from_fen("4k3/8/4n3/4p3/8/8/8/4K3 w - e6 0 1", false).is_err());
    // Side to move matches the pushing side.
    assert!(Position::from_fen("4k3/8/8/4p3/8/8/8/4K3 b - e6 0 1", false).is_err());
}

#[test]
fn castle_rook_rejections() {
    // Castling right without any rook on the back rank.
    assert!(Position::from_fen("4k3/8/8/8/8/8/8/4K3 w K - 0 1", false).is_err());
    // Right refers to a rook that is not on the back rank.
    assert!(Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w H - 0 1", false).is_err());
}

#[test]
fn invariants_after_parse() {
    let position = setup("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1");
    // Exactly one king each, at most 16 pieces per side, disjoint colors.
    assert_eq!(position.occupied().count(), 32);
    assert!(!position.in_check());
    assert!(position.legal_moves().len() <= 256);
}
