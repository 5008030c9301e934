#![no_main]
use gauntlet::chess::position::Position;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(position) = Position::from_fen(input, false) else {
        return;
    };
    // Every generated move must survive the LAN round trip and produce a
    // position that passes the internal invariant checks (debug assertions
    // inside play cover the hash and the bitboard bookkeeping).
    for m in position.legal_moves() {
        let lan = position.move_to_lan(m);
        assert_eq!(position.lan_to_move(&lan).unwrap(), m);
        let _ = position.play(m);
    }
});
