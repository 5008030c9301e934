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
    // Whatever we accepted must survive an emit/parse round trip unchanged.
    let fen = position.to_string();
    let reparsed = Position::from_fen(&fen, position.is_chess960())
        .expect("emitted FEN must parse back");
    assert_eq!(reparsed.to_string(), fen);
    assert_eq!(reparsed.key(), position.key());
});
