use super::PositionEncoder;
use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode, Position, Setup};

pub(crate) const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub(crate) fn setup_from_fen(fen: &str) -> Setup {
    let pos: Chess = Fen::from_ascii(fen.as_bytes())
        .unwrap()
        .into_position(CastlingMode::Standard)
        .unwrap();
    pos.into_setup(EnPassantMode::Legal)
}

/// Checks that decoding an encoding restores everything the format can represent
pub(super) fn round_trip_checks(encoder: &dyn PositionEncoder, keeps_en_passant: bool) {
    const FENS: [&str; 6] = [
        START_FEN,
        "rnbqkbnr/pp1p1ppp/8/2pPp3/8/8/PPP1PPPP/RNBQKBNR w KQkq c6 0 3",
        "4nrk1/3q1pp1/2n1p1p1/8/1P2Q3/7P/PB1N1PP1/2R3K1 w - - 5 26",
        "5r2/1p2ppkp/p2p1nP1/qn6/4P3/2r2B2/1PPQ1PP1/2KR3R w - - 0 21",
        "r3k2r/8/8/8/8/8/8/R3K2R b Kq - 0 1",
        "8/8/8/8/4pP2/8/8/K6k b - f3 0 1",
    ];

    for fen in FENS {
        let setup = setup_from_fen(fen);
        let encoding = encoder.encode(&setup);
        assert_eq!(encoding.shape(), encoder.shape());

        let decoded = encoder.decode(&encoding).unwrap();

        assert_eq!(decoded.board, setup.board, "placement of {}", fen);
        assert_eq!(decoded.turn, setup.turn, "turn of {}", fen);
        assert_eq!(
            decoded.castling_rights, setup.castling_rights,
            "castling rights of {}",
            fen
        );
        if keeps_en_passant {
            assert_eq!(decoded.ep_square, setup.ep_square, "en passant of {}", fen);
        } else {
            assert_eq!(decoded.ep_square, None);
        }

        // re-encoding is stable
        assert_eq!(encoder.encode(&decoded).bits()[..768], encoding.bits()[..768]);
    }
}
