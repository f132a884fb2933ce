use super::{
    channel, grant_castling, has_castling, piece_of, Encoding, PositionEncoder, PIECE_CHANNELS,
};
use crate::error::CodecError;
use shakmaty::{Bitboard, CastlingSide, Color, Setup, Square};

pub const PLANES: usize = 15;
pub const TENSOR_SHAPE: [usize; 3] = [8, 8, PLANES];

const CASTLING_PLANE: usize = 12;
const EN_PASSANT_PLANE: usize = 13;
const TURN_PLANE: usize = 14;

/// Cells of the castling plane, as (row, col)
const CASTLING_CELLS: [((usize, usize), (Color, CastlingSide)); 4] = [
    ((0, 0), (Color::White, CastlingSide::QueenSide)),
    ((0, 7), (Color::White, CastlingSide::KingSide)),
    ((7, 0), (Color::Black, CastlingSide::QueenSide)),
    ((7, 7), (Color::Black, CastlingSide::KingSide)),
];

/// The 8x8x15 plane encoding.
/// Row is the rank and column is the file, so (0, 0) is a1 and (7, 7) is h8.
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorEncoder;

impl PositionEncoder for TensorEncoder {
    fn shape(&self) -> &'static [usize] {
        &TENSOR_SHAPE
    }

    fn encode(&self, setup: &Setup) -> Encoding {
        encode_tensor(setup)
    }

    fn decode(&self, encoding: &Encoding) -> Result<Setup, CodecError> {
        decode_tensor(encoding)
    }
}

#[inline(always)]
fn index(row: usize, col: usize, plane: usize) -> usize {
    (row * 8 + col) * PLANES + plane
}

#[inline(always)]
fn square_index(square: Square, plane: usize) -> usize {
    index(square.rank() as usize, square.file() as usize, plane)
}

pub fn encode_tensor(setup: &Setup) -> Encoding {
    let mut encoding = Encoding::zeros(&TENSOR_SHAPE);
    let bits = &mut encoding.bits;

    for (square, piece) in setup.board.clone().into_iter() {
        bits[square_index(square, channel(piece))] = true;
    }

    for ((row, col), (color, side)) in CASTLING_CELLS {
        bits[index(row, col, CASTLING_PLANE)] = has_castling(setup, color, side);
    }

    if let Some(ep_square) = setup.ep_square {
        bits[square_index(ep_square, EN_PASSANT_PLANE)] = true;
    }

    bits[index(0, 0, TURN_PLANE)] = setup.turn == Color::White;

    encoding
}

pub fn decode_tensor(encoding: &Encoding) -> Result<Setup, CodecError> {
    encoding.expect_shape(&TENSOR_SHAPE)?;
    let bits = encoding.bits();

    let mut setup = Setup::empty();

    for square in Square::ALL {
        for channel_index in 0..PIECE_CHANNELS {
            if bits[square_index(square, channel_index)] {
                setup.board.set_piece_at(square, piece_of(channel_index));
            }
        }
    }

    let mut rights = Bitboard::EMPTY;
    for ((row, col), (color, side)) in CASTLING_CELLS {
        if bits[index(row, col, CASTLING_PLANE)] {
            rights = grant_castling(rights, color, side);
        }
    }
    setup.castling_rights = rights;

    // the lowest marked square wins if there is more than one
    setup.ep_square = Square::ALL
        .into_iter()
        .find(|&square| bits[square_index(square, EN_PASSANT_PLANE)]);

    setup.turn = Color::from_white(bits[index(0, 0, TURN_PLANE)]);

    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::checks::{round_trip_checks, setup_from_fen, START_FEN};

    const EP_FEN: &str = "rnbqkbnr/pp1p1ppp/8/2pPp3/8/8/PPP1PPPP/RNBQKBNR w KQkq c6 0 3";

    #[test]
    fn test_round_trip() {
        round_trip_checks(&TensorEncoder, true);
    }

    #[test]
    fn test_start_position_planes() {
        let encoding = encode_tensor(&setup_from_fen(START_FEN));
        let bits = encoding.bits();

        assert_eq!(encoding.shape(), &[8, 8, 15]);
        // white rooks on a1 and h1, black king on e8
        assert!(bits[index(0, 0, 3)]);
        assert!(bits[index(0, 7, 3)]);
        assert!(bits[index(7, 4, 11)]);
        // four castling corners
        assert_eq!(
            (0..64).filter(|&sq| bits[sq * PLANES + CASTLING_PLANE]).count(),
            4
        );
        // no en passant, white to move broadcast on a single cell
        assert!((0..64).all(|sq| !bits[sq * PLANES + EN_PASSANT_PLANE]));
        assert!(bits[index(0, 0, TURN_PLANE)]);
        assert_eq!(
            (0..64).filter(|&sq| bits[sq * PLANES + TURN_PLANE]).count(),
            1
        );
    }

    #[test]
    fn test_en_passant_plane() {
        let encoding = encode_tensor(&setup_from_fen(EP_FEN));

        // c6
        assert!(encoding.bits()[index(5, 2, EN_PASSANT_PLANE)]);

        let decoded = decode_tensor(&encoding).unwrap();
        assert_eq!(decoded.ep_square, Some(Square::C6));
    }

    #[test]
    fn test_castling_corners() {
        let setup = setup_from_fen("r3k2r/8/8/8/8/8/8/R3K2R w Qk - 0 1");
        let bits = encode_tensor(&setup).into_bits();

        assert!(bits[index(0, 0, CASTLING_PLANE)]);
        assert!(!bits[index(0, 7, CASTLING_PLANE)]);
        assert!(!bits[index(7, 0, CASTLING_PLANE)]);
        assert!(bits[index(7, 7, CASTLING_PLANE)]);
    }

    #[test]
    fn test_malformed() {
        let flat = Encoding::new(vec![960], vec![false; 960]).unwrap();
        assert_eq!(
            decode_tensor(&flat).unwrap_err(),
            CodecError::MalformedEncoding {
                expected: vec![8, 8, 15],
                found: vec![960],
            }
        );
    }
}
