use super::{
    channel, grant_castling, has_castling, piece_of, Encoding, PositionEncoder, PIECE_CHANNELS,
};
use crate::error::CodecError;
use shakmaty::{Bitboard, CastlingSide, Color, Setup, Square};

/// 12 piece blocks of 64 squares, side to move and 4 castling rights
pub const BITBOARD_LEN: usize = PIECE_CHANNELS * 64 + 5;
pub const BITBOARD_SHAPE: [usize; 1] = [BITBOARD_LEN];

const TURN_INDEX: usize = PIECE_CHANNELS * 64;

/// Order of the castling flags after the side to move
const CASTLING_FLAGS: [(Color, CastlingSide); 4] = [
    (Color::White, CastlingSide::KingSide),
    (Color::White, CastlingSide::QueenSide),
    (Color::Black, CastlingSide::KingSide),
    (Color::Black, CastlingSide::QueenSide),
];

/// The flat 773 bit encoding.
/// En passant is not representable in this format.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitboardEncoder;

impl PositionEncoder for BitboardEncoder {
    fn shape(&self) -> &'static [usize] {
        &BITBOARD_SHAPE
    }

    fn encode(&self, setup: &Setup) -> Encoding {
        encode_bitboard(setup)
    }

    fn decode(&self, encoding: &Encoding) -> Result<Setup, CodecError> {
        decode_bitboard(encoding)
    }
}

pub fn encode_bitboard(setup: &Setup) -> Encoding {
    let mut encoding = Encoding::zeros(&BITBOARD_SHAPE);
    let bits = &mut encoding.bits;

    for (square, piece) in setup.board.clone().into_iter() {
        bits[channel(piece) * 64 + usize::from(square)] = true;
    }

    bits[TURN_INDEX] = setup.turn == Color::White;
    for (i, (color, side)) in CASTLING_FLAGS.into_iter().enumerate() {
        bits[TURN_INDEX + 1 + i] = has_castling(setup, color, side);
    }

    encoding
}

pub fn decode_bitboard(encoding: &Encoding) -> Result<Setup, CodecError> {
    encoding.expect_shape(&BITBOARD_SHAPE)?;
    let bits = encoding.bits();

    let mut setup = Setup::empty();

    for channel_index in 0..PIECE_CHANNELS {
        let piece = piece_of(channel_index);
        let block = &bits[channel_index * 64..(channel_index + 1) * 64];

        for (square, _) in block.iter().enumerate().filter(|&(_, &set)| set) {
            setup.board.set_piece_at(Square::new(square as u32), piece);
        }
    }

    setup.turn = Color::from_white(bits[TURN_INDEX]);

    let mut rights = Bitboard::EMPTY;
    for (i, (color, side)) in CASTLING_FLAGS.into_iter().enumerate() {
        if bits[TURN_INDEX + 1 + i] {
            rights = grant_castling(rights, color, side);
        }
    }
    setup.castling_rights = rights;

    Ok(setup)
}
