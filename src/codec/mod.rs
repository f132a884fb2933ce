pub mod bitboard;
pub mod tensor;

#[cfg(test)]
mod checks;

use crate::error::CodecError;
use enum_dispatch::enum_dispatch;
use shakmaty::{Bitboard, CastlingSide, Color, Piece, Role, Setup, Square};

pub use bitboard::{decode_bitboard, encode_bitboard, BitboardEncoder, BITBOARD_SHAPE};
pub use tensor::{decode_tensor, encode_tensor, TensorEncoder, TENSOR_SHAPE};

/// Number of piece planes: 6 roles for each color
pub const PIECE_CHANNELS: usize = 12;

/// A fixed-shape boolean array holding one encoded position.
/// Data is stored row-major, i.e. the last axis varies fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    shape: Vec<usize>,
    bits: Vec<bool>,
}

impl Encoding {
    pub fn new(shape: Vec<usize>, bits: Vec<bool>) -> Result<Self, CodecError> {
        if shape.iter().product::<usize>() != bits.len() {
            return Err(CodecError::MalformedEncoding {
                expected: shape,
                found: vec![bits.len()],
            });
        }

        Ok(Encoding { shape, bits })
    }

    fn zeros(shape: &[usize]) -> Self {
        Encoding {
            shape: shape.to_vec(),
            bits: vec![false; shape.iter().product()],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn into_bits(self) -> Vec<bool> {
        self.bits
    }

    fn expect_shape(&self, expected: &[usize]) -> Result<(), CodecError> {
        if self.shape != expected {
            return Err(CodecError::MalformedEncoding {
                expected: expected.to_vec(),
                found: self.shape.clone(),
            });
        }
        Ok(())
    }
}

/// The available position encoders
#[enum_dispatch]
#[derive(Debug, Clone)]
pub enum Encoders {
    BitboardEncoder,
    TensorEncoder,
}

#[enum_dispatch(Encoders)]
pub trait PositionEncoder {
    /// Shape of every encoding this encoder produces
    fn shape(&self) -> &'static [usize];

    /// Encodes a position (never fails)
    fn encode(&self, setup: &Setup) -> Encoding;

    /// Reconstructs the information representable in this format.
    /// Move counters are left at their defaults.
    fn decode(&self, encoding: &Encoding) -> Result<Setup, CodecError>;
}

impl Default for Encoders {
    fn default() -> Self {
        BitboardEncoder.into()
    }
}

impl Encoders {
    /// Finds the encoder that produces records of the given shape
    pub fn for_shape(shape: &[usize]) -> Option<Encoders> {
        if shape == BITBOARD_SHAPE {
            Some(BitboardEncoder.into())
        } else if shape == TENSOR_SHAPE {
            Some(TensorEncoder.into())
        } else {
            None
        }
    }
}

/// Index of the piece plane: white P N B R Q K, then black P N B R Q K
fn channel(piece: Piece) -> usize {
    let role = match piece.role {
        Role::Pawn => 0,
        Role::Knight => 1,
        Role::Bishop => 2,
        Role::Rook => 3,
        Role::Queen => 4,
        Role::King => 5,
    };
    match piece.color {
        Color::White => role,
        Color::Black => role + 6,
    }
}

/// Inverse of `channel`
fn piece_of(channel: usize) -> Piece {
    debug_assert!(channel < PIECE_CHANNELS);

    let color = if channel < 6 { Color::White } else { Color::Black };
    let role = match channel % 6 {
        0 => Role::Pawn,
        1 => Role::Knight,
        2 => Role::Bishop,
        3 => Role::Rook,
        4 => Role::Queen,
        _ => Role::King,
    };
    Piece { color, role }
}

/// Square of the rook that holds the castling right in standard chess
fn castling_rook(color: Color, side: CastlingSide) -> Square {
    match (color, side) {
        (Color::White, CastlingSide::KingSide) => Square::H1,
        (Color::White, CastlingSide::QueenSide) => Square::A1,
        (Color::Black, CastlingSide::KingSide) => Square::H8,
        (Color::Black, CastlingSide::QueenSide) => Square::A8,
    }
}

fn has_castling(setup: &Setup, color: Color, side: CastlingSide) -> bool {
    setup.castling_rights.contains(castling_rook(color, side))
}

fn grant_castling(rights: Bitboard, color: Color, side: CastlingSide) -> Bitboard {
    rights.with(Bitboard::from_square(castling_rook(color, side)))
}
