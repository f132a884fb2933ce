use crate::archive::{GameHeaders, PgnGame};
use crate::codec::{Encoders, Encoding, PositionEncoder};
use crate::error::ReplayError;
use crate::filter::{PositionFilter, PositionFilters};
use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shakmaty::{fen::Fen, CastlingMode, Chess, EnPassantMode, Position, Setup};

/// The available ways of reshaping the encodings of a whole game
#[enum_dispatch]
#[derive(Debug, Clone)]
pub enum Aggregators {
    Identity,
    Triplets,
}

#[enum_dispatch(Aggregators)]
pub trait Aggregator {
    /// Called once per game with every selected encoding, in order
    fn aggregate(&mut self, encodings: Vec<Encoding>) -> Vec<Encoding>;
}

impl Default for Aggregators {
    fn default() -> Self {
        Identity.into()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Aggregator for Identity {
    fn aggregate(&mut self, encodings: Vec<Encoding>) -> Vec<Encoding> {
        encodings
    }
}

/// Picks an (anchor, positive, negative) triplet from a game.
/// The positive is the position right after the anchor, the negative is half a game away.
#[derive(Debug, Clone)]
pub struct Triplets {
    rng: StdRng,
}

impl Triplets {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Triplets { rng }
    }
}

impl Aggregator for Triplets {
    fn aggregate(&mut self, encodings: Vec<Encoding>) -> Vec<Encoding> {
        let n = encodings.len();
        if n < 2 {
            // no anchor with a following position
            return vec![];
        }

        let anchor = self.rng.gen_range(0..n - 1);
        let positive = anchor + 1;
        let negative = (anchor + n / 2) % n;

        [anchor, positive, negative]
            .into_iter()
            .map(|i| encodings[i].clone())
            .collect()
    }
}

/// Encodings produced from one game
#[derive(Debug, Default)]
pub struct ProcessedGame {
    pub encodings: Vec<Encoding>,
    /// Set when the game could not be replayed to the end.
    /// The encodings are the ones collected before the failure.
    pub error: Option<ReplayError>,
}

/// Replays games and encodes the positions selected along the way
#[derive(Debug, Clone, Default)]
pub struct GameProcessor {
    pub position_filter: PositionFilters,
    pub encoder: Encoders,
    pub aggregator: Aggregators,
}

impl GameProcessor {
    pub fn new(
        position_filter: PositionFilters,
        encoder: Encoders,
        aggregator: Aggregators,
    ) -> Self {
        GameProcessor {
            position_filter,
            encoder,
            aggregator,
        }
    }

    /// Shape of every encoding produced by this processor
    pub fn encoding_shape(&self) -> &'static [usize] {
        self.encoder.shape()
    }

    /// Encodes the position a game starts from
    pub fn probe(&self, headers: &GameHeaders) -> Result<Encoding, ReplayError> {
        let start = starting_position(headers)?;
        Ok(self.encoder.encode(&to_setup(&start)))
    }

    /// Replays the game and encodes the selected positions.
    /// Replay stops at the first move that can't be played, keeping what was collected so far.
    pub fn process(&mut self, game: &PgnGame) -> ProcessedGame {
        let mut encodings = Vec::new();
        let error = self.replay(game, &mut encodings).err();

        ProcessedGame {
            encodings: self.aggregator.aggregate(encodings),
            error,
        }
    }

    fn replay(
        &mut self,
        game: &PgnGame,
        encodings: &mut Vec<Encoding>,
    ) -> Result<(), ReplayError> {
        // every game gets its own board
        let mut pos = starting_position(&game.headers)?;

        for (i, san_plus) in game.moves.iter().enumerate() {
            let ply = i + 1;

            let mov = san_plus
                .san
                .to_move(&pos)
                .map_err(|_| ReplayError::IllegalMove {
                    ply,
                    san: san_plus.to_string(),
                })?;
            pos.play_unchecked(&mov);

            if self.position_filter.select(ply, &pos) {
                encodings.push(self.encoder.encode(&to_setup(&pos)));
            }
        }

        Ok(())
    }
}

/// The standard starting position, or the one given by the FEN header
fn starting_position(headers: &GameHeaders) -> Result<Chess, ReplayError> {
    let Some(fen) = headers.get("FEN") else {
        return Ok(Chess::default());
    };

    let invalid = || ReplayError::InvalidStart {
        fen: fen.to_string(),
    };

    Fen::from_ascii(fen.trim().as_bytes())
        .map_err(|_| invalid())?
        .into_position(CastlingMode::Standard)
        .map_err(|_| invalid())
}

fn to_setup(pos: &Chess) -> Setup {
    pos.clone().into_setup(EnPassantMode::Legal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveEntry, ArchiveReader};
    use crate::codec::{decode_tensor, BitboardEncoder, TensorEncoder};
    use crate::filter::{Constant, PlyRange};
    use shakmaty::Square;
    use std::io::Cursor;

    fn game_from_pgn(pgn: &str) -> PgnGame {
        let mut reader = ArchiveReader::new(Box::new(Cursor::new(pgn.as_bytes().to_vec())));
        match reader.next_entry(|_| true).unwrap() {
            Some(ArchiveEntry::Game(game)) => game,
            other => panic!("unexpected entry {:?}", other),
        }
    }

    fn one_hot(i: usize) -> Encoding {
        let mut bits = vec![false; 8];
        bits[i] = true;
        Encoding::new(vec![8], bits).unwrap()
    }

    #[test]
    fn test_encodes_every_selected_ply() {
        let game = game_from_pgn("1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 *");
        let mut processor = GameProcessor::new(
            PlyRange { min: 2, max: 4 }.into(),
            BitboardEncoder.into(),
            Identity.into(),
        );

        let processed = processor.process(&game);
        assert!(processed.error.is_none());
        assert_eq!(processed.encodings.len(), 3);
        assert!(processed.encodings.iter().all(|e| e.shape() == [773]));

        // ply 2 is after 1... e5: white to move
        assert!(processed.encodings[0].bits()[768]);
        // ply 3 is after 2. Nf3: black to move
        assert!(!processed.encodings[1].bits()[768]);
    }

    #[test]
    fn test_illegal_move_keeps_prefix() {
        // the fifth move is illegal
        let game = game_from_pgn("1. e4 e5 2. Nf3 Nc6 3. Ke3 a6 4. d4 *");
        let mut processor = GameProcessor::default();

        let processed = processor.process(&game);
        assert_eq!(processed.encodings.len(), 4);
        assert!(matches!(
            processed.error,
            Some(ReplayError::IllegalMove { ply: 5, ref san }) if san == "Ke3"
        ));
    }

    #[test]
    fn test_tensor_keeps_en_passant() {
        let game = game_from_pgn("1. e4 c5 2. e5 d5 *");
        let mut processor = GameProcessor::new(
            Constant(true).into(),
            TensorEncoder.into(),
            Identity.into(),
        );

        let processed = processor.process(&game);
        let last = decode_tensor(processed.encodings.last().unwrap()).unwrap();
        assert_eq!(last.ep_square, Some(Square::D6));

        // en passant is only recorded when it can be captured
        let after_c5 = decode_tensor(&processed.encodings[1]).unwrap();
        assert_eq!(after_c5.ep_square, None);
    }

    #[test]
    fn test_fen_start() {
        let pgn = "[FEN \"4k3/8/8/8/8/8/4P3/4K3 w - - 0 1\"]\n[SetUp \"1\"]\n\n1. e4 Kd7 *";
        let game = game_from_pgn(pgn);
        let mut processor = GameProcessor::default();

        let processed = processor.process(&game);
        assert!(processed.error.is_none());
        assert_eq!(processed.encodings.len(), 2);

        let probe = processor.probe(&game.headers).unwrap();
        assert_eq!(probe.bits().iter().filter(|&&b| b).count(), 3 + 1);
    }

    #[test]
    fn test_invalid_fen_start() {
        let game = game_from_pgn("[FEN \"not a fen\"]\n\n1. e4 *");
        let mut processor = GameProcessor::default();

        let processed = processor.process(&game);
        assert!(processed.encodings.is_empty());
        assert!(matches!(
            processed.error,
            Some(ReplayError::InvalidStart { .. })
        ));
        assert!(processor.probe(&game.headers).is_err());
    }

    #[test]
    fn test_triplets() {
        let mut triplets = Triplets::new(Some(3));

        for _ in 0..50 {
            let encodings: Vec<Encoding> = (0..6).map(one_hot).collect();
            let out = triplets.aggregate(encodings);
            assert_eq!(out.len(), 3);

            let index = |e: &Encoding| e.bits().iter().position(|&b| b).unwrap();
            let (anchor, positive, negative) = (index(&out[0]), index(&out[1]), index(&out[2]));
            assert!(anchor < 5);
            assert_eq!(positive, anchor + 1);
            assert_eq!(negative, (anchor + 3) % 6);
        }

        assert!(triplets.aggregate(vec![one_hot(0)]).is_empty());
        assert!(triplets.aggregate(vec![]).is_empty());
    }
}
