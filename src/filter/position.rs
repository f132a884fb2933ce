use enum_dispatch::enum_dispatch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shakmaty::{Chess, Position};

/// The available position filters
#[enum_dispatch]
#[derive(Debug, Clone)]
pub enum PositionFilters {
    Constant,
    PlyRange,
    PieceCount,
    OpeningSubsample,
}

#[enum_dispatch(PositionFilters)]
pub trait PositionFilter {
    /// Whether the position reached after `ply` half-moves should be encoded
    fn select(&mut self, ply: usize, position: &Chess) -> bool;
}

impl Default for PositionFilters {
    fn default() -> Self {
        Constant(true).into()
    }
}

/// Selects every position or none
#[derive(Debug, Clone, Copy)]
pub struct Constant(pub bool);

impl PositionFilter for Constant {
    fn select(&mut self, _ply: usize, _position: &Chess) -> bool {
        self.0
    }
}

/// Selects positions with `min <= ply <= max`
#[derive(Debug, Clone, Copy)]
pub struct PlyRange {
    pub min: usize,
    pub max: usize,
}

impl PositionFilter for PlyRange {
    fn select(&mut self, ply: usize, _position: &Chess) -> bool {
        (self.min..=self.max).contains(&ply)
    }
}

/// Selects positions with `min <= pieces on the board <= max`, kings included
#[derive(Debug, Clone, Copy)]
pub struct PieceCount {
    pub min: usize,
    pub max: usize,
}

impl PositionFilter for PieceCount {
    fn select(&mut self, _ply: usize, position: &Chess) -> bool {
        let pieces = position.board().occupied().count();
        (self.min..=self.max).contains(&pieces)
    }
}

/// Thins out the opening: the selection probability grows linearly with the ply
/// and reaches 1 at `ramp_plies`
#[derive(Debug, Clone)]
pub struct OpeningSubsample {
    pub ramp_plies: usize,
    rng: StdRng,
}

impl OpeningSubsample {
    /// A seed makes the selection reproducible
    pub fn new(ramp_plies: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        OpeningSubsample { ramp_plies, rng }
    }

    pub fn probability(&self, ply: usize) -> f64 {
        if self.ramp_plies == 0 {
            return 1.0;
        }
        ply.min(self.ramp_plies) as f64 / self.ramp_plies as f64
    }
}

impl PositionFilter for OpeningSubsample {
    fn select(&mut self, ply: usize, _position: &Chess) -> bool {
        // one fresh draw per candidate
        let draw: f64 = self.rng.gen();
        draw < self.probability(ply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shakmaty::{fen::Fen, CastlingMode};

    #[test]
    fn test_ply_range() {
        let mut filter = PlyRange { min: 2, max: 4 };
        let pos = Chess::default();

        let selected: Vec<usize> = (0..7).filter(|&ply| filter.select(ply, &pos)).collect();
        assert_eq!(selected, vec![2, 3, 4]);
    }

    #[test]
    fn test_piece_count() {
        let mut filter: PositionFilters = PieceCount { min: 2, max: 4 }.into();

        assert!(!filter.select(0, &Chess::default()));

        let pos: Chess = Fen::from_ascii(b"8/8/4k3/8/8/3QK3/8/8 w - - 0 1")
            .unwrap()
            .into_position(CastlingMode::Standard)
            .unwrap();
        assert!(filter.select(0, &pos));
    }

    #[test]
    fn test_opening_probability() {
        let filter = OpeningSubsample::new(40, Some(0));

        assert_eq!(filter.probability(0), 0.0);
        assert_eq!(filter.probability(10), 0.25);
        assert_eq!(filter.probability(40), 1.0);
        assert_eq!(filter.probability(100), 1.0);
    }

    #[test]
    fn test_opening_subsample() {
        let pos = Chess::default();
        let mut filter = OpeningSubsample::new(40, Some(7));

        // never before the first move, always after the ramp
        assert!((0..100).all(|_| !filter.select(0, &pos)));
        assert!((0..100).all(|_| filter.select(40, &pos)));

        // about half of the time halfway through the ramp
        let hits = (0..10_000).filter(|_| filter.select(20, &pos)).count();
        assert!((4_000..6_000).contains(&hits), "{}", hits);
    }

    #[test]
    fn test_opening_subsample_is_seeded() {
        let pos = Chess::default();
        let mut a = OpeningSubsample::new(40, Some(42));
        let mut b = OpeningSubsample::new(40, Some(42));

        let run_a: Vec<bool> = (0..200).map(|ply| a.select(ply % 40, &pos)).collect();
        let run_b: Vec<bool> = (0..200).map(|ply| b.select(ply % 40, &pos)).collect();
        assert_eq!(run_a, run_b);
    }
}
