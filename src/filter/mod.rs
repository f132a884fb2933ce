pub mod game;
pub mod position;

pub use game::{
    AllOf, EloFilter, GameFilter, GameFilters, KeepAll, TimeControl, TimeControlFilter,
};
pub use position::{
    Constant, OpeningSubsample, PieceCount, PlyRange, PositionFilter, PositionFilters,
};
