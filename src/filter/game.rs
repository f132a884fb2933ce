use crate::archive::GameHeaders;
use crate::error::MetadataError;
use enum_dispatch::enum_dispatch;
use std::str::FromStr;

/// Number of moves assumed when converting an increment into total time
pub const ASSUMED_MOVES: u32 = 40;

/// The available game filters
#[enum_dispatch]
#[derive(Debug, Clone)]
pub enum GameFilters {
    KeepAll,
    EloFilter,
    TimeControlFilter,
    AllOf,
}

#[enum_dispatch(GameFilters)]
pub trait GameFilter {
    /// Whether the game should be skipped, deciding from its headers alone.
    /// Headers that are missing or can't be parsed discard the game.
    fn discard(&self, headers: &GameHeaders) -> bool;
}

impl Default for GameFilters {
    fn default() -> Self {
        KeepAll.into()
    }
}

impl GameFilters {
    /// Skips games that are both bullet and outside the usual rating range
    pub fn no_bullet() -> Self {
        AllOf(vec![
            EloFilter {
                white: (700, 3000),
                black: (700, 3000),
            }
            .into(),
            TimeControlFilter { range: (2.0, 30.0) }.into(),
        ])
        .into()
    }
}

/// Never discards
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl GameFilter for KeepAll {
    fn discard(&self, _headers: &GameHeaders) -> bool {
        false
    }
}

/// Keeps games where both ratings lie strictly inside their ranges
#[derive(Debug, Clone, Copy)]
pub struct EloFilter {
    pub white: (i32, i32),
    pub black: (i32, i32),
}

impl EloFilter {
    fn keep(&self, headers: &GameHeaders) -> Result<bool, MetadataError> {
        let white_elo = parse_header::<i32>(headers, "WhiteElo")?;
        let black_elo = parse_header::<i32>(headers, "BlackElo")?;

        Ok(strictly_inside(white_elo, self.white) && strictly_inside(black_elo, self.black))
    }
}

impl GameFilter for EloFilter {
    fn discard(&self, headers: &GameHeaders) -> bool {
        fail_closed(self.keep(headers))
    }
}

/// A `TimeControl` header of the form `<minutes>+<increment_seconds>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeControl {
    pub minutes: u32,
    pub increment_seconds: u32,
}

impl TimeControl {
    /// Minutes contributed by the increment over a game of `ASSUMED_MOVES` moves.
    /// The base time is not part of the estimate.
    pub fn total_time_equivalent(&self) -> f64 {
        self.increment_seconds as f64 * ASSUMED_MOVES as f64 / 60.0
    }
}

impl FromStr for TimeControl {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparsable = || MetadataError::Unparsable {
            name: "TimeControl",
            value: s.to_string(),
        };

        let (minutes, increment) = s.trim().split_once('+').ok_or_else(unparsable)?;

        Ok(TimeControl {
            minutes: minutes.parse().map_err(|_| unparsable())?,
            increment_seconds: increment.parse().map_err(|_| unparsable())?,
        })
    }
}

/// Keeps games whose time control estimate lies strictly inside the range (in minutes)
#[derive(Debug, Clone, Copy)]
pub struct TimeControlFilter {
    pub range: (f64, f64),
}

impl TimeControlFilter {
    fn keep(&self, headers: &GameHeaders) -> Result<bool, MetadataError> {
        let time_control = parse_header::<TimeControl>(headers, "TimeControl")?;
        let total_time = time_control.total_time_equivalent();

        Ok(self.range.0 < total_time && total_time < self.range.1)
    }
}

impl GameFilter for TimeControlFilter {
    fn discard(&self, headers: &GameHeaders) -> bool {
        fail_closed(self.keep(headers))
    }
}

/// Discards a game only if every filter discards it, checked left to right.
/// Stops at the first filter that keeps the game. An empty list discards everything.
#[derive(Debug, Clone, Default)]
pub struct AllOf(pub Vec<GameFilters>);

impl GameFilter for AllOf {
    fn discard(&self, headers: &GameHeaders) -> bool {
        self.0.iter().all(|filter| filter.discard(headers))
    }
}

fn strictly_inside<T: PartialOrd>(value: T, (lo, hi): (T, T)) -> bool {
    lo < value && value < hi
}

fn parse_header<T: FromStr>(
    headers: &GameHeaders,
    name: &'static str,
) -> Result<T, MetadataError> {
    let value = headers.get(name).ok_or(MetadataError::Missing(name))?;

    value.trim().parse().map_err(|_| MetadataError::Unparsable {
        name,
        value: value.to_string(),
    })
}

fn fail_closed(keep: Result<bool, MetadataError>) -> bool {
    match keep {
        Ok(keep) => !keep,
        Err(err) => {
            log::debug!("discarding game: {}", err);
            true
        }
    }
}
