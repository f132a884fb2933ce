use crate::codec::{BitboardEncoder, Encoders, TensorEncoder};
use crate::extractor::ExtractorConfig;
use crate::filter::{
    AllOf, Constant, EloFilter, GameFilters, OpeningSubsample, PieceCount, PlyRange,
    PositionFilters, TimeControlFilter,
};
use crate::processor::{Aggregators, GameProcessor, Identity, Triplets};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Path of a .pgn or .pgn.zst file to read games
    #[arg(long, value_name = "input")]
    pub input: PathBuf,

    /// Container file to write the chunks
    #[arg(long, value_name = "output")]
    pub output: PathBuf,

    /// Number of positions per chunk
    #[arg(long, default_value = "100000")]
    pub chunk_size: usize,

    /// Stop at the game with this ordinal, without processing it. Discarded games count too.
    #[arg(long)]
    pub max_games: Option<u64>,

    /// Append to an existing output, continuing its chunk numbering
    #[arg(long, default_value = "false")]
    pub resume: bool,

    /// How positions are encoded
    #[arg(long, value_enum, default_value = "bitboard")]
    pub encoding: EncodingKind,

    /// How the encodings of a game are combined
    #[arg(long, value_enum, default_value = "identity")]
    pub aggregate: AggregateKind,

    /// Seed for the random choices, random when missing
    #[arg(long)]
    pub seed: Option<u64>,

    /// Position filter configuration
    #[clap(flatten)]
    pub positions: PositionArgs,

    /// Game filter configuration
    #[clap(flatten)]
    pub games: GameFilterArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Container file written by `extract`
    #[arg(long, value_name = "input")]
    pub input: PathBuf,

    /// Chunk of the record to decode
    #[arg(long, value_name = "chunk", requires = "record")]
    pub chunk: Option<usize>,

    /// Index of the record inside the chunk, printed as a FEN string
    #[arg(long, value_name = "record", requires = "chunk")]
    pub record: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct PositionArgs {
    /// Which positions of a game are encoded
    #[arg(id = "positions", long = "positions", value_enum, default_value = "all")]
    pub selection: PositionSelection,

    /// Only accept positions that are at least this many plies deep
    #[arg(long, value_name = "min-ply", default_value = "1")]
    pub min_ply: usize,

    /// Only accept positions that are at most this many plies deep
    #[arg(long, value_name = "max-ply")]
    pub max_ply: Option<usize>,

    /// Only accept positions with at least this many pieces, kings included
    #[arg(long, value_name = "min-pieces", default_value = "2")]
    pub min_pieces: usize,

    /// Only accept positions with at most this many pieces, kings included
    #[arg(long, value_name = "max-pieces", default_value = "32")]
    pub max_pieces: usize,

    /// Ply at which the opening subsampling accepts every position
    #[arg(long, value_name = "ramp-plies", default_value = "40")]
    pub ramp_plies: usize,
}

#[derive(Args, Debug, Clone)]
pub struct GameFilterArgs {
    /// Which games are encoded
    #[arg(id = "game-filter", long = "game-filter", value_enum, default_value = "keep-all")]
    pub selection: GameSelection,

    /// Lower elo bound (exclusive) of both players, for the custom filter
    #[arg(long, value_name = "min-elo", default_value = "700")]
    pub min_elo: i32,

    /// Upper elo bound (exclusive) of both players, for the custom filter
    #[arg(long, value_name = "max-elo", default_value = "3000")]
    pub max_elo: i32,

    /// Lower time control bound (exclusive, minutes), for the custom filter
    #[arg(long, value_name = "min-time", default_value = "2.0")]
    pub min_time: f64,

    /// Upper time control bound (exclusive, minutes), for the custom filter
    #[arg(long, value_name = "max-time", default_value = "30.0")]
    pub max_time: f64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    /// Flat vector of 773 bits
    Bitboard,
    /// 8x8x15 planes, keeps en passant
    Tensor,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSelection {
    All,
    None,
    PlyRange,
    PieceCount,
    /// Subsample the opening, accepting more positions as the game goes on
    Opening,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// Every selected position
    Identity,
    /// An (anchor, positive, negative) triplet per game
    Triplets,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameSelection {
    KeepAll,
    /// Discards games with elo outside (700, 3000) and time control outside (2, 30) minutes
    NoBullet,
    /// Like no-bullet, with the bounds from the command line
    Custom,
}

pub fn build_game_filter(args: &GameFilterArgs) -> GameFilters {
    match args.selection {
        GameSelection::KeepAll => GameFilters::default(),
        GameSelection::NoBullet => GameFilters::no_bullet(),
        GameSelection::Custom => {
            let elo = (args.min_elo, args.max_elo);
            AllOf(vec![
                EloFilter {
                    white: elo,
                    black: elo,
                }
                .into(),
                TimeControlFilter {
                    range: (args.min_time, args.max_time),
                }
                .into(),
            ])
            .into()
        }
    }
}

pub fn build_position_filter(args: &PositionArgs, seed: Option<u64>) -> PositionFilters {
    match args.selection {
        PositionSelection::All => Constant(true).into(),
        PositionSelection::None => Constant(false).into(),
        PositionSelection::PlyRange => PlyRange {
            min: args.min_ply,
            max: args.max_ply.unwrap_or(usize::MAX),
        }
        .into(),
        PositionSelection::PieceCount => PieceCount {
            min: args.min_pieces,
            max: args.max_pieces,
        }
        .into(),
        PositionSelection::Opening => OpeningSubsample::new(args.ramp_plies, seed).into(),
    }
}

pub fn build_encoder(kind: EncodingKind) -> Encoders {
    match kind {
        EncodingKind::Bitboard => BitboardEncoder.into(),
        EncodingKind::Tensor => TensorEncoder.into(),
    }
}

pub fn build_aggregator(kind: AggregateKind, seed: Option<u64>) -> Aggregators {
    match kind {
        AggregateKind::Identity => Identity.into(),
        // a different stream than the position filter when seeded
        AggregateKind::Triplets => Triplets::new(seed.map(|seed| seed.wrapping_add(1))).into(),
    }
}

pub fn build_game_processor(args: &ExtractArgs) -> GameProcessor {
    GameProcessor::new(
        build_position_filter(&args.positions, args.seed),
        build_encoder(args.encoding),
        build_aggregator(args.aggregate, args.seed),
    )
}

/// Resolves the command line into the configuration of a run
pub fn build_extractor_config(args: &ExtractArgs) -> ExtractorConfig {
    ExtractorConfig {
        game_filter: build_game_filter(&args.games),
        game_processor: build_game_processor(args),
        chunk_size: args.chunk_size,
        max_games: args.max_games,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::GameHeaders;
    use crate::filter::GameFilter;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[clap(flatten)]
        args: ExtractArgs,
    }

    fn parse(extra: &[&str]) -> ExtractArgs {
        let mut argv = vec!["test", "--input", "games.pgn", "--output", "out.chp"];
        argv.extend_from_slice(extra);
        TestCli::parse_from(argv).args
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        let config = build_extractor_config(&args);

        assert_eq!(config.chunk_size, 100_000);
        assert_eq!(config.max_games, None);
        assert!(!args.resume);
        assert!(matches!(config.game_filter, GameFilters::KeepAll(_)));
        assert!(matches!(
            config.game_processor.position_filter,
            PositionFilters::Constant(Constant(true))
        ));
        assert_eq!(config.game_processor.encoding_shape(), &[773]);
    }

    #[test]
    fn test_custom_game_filter() {
        let args = parse(&[
            "--game-filter",
            "custom",
            "--min-elo",
            "1000",
            "--min-time",
            "0.5",
        ]);
        let filter = build_game_filter(&args.games);

        let headers = |elo: &str, time_control: &str| -> GameHeaders {
            [
                ("WhiteElo", elo),
                ("BlackElo", "1500"),
                ("TimeControl", time_control),
            ]
            .into_iter()
            .collect()
        };
        // both bounds are met
        assert!(!filter.discard(&headers("1200", "60+1")));
        // only the time control is met
        assert!(!filter.discard(&headers("900", "60+1")));
        // only the elo is met
        assert!(!filter.discard(&headers("1200", "60+0")));
        // neither is met
        assert!(filter.discard(&headers("900", "60+0")));
    }

    #[test]
    fn test_processor_options() {
        let args = parse(&[
            "--encoding",
            "tensor",
            "--positions",
            "ply-range",
            "--min-ply",
            "10",
            "--aggregate",
            "triplets",
            "--seed",
            "3",
            "--max-games",
            "20",
            "--resume",
        ]);
        let config = build_extractor_config(&args);

        assert!(args.resume);
        assert_eq!(config.max_games, Some(20));
        assert_eq!(config.game_processor.encoding_shape(), &[8, 8, 15]);
        assert!(matches!(
            config.game_processor.position_filter,
            PositionFilters::PlyRange(PlyRange {
                min: 10,
                max: usize::MAX
            })
        ));
        assert!(matches!(
            config.game_processor.aggregator,
            Aggregators::Triplets(_)
        ));
    }
}
