use std::io;
use thiserror::Error;

/// An encoding whose shape does not match what the decoder expects
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed encoding: expected shape {expected:?}, found {found:?}")]
    MalformedEncoding {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

/// A header field that is missing or can't be parsed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("missing header {0}")]
    Missing(&'static str),

    #[error("unparsable header {name}: {value:?}")]
    Unparsable { name: &'static str, value: String },
}

/// Replaying a game failed before reaching its last move
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("invalid starting position {fen:?}")]
    InvalidStart { fen: String },

    #[error("illegal move {san} at ply {ply}")]
    IllegalMove { ply: usize, san: String },
}

/// Reading or writing the output container failed
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container i/o: {0}")]
    Io(#[from] io::Error),

    #[error("corrupt container: {0}")]
    Corrupt(String),

    #[error("entry {0} already exists")]
    DuplicateEntry(String),

    #[error("entry {0} not found")]
    MissingEntry(String),

    #[error("invalid array: {0}")]
    InvalidArray(String),
}

/// Fatal errors of an extraction run
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("reading archive: {0}")]
    Archive(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("archive has no games")]
    EmptyArchive,

    #[error("cannot probe encoding shape: {0}")]
    Probe(#[source] ReplayError),

    #[error("game {game_id} produced shape {found:?}, run uses {expected:?}")]
    ShapeMismatch {
        game_id: i32,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("chunk size must be positive")]
    EmptyChunk,

    #[error("game {0} does not fit in a 32-bit game id")]
    GameIdOverflow(u64),
}
