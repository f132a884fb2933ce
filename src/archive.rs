use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

/// Header tags of a single game, e.g. `WhiteElo` or `TimeControl`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameHeaders {
    tags: HashMap<String, String>,
}

impl GameHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(name.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GameHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = GameHeaders::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// A game read in full: headers and mainline moves in SAN
#[derive(Debug, Clone, Default)]
pub struct PgnGame {
    pub headers: GameHeaders,
    pub moves: Vec<SanPlus>,
}

#[derive(Debug)]
pub enum ArchiveEntry {
    /// Only the headers were read, the moves were skipped
    Skipped(GameHeaders),
    Game(PgnGame),
}

impl ArchiveEntry {
    pub fn headers(&self) -> &GameHeaders {
        match self {
            ArchiveEntry::Skipped(headers) => headers,
            ArchiveEntry::Game(game) => &game.headers,
        }
    }
}

/// Sequential reader over a PGN archive (plain or .zst compressed)
pub struct ArchiveReader {
    reader: BufferedReader<Box<dyn io::Read>>,
}

impl ArchiveReader {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;

        // decompress if necessary
        let reader: Box<dyn io::Read> = if path.extension().is_some_and(|ext| ext == "zst") {
            Box::new(zstd::Decoder::new(file)?)
        } else {
            Box::new(file)
        };

        Ok(Self::new(reader))
    }

    pub fn new(reader: Box<dyn io::Read>) -> Self {
        ArchiveReader {
            reader: BufferedReader::new(reader),
        }
    }

    /// Reads the next game. `read_moves` is called once the headers are known and
    /// decides whether the moves are read or skipped.
    /// Returns `None` at the end of the archive.
    pub fn next_entry<F>(&mut self, read_moves: F) -> io::Result<Option<ArchiveEntry>>
    where
        F: FnMut(&GameHeaders) -> bool,
    {
        let mut visitor = GameVisitor::new(read_moves);
        self.reader.read_game(&mut visitor)
    }
}

struct GameVisitor<F> {
    read_moves: F,
    skipped: bool,

    // information about the current game
    headers: GameHeaders,
    moves: Vec<SanPlus>,
}

impl<F: FnMut(&GameHeaders) -> bool> GameVisitor<F> {
    fn new(read_moves: F) -> Self {
        GameVisitor {
            read_moves,
            skipped: false,
            headers: GameHeaders::new(),
            moves: Vec::new(),
        }
    }
}

impl<F: FnMut(&GameHeaders) -> bool> Visitor for GameVisitor<F> {
    type Result = ArchiveEntry;

    fn begin_game(&mut self) {
        self.skipped = false;
        self.headers = GameHeaders::new();
        self.moves.clear();
    }

    fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
        let key = String::from_utf8_lossy(key);
        let value = String::from_utf8_lossy(value.as_bytes());

        self.headers.insert(key, value);
    }

    fn end_headers(&mut self) -> Skip {
        self.skipped = !(self.read_moves)(&self.headers);
        Skip(self.skipped)
    }

    fn begin_variation(&mut self) -> Skip {
        Skip(true) // stay in the mainline
    }

    fn san(&mut self, san_plus: SanPlus) {
        self.moves.push(san_plus);
    }

    fn end_game(&mut self) -> Self::Result {
        // note: skipped games go through here too
        let headers = std::mem::take(&mut self.headers);

        if self.skipped {
            ArchiveEntry::Skipped(headers)
        } else {
            ArchiveEntry::Game(PgnGame {
                headers,
                moves: std::mem::take(&mut self.moves),
            })
        }
    }
}
