use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::codec::Encoding;
use crate::error::ExtractError;
use crate::filter::{GameFilter, GameFilters};
use crate::processor::GameProcessor;
use crate::store::{Array, ArrayData, ChunkStore};
use indicatif::{HumanCount, ProgressBar};
use std::path::{Path, PathBuf};

/// Everything that decides what ends up in the dataset
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub game_filter: GameFilters,
    pub game_processor: GameProcessor,
    /// Maximum number of records per chunk
    pub chunk_size: usize,
    /// Stop at the game with this ordinal, before processing it.
    /// Discarded games count too, and are skipped before the limit is checked.
    pub max_games: Option<u64>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        ExtractorConfig {
            game_filter: GameFilters::default(),
            game_processor: GameProcessor::default(),
            chunk_size: 100_000,
            max_games: None,
        }
    }
}

/// Counters of an extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Games whose headers were read, discarded or not
    pub games_read: u64,
    pub games_discarded: u64,
    pub games_processed: u64,
    /// Processed games that stopped early on an illegal move
    pub games_truncated: u64,
    pub records_written: u64,
    /// Records that did not fit in the chunk their game started in
    pub records_dropped: u64,
    pub chunks_written: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Discard,
    Stop,
    Process,
}

/// Records waiting to be flushed.
/// Memory for `capacity` records is reserved once and reused after each flush.
struct Chunk {
    record_len: usize,
    capacity: usize,
    bits: Vec<bool>,
    game_ids: Vec<i32>,
}

impl Chunk {
    fn new(record_len: usize, capacity: usize) -> Self {
        Chunk {
            record_len,
            capacity,
            bits: Vec::with_capacity(record_len * capacity),
            game_ids: Vec::with_capacity(capacity),
        }
    }

    fn len(&self) -> usize {
        self.game_ids.len()
    }

    fn is_empty(&self) -> bool {
        self.game_ids.is_empty()
    }

    fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    fn free(&self) -> usize {
        self.capacity - self.len()
    }

    fn push(&mut self, encoding: &Encoding, game_id: i32) {
        debug_assert!(!self.is_full());
        debug_assert_eq!(encoding.bits().len(), self.record_len);

        self.bits.extend_from_slice(encoding.bits());
        self.game_ids.push(game_id);
    }

    /// Builds the arrays to write, shaped `[n, *record_shape]` and `[n]`
    fn arrays(&self, record_shape: &[usize]) -> (Array, Array) {
        let mut shape = vec![self.len()];
        shape.extend_from_slice(record_shape);

        (
            Array {
                shape,
                data: ArrayData::Bool(self.bits.clone()),
            },
            Array {
                shape: vec![self.len()],
                data: ArrayData::I32(self.game_ids.clone()),
            },
        )
    }

    fn clear(&mut self) {
        self.bits.clear();
        self.game_ids.clear();
    }
}

/// Streams an archive into fixed-size chunks of encoded positions
pub struct Extractor {
    config: ExtractorConfig,
    archive: PathBuf,
    store: ChunkStore,

    /// Shape of every record, fixed for the whole run
    encoding_shape: Vec<usize>,
    /// Index of the next chunk to write
    chunk_index: usize,

    progress: Option<ProgressBar>,
}

impl Extractor {
    /// Prepares a run. The record shape is probed by encoding the starting position
    /// of the first game in the archive.
    pub fn new<P: AsRef<Path>>(
        config: ExtractorConfig,
        archive: P,
        store: ChunkStore,
    ) -> Result<Self, ExtractError> {
        if config.chunk_size == 0 {
            return Err(ExtractError::EmptyChunk);
        }

        let archive = archive.as_ref().to_path_buf();
        let encoding_shape = probe_shape(&config.game_processor, &archive)?;

        log::info!(
            "Archive: {}, output: {}, encoding shape: {:?}, chunk size: {}",
            archive.display(),
            store.path().display(),
            encoding_shape,
            config.chunk_size
        );

        Ok(Extractor {
            config,
            archive,
            store,
            encoding_shape,
            chunk_index: 0,
            progress: None,
        })
    }

    /// Continues the chunk numbering of the chunks already in the container
    pub fn resume(mut self) -> Self {
        self.chunk_index = self.store.chunk_count();
        log::info!("Resuming at chunk {}", self.chunk_index);
        self
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    pub fn encoding_shape(&self) -> &[usize] {
        &self.encoding_shape
    }

    /// Index the next chunk will be written with
    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    pub fn store(&mut self) -> &mut ChunkStore {
        &mut self.store
    }

    pub fn into_store(self) -> ChunkStore {
        self.store
    }

    /// Runs one pass over the archive
    pub fn extract(&mut self) -> Result<ExtractSummary, ExtractError> {
        let mut archive = ArchiveReader::open(&self.archive)?;
        let record_len = self.encoding_shape.iter().product();
        let mut chunk = Chunk::new(record_len, self.config.chunk_size);
        let mut summary = ExtractSummary::default();
        let mut read: u64 = 0;

        loop {
            let mut verdict = Verdict::Process;
            let filter = &self.config.game_filter;
            let max_games = self.config.max_games;
            let ordinal = read + 1;

            let entry = archive.next_entry(|headers| {
                verdict = if filter.discard(headers) {
                    Verdict::Discard
                } else if max_games.is_some_and(|max| ordinal >= max) {
                    Verdict::Stop
                } else {
                    Verdict::Process
                };
                verdict == Verdict::Process
            })?;

            let Some(entry) = entry else {
                break; // end of archive
            };
            if verdict == Verdict::Stop {
                log::info!("Reached the maximum number of games");
                break;
            }

            read = ordinal;
            summary.games_read += 1;
            if let Some(bar) = &self.progress {
                bar.inc(1);
            }

            let game = match entry {
                ArchiveEntry::Game(game) => game,
                ArchiveEntry::Skipped(_) => {
                    log::debug!("Discarded game {}", ordinal);
                    summary.games_discarded += 1;
                    continue;
                }
            };

            let game_id = to_game_id(ordinal)?;
            let processed = self.config.game_processor.process(&game);
            summary.games_processed += 1;
            if let Some(err) = &processed.error {
                summary.games_truncated += 1;
                log::warn!(
                    "Game {}: {}, keeping {} encodings",
                    game_id,
                    err,
                    processed.encodings.len()
                );
            }

            self.append(&mut chunk, &processed.encodings, game_id, &mut summary)?;

            if let Some(bar) = &self.progress {
                bar.set_message(format!(
                    "[Records {}] [Chunks {}]",
                    HumanCount(summary.records_written + chunk.len() as u64),
                    summary.chunks_written
                ));
            }
        }

        if !chunk.is_empty() {
            self.flush(&mut chunk, &mut summary)?;
        }
        if let Some(bar) = &self.progress {
            bar.finish();
        }

        log::info!(
            "Done. Games read: {}, discarded: {}, processed: {}, truncated: {}. \
             Records written: {}, dropped: {}. Chunks written: {}",
            summary.games_read,
            summary.games_discarded,
            summary.games_processed,
            summary.games_truncated,
            summary.records_written,
            summary.records_dropped,
            summary.chunks_written
        );

        Ok(summary)
    }

    /// Appends as many records of a game as fit in the current chunk, the rest is dropped
    fn append(
        &mut self,
        chunk: &mut Chunk,
        encodings: &[Encoding],
        game_id: i32,
        summary: &mut ExtractSummary,
    ) -> Result<(), ExtractError> {
        if let Some(bad) = encodings.iter().find(|e| e.shape() != self.encoding_shape) {
            return Err(ExtractError::ShapeMismatch {
                game_id,
                expected: self.encoding_shape.clone(),
                found: bad.shape().to_vec(),
            });
        }

        let count = encodings.len().min(chunk.free());
        for encoding in &encodings[..count] {
            chunk.push(encoding, game_id);
        }
        log::debug!("Extracted {} encodings from game {}", count, game_id);

        let dropped = encodings.len() - count;
        if dropped > 0 {
            log::debug!("Dropped {} encodings of game {}", dropped, game_id);
            summary.records_dropped += dropped as u64;
        }

        if chunk.is_full() {
            self.flush(chunk, summary)?;
        }

        Ok(())
    }

    fn flush(
        &mut self,
        chunk: &mut Chunk,
        summary: &mut ExtractSummary,
    ) -> Result<(), ExtractError> {
        let (encodings, game_ids) = chunk.arrays(&self.encoding_shape);
        self.store
            .write_chunk(self.chunk_index, &encodings, &game_ids)?;

        log::info!(
            "Saved chunk {} with shape {:?}",
            self.chunk_index,
            encodings.shape
        );

        summary.chunks_written += 1;
        summary.records_written += chunk.len() as u64;
        self.chunk_index += 1;
        chunk.clear();

        Ok(())
    }
}

/// The id stored with the records of a game: its 1-based ordinal in the archive
fn to_game_id(ordinal: u64) -> Result<i32, ExtractError> {
    i32::try_from(ordinal).map_err(|_| ExtractError::GameIdOverflow(ordinal))
}

fn probe_shape(processor: &GameProcessor, archive: &Path) -> Result<Vec<usize>, ExtractError> {
    let mut reader = ArchiveReader::open(archive)?;
    let entry = reader.next_entry(|_| false)?.ok_or(ExtractError::EmptyArchive)?;

    let probe = processor
        .probe(entry.headers())
        .map_err(ExtractError::Probe)?;

    Ok(probe.shape().to_vec())
}
