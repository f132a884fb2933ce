use chesspos::codec::{Encoders, PositionEncoder};
use chesspos::config::{build_extractor_config, ExtractArgs, InspectArgs};
use chesspos::extractor::Extractor;
use chesspos::store::{encoding_name, ChunkStore, Dtype};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use shakmaty::fen::Fen;
use std::error::Error;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encodes the positions of a PGN archive into chunks of a container file
    Extract(ExtractArgs),
    /// Lists the entries of a container, or decodes one of its records
    Inspect(InspectArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();

    match args.command {
        Commands::Extract(cmd) => extract(cmd),
        Commands::Inspect(cmd) => inspect(cmd),
    }
}

fn extract(cmd: ExtractArgs) -> Result<(), Box<dyn Error>> {
    let store = if cmd.resume {
        ChunkStore::open_or_create(&cmd.output)?
    } else {
        ChunkStore::create(&cmd.output)?
    };

    let bar = ProgressBar::new_spinner().with_style(ProgressStyle::default_spinner().template(
        "{spinner:.green} [Elapsed {elapsed_precise}] [Games {human_pos} @ {per_sec}] {msg}",
    )?);

    let mut extractor = Extractor::new(build_extractor_config(&cmd), &cmd.input, store)?;
    if cmd.resume {
        extractor = extractor.resume();
    }
    let summary = extractor.with_progress(bar).extract()?;

    println!(
        "Done. Games: {} processed, {} discarded. Records: {} written, {} dropped. Chunks: {}",
        summary.games_processed,
        summary.games_discarded,
        summary.records_written,
        summary.records_dropped,
        summary.chunks_written
    );

    Ok(())
}

fn inspect(cmd: InspectArgs) -> Result<(), Box<dyn Error>> {
    let mut store = ChunkStore::open(&cmd.input)?;

    let (Some(chunk), Some(record)) = (cmd.chunk, cmd.record) else {
        for entry in store.entries() {
            let dtype = match entry.dtype {
                Dtype::Bool => "bool",
                Dtype::I32 => "i32",
            };
            println!("{} {} {:?}", entry.name, dtype, entry.shape);
        }
        return Ok(());
    };

    let batch = store.read(&encoding_name(chunk))?;
    let encoding = batch
        .encoding(record)
        .ok_or_else(|| format!("chunk {} has no record {}", chunk, record))??;
    let encoder = Encoders::for_shape(encoding.shape())
        .ok_or_else(|| format!("unknown encoding shape {:?}", encoding.shape()))?;

    let setup = encoder.decode(&encoding)?;
    println!("{}", Fen::from_setup(setup));

    Ok(())
}
