use clap::Parser;
use docvault_chunk::{ChunkStrategy, Chunker, ChunkerConfig};
use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

/// Chunk a text document into JSON output using docvault-chunk.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Chunking strategy: paragraph, sentence, or fixed_size.
    #[arg(short, long, default_value = "paragraph")]
    strategy: String,

    /// Minimum chunk length in bytes; shorter segments are dropped.
    #[arg(long, default_value_t = 50)]
    min_chunk_len: usize,

    /// Maximum chunk length in bytes.
    #[arg(long, default_value_t = 1000)]
    max_chunk_len: usize,

    /// Overlap between consecutive fixed-size windows.
    #[arg(long, default_value_t = 50)]
    overlap: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let strategy: ChunkStrategy = match args.strategy.parse() {
        Ok(strategy) => strategy,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    let text = match read_input(args.input.as_deref()) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("failed to read input: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = ChunkerConfig::default()
        .with_min_chunk_len(args.min_chunk_len)
        .with_max_chunk_len(args.max_chunk_len)
        .with_overlap(args.overlap);
    let chunks = Chunker::new(strategy, config).chunk(&text);

    match serde_json::to_string_pretty(&chunks) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to serialize chunks: {err}");
            ExitCode::FAILURE
        }
    }
}

fn read_input(path: Option<&str>) -> io::Result<String> {
    match path {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
